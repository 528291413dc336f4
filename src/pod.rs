use crate::{
    accessor::ClusterAccessor,
    cancel::CancelToken,
    error::MigrationError,
    poll::{PollPolicy, Readiness},
    resources::Pod,
};
use anyhow::Result;
use log::debug;

const PHASE_RUNNING: &str = "Running";
const CONDITION_TRUE: &str = "True";
const HEALTH_CONDITIONS: &[&str] = &["Ready", "ContainersReady"];

/// Evaluate a single static pod read. Read errors are expected while the
/// kubelet replaces the pod and never fail the poll.
pub fn check_static_pod(name: &str, pod: Result<Pod>, verbose: bool) -> Readiness {
    let pod = match pod {
        Ok(pod) => pod,
        Err(e) => {
            if verbose {
                debug!("Unable to get pod {}: {:#}", name, e);
            }
            return Readiness::NotReady;
        }
    };

    if pod.status.phase != PHASE_RUNNING {
        if verbose {
            debug!("Pod {} is not yet running", name);
        }
        return Readiness::NotReady;
    }

    if let Some(c) = pod
        .status
        .conditions
        .iter()
        .find(|c| HEALTH_CONDITIONS.contains(&c.type_.as_str()) && c.status != CONDITION_TRUE)
    {
        if verbose {
            debug!("Pod {} condition {} is {}", name, c.type_, c.status);
        }
        return Readiness::NotReady;
    }

    Readiness::Ready
}

/// Wait until the static pod is running and ready
pub fn wait_for_static_pod(
    accessor: &dyn ClusterAccessor,
    cancel: &CancelToken,
    policy: &PollPolicy,
    name: &str,
    namespace: &str,
    verbose: bool,
) -> Result<()> {
    if name.is_empty() || namespace.is_empty() {
        return Err(
            MigrationError::precondition("static pod name and namespace are required").into(),
        );
    }

    policy.poll(cancel, &format!("pod {}/{}", namespace, name), || {
        if verbose {
            debug!("Waiting for pod {} to become healthy", name);
        }
        check_static_pod(name, accessor.get_pod(namespace, name), verbose)
    })
}
