use crate::{
    cluster::HostConfig,
    context::Context,
    error::MigrationError,
    executor::RemoteExecutor,
    node::static_pod_name,
    pod::wait_for_static_pod,
    resources::NAMESPACE_SYSTEM,
    scripts,
};
use anyhow::{Context as _, Result};
use log::info;

const APISERVER: &str = "kube-apiserver";
const CONTROLLER_MANAGER: &str = "kube-controller-manager";

/// Re-render the API server and controller-manager manifests on the node and
/// wait for both static pods to become healthy again. Must never run on two
/// control plane nodes at the same time.
pub fn regenerate_manifests(
    ctx: &Context<'_>,
    host: &HostConfig,
    executor: &dyn RemoteExecutor,
) -> Result<()> {
    info!(
        "Regenerating API server and controller-manager manifests on {}",
        host.public_address
    );
    let cmd = scripts::regenerate_control_plane_manifests(
        &ctx.work_dir,
        host.id,
        scripts::kubeadm_verbose_flag(ctx.verbose),
    );
    executor
        .run_raw(&cmd, &ctx.cancel)
        .context("Unable to regenerate control plane manifests")?;

    info!(
        "Waiting {:?} for the kubelet to roll out static pods",
        ctx.timings.settle
    );
    ctx.cancel.sleep(ctx.timings.settle)?;

    for component in &[APISERVER, CONTROLLER_MANAGER] {
        let pod = static_pod_name(component, host);
        info!(
            "Waiting up to {:?} for {} to become healthy",
            ctx.timings.poll.timeout, pod
        );
        wait_for_static_pod(
            ctx.accessor,
            &ctx.cancel,
            &ctx.timings.poll,
            &pod,
            NAMESPACE_SYSTEM,
            ctx.verbose,
        )
        .map_err(|e| {
            let timeout = match e.downcast_ref::<MigrationError>() {
                Some(MigrationError::Timeout { timeout, .. }) => *timeout,
                _ => return e,
            };
            MigrationError::RolloutTimeout {
                pod: pod.clone(),
                timeout,
            }
            .into()
        })?;
    }
    Ok(())
}
