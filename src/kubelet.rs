use crate::{
    cluster::HostConfig,
    context::Context,
    error::MigrationError,
    executor::RemoteExecutor,
    poll::Readiness,
    scripts,
};
use anyhow::{Context as _, Result};
use log::{debug, info, warn};

const KUBELET: &str = "kubelet";

/// The state of a systemd unit as reported by `systemctl show`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceStatus {
    /// For example `loaded` or `not-found`
    pub load_state: String,
    /// For example `active` or `failed`
    pub active_state: String,
    /// For example `running`, `auto-restart` or `dead`
    pub sub_state: String,
}

impl ServiceStatus {
    /// Parse the `Key=Value` lines of `systemctl show`
    pub fn parse(output: &str) -> Self {
        let mut status = Self::default();
        for (key, value) in output.lines().filter_map(|l| l.split_once('=')) {
            let value = value.trim().to_owned();
            match key.trim() {
                "LoadState" => status.load_state = value,
                "ActiveState" => status.active_state = value,
                "SubState" => status.sub_state = value,
                _ => {}
            }
        }
        status
    }

    /// Returns true if the unit is running
    pub fn running(&self) -> bool {
        self.sub_state == "running"
    }

    /// Returns true if systemd is about to restart the unit
    pub fn restarting(&self) -> bool {
        self.sub_state == "auto-restart"
    }
}

/// Drain the node, switch its kubelet to the new cloud provider mode and
/// make it schedulable again. On any error the node stays cordoned.
pub fn reconfigure_kubelet(
    ctx: &Context<'_>,
    host: &HostConfig,
    executor: &dyn RemoteExecutor,
) -> Result<()> {
    info!(
        "Updating config and restarting the kubelet on {}",
        host.public_address
    );
    let node = host.hostname.as_str();

    debug!("Cordoning node {}", node);
    ctx.drainer
        .cordon(node, true)
        .with_context(|| format!("Unable to cordon node {}", node))?;

    debug!("Draining node {}", node);
    ctx.drainer
        .drain(node, &ctx.cancel)
        .map_err(|source| {
            if matches!(
                MigrationError::find(&source),
                Some(MigrationError::Cancelled)
            ) {
                return source;
            }
            MigrationError::Drain {
                node: node.into(),
                source,
            }
            .into()
        })?;

    ctx.cancel.check()?;
    let cmd = scripts::update_kubelet_config(
        &ctx.work_dir,
        host.id,
        scripts::kubeadm_verbose_flag(ctx.verbose),
    );
    executor
        .run_raw(&cmd, &ctx.cancel)
        .context("Unable to update the kubelet config")?;

    debug!(
        "Waiting up to {:?} for the kubelet to become running",
        ctx.timings.poll.timeout
    );
    ctx.timings
        .poll
        .poll(&ctx.cancel, &format!("kubelet on {}", node), || {
            match executor.run_raw(&scripts::systemd_status(KUBELET), &ctx.cancel) {
                Ok((stdout, _)) => {
                    let status = ServiceStatus::parse(&stdout);
                    if status.running() && !status.restarting() {
                        Readiness::Ready
                    } else {
                        if ctx.verbose {
                            debug!("Kubelet on {} is {:?}", node, status);
                        }
                        Readiness::NotReady
                    }
                }
                Err(e) => Readiness::Fatal(e.context("Unable to read the kubelet status")),
            }
        })?;

    info!("Uncordoning node {}", node);
    if let Err(e) = ctx.drainer.cordon(node, false) {
        warn!("Node {} remains cordoned", node);
        return Err(e.context(format!("Unable to uncordon node {}", node)));
    }
    Ok(())
}
