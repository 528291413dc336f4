use crate::{cancel::CancelToken, cluster::HostConfig, executor::RemoteExecutor, scripts};
use anyhow::{Context, Result, bail};
use log::debug;

/// Retrieve the static pod name of a control plane component on the node
pub fn static_pod_name(component: &str, host: &HostConfig) -> String {
    format!("{}-{}", component, host.hostname)
}

/// Fill in the hostname of the node if the manifest did not provide one
pub fn resolve_hostname(
    host: &mut HostConfig,
    executor: &dyn RemoteExecutor,
    cancel: &CancelToken,
) -> Result<()> {
    if !host.hostname.is_empty() {
        return Ok(());
    }
    let (stdout, _) = executor
        .run_raw(scripts::hostname(), cancel)
        .with_context(|| format!("Unable to retrieve hostname of {}", host.public_address))?;
    let hostname = stdout.trim();
    if hostname.is_empty() {
        bail!("Empty hostname returned by {}", host.public_address)
    }
    debug!("Using hostname {} for {}", hostname, host.public_address);
    host.hostname = hostname.into();
    Ok(())
}
