use crate::{
    accessor::ClusterAccessor,
    cluster::{ClusterConfiguration, Provider},
    resources::{NAMESPACE_SYSTEM, Pod},
};
use anyhow::{Context, Result};
use log::debug;

const CLOUD_PROVIDER_FLAG: &str = "--cloud-provider";
const CONTROLLER_MANAGER_SELECTOR: &str = "component=kube-controller-manager";

/// Snapshot of the cloud provider integration running on the cluster
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiveClusterStatus {
    /// The controller-manager runs the in-tree cloud provider
    pub in_tree_cloud_provider_enabled: bool,
    /// The external cloud controller manager is deployed
    pub external_ccm_deployed: bool,
}

/// The daemon set name of the provider's external CCM
pub fn ccm_daemon_set(provider: Provider) -> Option<&'static str> {
    match provider {
        Provider::Openstack => Some("openstack-cloud-controller-manager"),
        Provider::Vsphere => Some("vsphere-cloud-controller-manager"),
        _ => None,
    }
}

/// Returns true if one of the pod's containers is started with an in-tree
/// `--cloud-provider`
fn in_tree_flag(pod: &Pod) -> bool {
    pod.spec
        .containers
        .iter()
        .flat_map(|c| c.command.iter().chain(c.args.iter()))
        .filter_map(|arg| arg.strip_prefix(CLOUD_PROVIDER_FLAG))
        .filter_map(|rest| rest.strip_prefix('='))
        .any(|value| !value.is_empty() && value != "external")
}

/// Inspect the live cluster for its current cloud provider integration.
/// The controller-manager static pods are selected by label, so hostnames
/// do not need to be known yet.
pub fn inspect_ccm_status(
    accessor: &dyn ClusterAccessor,
    cluster: &ClusterConfiguration,
) -> Result<LiveClusterStatus> {
    let mut status = LiveClusterStatus::default();

    let pods = accessor
        .list_pods(NAMESPACE_SYSTEM, CONTROLLER_MANAGER_SELECTOR)
        .context("Unable to list controller-manager pods")?;
    if let Some(pod) = pods.iter().find(|p| in_tree_flag(p)) {
        debug!("Pod {} runs the in-tree cloud provider", pod.metadata.name);
        status.in_tree_cloud_provider_enabled = true;
    }

    if let Some(ds) = cluster.cloud_provider.provider().and_then(ccm_daemon_set) {
        status.external_ccm_deployed = accessor
            .daemon_set_exists(NAMESPACE_SYSTEM, ds)
            .with_context(|| format!("Unable to check for daemon set {}", ds))?;
    }

    debug!("Live cluster status: {:?}", status);
    Ok(status)
}
