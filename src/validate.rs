use crate::{
    accessor::ClusterAccessor,
    cluster::{ClusterConfiguration, Provider},
    error::MigrationError,
    resources::{EXTERNAL_CLOUD_PROVIDER_KUBELET_FLAG, parse_bool},
    status::LiveClusterStatus,
};
use anyhow::{Context, Result};
use log::debug;

/// Gate the entry into the migration. Only the configuration and the
/// provided live status snapshot are inspected.
pub fn validate_start(cluster: &ClusterConfiguration, live: &LiveClusterStatus) -> Result<()> {
    let cloud = &cluster.cloud_provider;
    if !cloud.external {
        return Err(MigrationError::configuration(
            ".cloudProvider.external must be enabled to start the migration",
        )
        .into());
    }
    if !cloud.csi_migration_supported() {
        return Err(MigrationError::configuration(
            "ccm/csi migration is not supported for the specified provider",
        )
        .into());
    }
    if !live.in_tree_cloud_provider_enabled {
        return Err(MigrationError::state("the cluster is already running external ccm").into());
    }
    if live.external_ccm_deployed {
        return Err(MigrationError::state(
            "the ccm/csi migration is currently in progress, run the complete command to finish it",
        )
        .into());
    }
    if cloud.provider() == Some(Provider::Vsphere) && cloud.csi_config.is_empty() {
        return Err(MigrationError::configuration(
            "the ccm/csi migration for vsphere requires providing csi configuration using \
             the .cloudProvider.csiConfig field",
        )
        .into());
    }
    if !cluster.static_workers.hosts.is_empty() {
        return Err(MigrationError::configuration(
            "the ccm/csi migration for clusters with static worker nodes is unsupported",
        )
        .into());
    }
    Ok(())
}

/// Gate the completion of the migration: every dynamic worker machine has to
/// be rolled out with the external cloud provider kubelet flag.
pub fn validate_complete(accessor: &dyn ClusterAccessor) -> Result<()> {
    let machines = accessor
        .list_machines()
        .context("Unable to list machines")?;

    for machine in &machines {
        let flag = machine
            .kubelet_flags()
            .get(EXTERNAL_CLOUD_PROVIDER_KUBELET_FLAG)
            .and_then(|x| parse_bool(x));
        if flag != Some(true) {
            debug!(
                "Machine {}/{} is not migrated yet",
                machine.metadata.namespace, machine.metadata.name
            );
            return Err(MigrationError::not_ready(
                "not all machines are rolled-out or the migration is not started yet",
            )
            .into());
        }
    }
    Ok(())
}
