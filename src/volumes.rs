use crate::{accessor::ClusterAccessor, resources::PROVISIONED_BY_ANNOTATION};
use anyhow::{Context, Result};
use log::{debug, info};

/// Provisioner of volumes created by the in-tree Cinder plugin
pub const IN_TREE_CINDER: &str = "kubernetes.io/cinder";

/// Provisioner of volumes managed by the Cinder CSI driver
pub const CSI_CINDER: &str = "cinder.csi.openstack.org";

/// Point all in-tree Cinder volumes to the CSI driver. Returns the number of
/// patched volumes. Stops at the first failed patch; already migrated
/// volumes no longer match on a rerun.
pub fn migrate_persistent_volumes(accessor: &dyn ClusterAccessor, verbose: bool) -> Result<usize> {
    info!(
        "Patching OpenStack persistent volumes with annotation {}={}",
        PROVISIONED_BY_ANNOTATION, CSI_CINDER
    );

    let volumes = accessor
        .list_persistent_volumes()
        .context("Unable to list persistent volumes")?;

    let mut patched = 0;
    for base in volumes.iter().filter(|pv| {
        pv.metadata
            .annotations
            .get(PROVISIONED_BY_ANNOTATION)
            .map(String::as_str)
            == Some(IN_TREE_CINDER)
    }) {
        if verbose {
            debug!("Patching persistent volume {}", base.metadata.name);
        }
        let mut modified = base.clone();
        modified
            .metadata
            .annotations
            .insert(PROVISIONED_BY_ANNOTATION.into(), CSI_CINDER.into());

        accessor
            .patch_persistent_volume(&modified, base)
            .with_context(|| {
                format!(
                    "Unable to patch persistent volume {} with annotation {}={}",
                    base.metadata.name, PROVISIONED_BY_ANNOTATION, CSI_CINDER
                )
            })?;
        patched += 1;
    }

    info!("Patched {} persistent volumes", patched);
    Ok(patched)
}
