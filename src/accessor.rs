use crate::resources::{Machine, PersistentVolume, Pod};
use anyhow::Result;

/// Typed access to the live cluster's control plane API
pub trait ClusterAccessor {
    /// Retrieve a single pod
    fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// List the pods matching the label selector
    fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;

    /// List all machine-controller machines
    fn list_machines(&self) -> Result<Vec<Machine>>;

    /// List all persistent volumes
    fn list_persistent_volumes(&self) -> Result<Vec<PersistentVolume>>;

    /// Patch `modified` against the previously observed `base`. A concurrent
    /// modification of the object results in a conflict error.
    fn patch_persistent_volume(
        &self,
        modified: &PersistentVolume,
        base: &PersistentVolume,
    ) -> Result<()>;

    /// Returns true if the daemon set exists
    fn daemon_set_exists(&self, namespace: &str, name: &str) -> Result<bool>;
}
