use crate::cancel::CancelToken;
use anyhow::Result;

/// Cordon and drain a node before it gets reconfigured
pub trait NodeDrainer {
    /// Mark the node unschedulable (`desired == true`) or schedulable again
    fn cordon(&self, node: &str, desired: bool) -> Result<()>;

    /// Evict all movable pods and block until the node is drained or the
    /// token gets cancelled
    fn drain(&self, node: &str, cancel: &CancelToken) -> Result<()>;
}
