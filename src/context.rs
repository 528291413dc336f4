use crate::{accessor::ClusterAccessor, cancel::CancelToken, drain::NodeDrainer, poll::Timings};

/// Everything a single migration step needs, shared for the whole run
pub struct Context<'a> {
    /// The live cluster API
    pub accessor: &'a dyn ClusterAccessor,
    /// Node cordon and drain
    pub drainer: &'a dyn NodeDrainer,
    /// Observed by every blocking operation
    pub cancel: CancelToken,
    /// Settle, poll and drain durations
    pub timings: Timings,
    /// The remote work directory holding the kubeadm configs
    pub work_dir: String,
    /// Log every poll attempt and run kubeadm verbosely
    pub verbose: bool,
}
