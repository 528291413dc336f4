//! Error types of the migration
use std::time::Duration;
use thiserror::Error;

/// The kind of a terminal migration failure.
///
/// Every component returns `anyhow::Result`, the kind travels as the root
/// (or an intermediate) cause of the chain and can be recovered with
/// [`MigrationError::find`].
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Bad or missing input, the user has to edit the configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The cluster is in a state which does not allow the requested phase
    #[error("state error: {0}")]
    State(String),

    /// A required dependency has not been wired up
    #[error("precondition error: {0}")]
    Precondition(String),

    /// Draining a node failed, stuck pods have to be inspected
    #[error("unable to drain node '{node}'")]
    Drain {
        /// The node which could not be drained
        node: String,
        /// The underlying drain failure
        #[source]
        source: anyhow::Error,
    },

    /// A poll exceeded its wall clock budget
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout {
        /// What has been waited for
        what: String,
        /// The exceeded budget
        timeout: Duration,
    },

    /// A static pod did not become healthy after its manifest changed
    #[error("static pod '{pod}' did not roll out within {timeout:?}")]
    RolloutTimeout {
        /// The name of the static pod
        pod: String,
        /// The exceeded budget
        timeout: Duration,
    },

    /// The completion gate is not satisfied yet
    #[error("not ready: {0}")]
    NotReady(String),

    /// The run has been cancelled
    #[error("migration cancelled")]
    Cancelled,
}

impl MigrationError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a not ready error
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// Find the first migration error inside the provided error chain
    pub fn find(err: &anyhow::Error) -> Option<&MigrationError> {
        err.chain().find_map(|x| x.downcast_ref::<MigrationError>())
    }
}

/// The failure of a single control plane node during the sequential fold
#[derive(Debug, Error)]
#[error("{step} failed on control plane node #{index} ({hostname})")]
pub struct NodeFailure {
    /// Zero based position of the node in the control plane host list
    pub index: usize,
    /// The hostname of the failed node
    pub hostname: String,
    /// The step which failed
    pub step: &'static str,
    /// The underlying error
    #[source]
    pub source: anyhow::Error,
}

impl NodeFailure {
    /// Find the node failure inside the provided error chain
    pub fn find(err: &anyhow::Error) -> Option<&NodeFailure> {
        err.chain().find_map(|x| x.downcast_ref::<NodeFailure>())
    }
}
