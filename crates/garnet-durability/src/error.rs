//! Error types for durability confirmation.

use garnet_types::{DurabilityRequirement, NodeIndex};
use thiserror::Error;

/// Failure of a single observation against a single node.
///
/// These never reach the caller of [`DurabilityChecker::confirm`]; the poller
/// converts them into negative verdicts for that node.
///
/// [`DurabilityChecker::confirm`]: crate::DurabilityChecker::confirm
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObserveError {
    /// The request or its response was lost or malformed.
    #[error("transport error: {0}")]
    Transport(String),

    /// No connection to the node is available.
    #[error("node {0} is unavailable")]
    NodeUnavailable(NodeIndex),

    /// The observation was cancelled before it completed.
    #[error("observation cancelled")]
    Cancelled,
}

/// Cluster-level outcome of a failed confirmation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurabilityError {
    /// The requirement asks for more nodes than the cluster has. Raised
    /// before any node is contacted.
    #[error(
        "not enough replicas to match durability requirements ({requirement}, cluster has {server_count} nodes)"
    )]
    InsufficientReplicas {
        requirement: DurabilityRequirement,
        server_count: usize,
    },

    /// Every node reported back without the requirement being met. The
    /// mutation itself is not rolled back.
    #[error(
        "failed to meet durability requirements in time (replicated {replicated}/{replicate_to}, persisted {persisted}/{persist_to})"
    )]
    Timeout {
        replicated: u32,
        replicate_to: u32,
        persisted: u32,
        persist_to: u32,
    },
}

impl DurabilityError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DurabilityError::Timeout { .. })
    }
}

/// Result type for durability operations.
pub type Result<T> = std::result::Result<T, DurabilityError>;
