//! Error types for the Garnet client.

use garnet_durability::DurabilityError;
use garnet_types::Cas;
use thiserror::Error;

/// Result type for bucket operations.
pub type Result<T> = std::result::Result<T, GarnetError>;

/// Reasons a mutation primitive can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("key not found")]
    KeyNotFound,

    #[error("key already exists")]
    KeyExists,

    /// The document changed since the CAS the caller supplied.
    #[error("cas mismatch")]
    CasMismatch,

    #[error("document value is not a number")]
    NotNumeric,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors surfaced by [`Bucket`](crate::Bucket).
#[derive(Debug, Error)]
pub enum GarnetError {
    /// The mutation itself failed; durability was never checked.
    #[error("mutation failed: {0}")]
    Mutation(#[from] MutationError),

    /// The mutation succeeded with `cas` but could not be proven durable.
    /// It is not rolled back.
    #[error("mutation {cas} applied but not confirmed durable: {source}")]
    Durability {
        cas: Cas,
        /// New value for counter mutations.
        counter: Option<u64>,
        source: DurabilityError,
    },

    #[error("invalid durability configuration: {0}")]
    InvalidConfig(String),
}

impl GarnetError {
    /// CAS of a mutation that was applied before the error occurred.
    pub fn applied_cas(&self) -> Option<Cas> {
        match self {
            GarnetError::Durability { cas, .. } => Some(*cas),
            _ => None,
        }
    }

    pub fn is_durability_timeout(&self) -> bool {
        matches!(self, GarnetError::Durability { source, .. } if source.is_timeout())
    }
}
