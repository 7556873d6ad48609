//! # garnet: Key-value client with durability confirmation
//!
//! A [`Bucket`] wraps any [`KvClient`] and offers a `*_dura` variant of
//! each mutation primitive. The variant performs the mutation, then polls
//! the cluster until the mutation is held in memory by the requested number
//! of replicas and flushed to disk by the requested number of nodes.
//!
//! ```ignore
//! let bucket = Bucket::new(Arc::new(client));
//! let cas = bucket
//!     .upsert_dura("user:42", "{}", 0, DurabilityRequirement::new(1, 1))
//!     .await?;
//! ```
//!
//! The protocol itself lives in [`garnet_durability`]; the core types are
//! re-exported from [`garnet_types`].

mod bucket;
mod client;
mod error;

pub use bucket::Bucket;
pub use client::{CounterMutation, KvClient, Mutation};
pub use error::{GarnetError, MutationError, Result};

pub use garnet_durability::{
    DurabilityChecker, DurabilityError, NodeObserver, ObserveError, PendingOp, PollSchedule,
};
pub use garnet_types::{
    Cas, DurabilityRequirement, KeyObservation, KeyState, MutationToken, NodeIndex,
    PartitionUuid, SeqNo, SeqNoObservation, Verdict,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durability_error_keeps_applied_cas() {
        let err = GarnetError::Durability {
            cas: Cas::new(0x2a),
            counter: None,
            source: DurabilityError::Timeout {
                replicated: 0,
                replicate_to: 1,
                persisted: 1,
                persist_to: 1,
            },
        };
        assert_eq!(err.applied_cas(), Some(Cas::new(0x2a)));
        assert!(err.is_durability_timeout());
        assert!(err.to_string().contains("0x000000000000002a"));
    }

    #[test]
    fn mutation_error_has_no_cas() {
        let err = GarnetError::from(MutationError::KeyExists);
        assert_eq!(err.applied_cas(), None);
        assert!(!err.is_durability_timeout());
    }
}
