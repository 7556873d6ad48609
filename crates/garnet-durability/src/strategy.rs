//! Observation translation: raw node state in, [`Verdict`] out.
//!
//! Two rules exist. The sequence-number rule compares a node's applied and
//! persisted positions against the mutation's token and is immune to later
//! writes to the same key. The CAS rule compares the node's current CAS with
//! the one the mutation produced and is used only when no token is available.
//! One rule is picked per confirmation attempt and never mixed.

use bytes::Bytes;
use garnet_types::{
    Cas, KeyObservation, KeyState, MutationToken, NodeIndex, SeqNoObservation, Verdict,
};

use crate::{NodeObserver, ObserveError, PendingOp};

/// How a confirmation attempt observes its mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationStrategy {
    /// Compare the CAS each node holds against the mutation's CAS.
    Cas { cas: Cas, for_delete: bool },
    /// Compare each node's sequence positions against the mutation token.
    SeqNo { token: MutationToken },
}

impl ObservationStrategy {
    /// Prefers the token whenever it is valid.
    pub fn select(cas: Cas, token: MutationToken, for_delete: bool) -> Self {
        if token.is_valid() {
            ObservationStrategy::SeqNo { token }
        } else {
            ObservationStrategy::Cas { cas, for_delete }
        }
    }

    pub fn is_seqno(&self) -> bool {
        matches!(self, ObservationStrategy::SeqNo { .. })
    }

    /// Dispatches one observation of `key` on `node` and translates the
    /// answer when it arrives.
    pub fn observe<O: NodeObserver + ?Sized>(
        self,
        observer: &O,
        key: &Bytes,
        node: NodeIndex,
    ) -> Result<PendingOp<Verdict>, ObserveError> {
        match self {
            ObservationStrategy::Cas { cas, for_delete } => {
                let pending = observer.observe(key, node)?;
                Ok(pending.map(move |obs| translate_key_state(&obs, cas, for_delete, node)))
            }
            ObservationStrategy::SeqNo { token } => {
                let pending = observer.observe_seqno(key, token.partition_uuid, node)?;
                Ok(pending.map(move |obs| translate_seqno(&obs, token)))
            }
        }
    }
}

/// CAS rule.
///
/// | observed state            | write                               | delete                |
/// |---------------------------|-------------------------------------|-----------------------|
/// | persisted, same CAS       | replicated unless master, persisted | -                     |
/// | not persisted, same CAS   | replicated unless master            | -                     |
/// | deleted                   | -                                   | replicated            |
/// | not found / unknown       | -                                   | replicated, persisted |
///
/// Every other combination proves nothing. The master never counts as its
/// own replica. A key the node no longer knows at all has been fully purged,
/// which for a delete is the strongest possible answer.
pub fn translate_key_state(
    obs: &KeyObservation,
    cas: Cas,
    for_delete: bool,
    node: NodeIndex,
) -> Verdict {
    match (obs.state, for_delete) {
        (KeyState::Persisted, false) if obs.cas == cas => Verdict::new(!node.is_master(), true),
        (KeyState::NotPersisted, false) if obs.cas == cas => Verdict::new(!node.is_master(), false),
        (KeyState::Deleted, true) => Verdict::new(true, false),
        (KeyState::NotFound | KeyState::Unknown, true) => Verdict::new(true, true),
        _ => Verdict::NONE,
    }
}

/// Sequence-number rule. Applies to the master as well as replicas.
pub fn translate_seqno(obs: &SeqNoObservation, token: MutationToken) -> Verdict {
    Verdict::new(obs.current >= token.seqno, obs.persisted >= token.seqno)
}

#[cfg(test)]
mod tests {
    use super::*;
    use garnet_types::{PartitionUuid, SeqNo};
    use proptest::prelude::*;
    use test_case::test_case;

    fn cas() -> Cas {
        Cas::new(0x1234)
    }

    fn token(seqno: u64) -> MutationToken {
        MutationToken::new(PartitionUuid::new(99), SeqNo::new(seqno))
    }

    #[test_case(KeyState::Persisted, 1, (true, true); "persisted on replica")]
    #[test_case(KeyState::Persisted, 0, (false, true); "persisted on master")]
    #[test_case(KeyState::NotPersisted, 2, (true, false); "in memory on replica")]
    #[test_case(KeyState::NotPersisted, 0, (false, false); "in memory on master")]
    #[test_case(KeyState::Deleted, 1, (false, false); "deleted while confirming write")]
    #[test_case(KeyState::NotFound, 1, (false, false); "missing while confirming write")]
    #[test_case(KeyState::Unknown, 1, (false, false); "unknown while confirming write")]
    fn write_confirmation_with_matching_cas(state: KeyState, node: usize, expected: (bool, bool)) {
        let obs = KeyObservation::new(state, cas());
        let verdict = translate_key_state(&obs, cas(), false, NodeIndex::new(node));
        assert_eq!(verdict, Verdict::new(expected.0, expected.1));
    }

    #[test_case(KeyState::Deleted, 0, (true, false); "deleted on master")]
    #[test_case(KeyState::Deleted, 1, (true, false); "deleted on replica")]
    #[test_case(KeyState::NotFound, 0, (true, true); "purged on master")]
    #[test_case(KeyState::Unknown, 2, (true, true); "unknown on replica")]
    #[test_case(KeyState::Persisted, 1, (false, false); "still present")]
    #[test_case(KeyState::NotPersisted, 1, (false, false); "still present in memory")]
    fn delete_confirmation(state: KeyState, node: usize, expected: (bool, bool)) {
        let obs = KeyObservation::new(state, cas());
        let verdict = translate_key_state(&obs, cas(), true, NodeIndex::new(node));
        assert_eq!(verdict, Verdict::new(expected.0, expected.1));
    }

    #[test]
    fn delete_ignores_cas() {
        let obs = KeyObservation::new(KeyState::Deleted, Cas::new(1));
        let verdict = translate_key_state(&obs, cas(), true, NodeIndex::new(1));
        assert_eq!(verdict, Verdict::new(true, false));
    }

    #[test]
    fn zero_token_selects_cas_rule() {
        let strategy = ObservationStrategy::select(cas(), MutationToken::NONE, false);
        assert_eq!(
            strategy,
            ObservationStrategy::Cas {
                cas: cas(),
                for_delete: false
            }
        );
    }

    #[test]
    fn half_zero_token_selects_cas_rule() {
        let no_uuid = MutationToken::new(PartitionUuid::new(0), SeqNo::new(5));
        let no_seqno = MutationToken::new(PartitionUuid::new(5), SeqNo::new(0));
        assert!(!ObservationStrategy::select(cas(), no_uuid, false).is_seqno());
        assert!(!ObservationStrategy::select(cas(), no_seqno, true).is_seqno());
    }

    #[test]
    fn valid_token_selects_seqno_rule_even_for_delete() {
        let strategy = ObservationStrategy::select(cas(), token(10), true);
        assert_eq!(strategy, ObservationStrategy::SeqNo { token: token(10) });
    }

    #[test_case(9, 9, (false, false); "behind")]
    #[test_case(10, 9, (true, false); "applied not flushed")]
    #[test_case(10, 10, (true, true); "flushed")]
    #[test_case(50, 40, (true, true); "ahead")]
    fn seqno_rule(current: u64, persisted: u64, expected: (bool, bool)) {
        let obs = SeqNoObservation::new(SeqNo::new(current), SeqNo::new(persisted));
        assert_eq!(translate_seqno(&obs, token(10)), Verdict::new(expected.0, expected.1));
    }

    fn any_state() -> impl Strategy<Value = KeyState> {
        prop_oneof![
            Just(KeyState::NotPersisted),
            Just(KeyState::Persisted),
            Just(KeyState::NotFound),
            Just(KeyState::Deleted),
            Just(KeyState::Unknown),
        ]
    }

    proptest! {
        /// Property: a write superseded on a node proves nothing about it
        #[test]
        fn prop_cas_mismatch_proves_nothing(
            state in any_state(),
            observed in any::<u64>(),
            expected in any::<u64>(),
            node in 0usize..4,
        ) {
            prop_assume!(observed != expected);
            let obs = KeyObservation::new(state, Cas::new(observed));
            let verdict = translate_key_state(&obs, Cas::new(expected), false, NodeIndex::new(node));
            prop_assert_eq!(verdict, Verdict::NONE);
        }

        /// Property: the master is never counted as a replica of a write
        #[test]
        fn prop_master_never_replicates_write(state in any_state(), value in any::<u64>()) {
            let obs = KeyObservation::new(state, Cas::new(value));
            let verdict = translate_key_state(&obs, Cas::new(value), false, NodeIndex::MASTER);
            prop_assert!(!verdict.replicated);
        }

        /// Property: persisted position never outruns applied position in the verdict
        #[test]
        fn prop_seqno_verdict_tracks_positions(
            current in 0u64..1000,
            lag in 0u64..1000,
            target in 1u64..1000,
        ) {
            let persisted = current.saturating_sub(lag);
            let obs = SeqNoObservation::new(SeqNo::new(current), SeqNo::new(persisted));
            let verdict = translate_seqno(&obs, token(target));
            prop_assert_eq!(verdict.replicated, current >= target);
            prop_assert_eq!(verdict.persisted, persisted >= target);
            prop_assert!(!verdict.persisted || verdict.replicated);
        }
    }
}
