//! # garnet-types: Core types for `Garnet`
//!
//! This crate contains the shared vocabulary of the durability subsystem:
//! - Mutation proofs ([`Cas`], [`MutationToken`], [`PartitionUuid`], [`SeqNo`])
//! - Cluster addressing ([`NodeIndex`])
//! - Per-node observations ([`KeyState`], [`KeyObservation`], [`SeqNoObservation`])
//! - Durability requests and outcomes ([`DurabilityRequirement`], [`Verdict`])

use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};

// ============================================================================
// Mutation Proofs - All Copy (cheap 8-byte values)
// ============================================================================

/// Opaque version stamp attached to a document.
///
/// Two stamps are only ever compared for equality. A larger value does not
/// imply a newer document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Cas(u64);

impl Cas {
    pub const ZERO: Cas = Cas(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw stamp.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for Cas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl From<u64> for Cas {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Cas> for u64 {
    fn from(cas: Cas) -> Self {
        cas.0
    }
}

/// Identity of one incarnation of a partition's change history.
///
/// A partition receives a new uuid whenever its history may have diverged
/// (failover, rollback), so sequence numbers are only comparable under the
/// same uuid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct PartitionUuid(u64);

impl PartitionUuid {
    pub fn new(uuid: u64) -> Self {
        Self(uuid)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for PartitionUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PartitionUuid {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<PartitionUuid> for u64 {
    fn from(uuid: PartitionUuid) -> Self {
        uuid.0
    }
}

/// Position of a mutation within a partition's change history.
///
/// Sequence numbers increase monotonically per partition, so a node that
/// reports a sequence number at or above a mutation's has applied it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct SeqNo(u64);

impl SeqNo {
    pub const ZERO: SeqNo = SeqNo(0);

    pub fn new(seqno: u64) -> Self {
        Self(seqno)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for SeqNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SeqNo {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<SeqNo> for u64 {
    fn from(seqno: SeqNo) -> Self {
        seqno.0
    }
}

/// Exact logical position of a mutation: partition incarnation plus
/// sequence number.
///
/// Mutation paths that do not track sequence positions hand back
/// [`MutationToken::NONE`]; callers then fall back to CAS comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct MutationToken {
    pub partition_uuid: PartitionUuid,
    pub seqno: SeqNo,
}

impl MutationToken {
    /// The zero token. Never valid.
    pub const NONE: MutationToken = MutationToken {
        partition_uuid: PartitionUuid(0),
        seqno: SeqNo(0),
    };

    pub fn new(partition_uuid: PartitionUuid, seqno: SeqNo) -> Self {
        Self {
            partition_uuid,
            seqno,
        }
    }

    /// A token is usable only when both halves are non-zero.
    ///
    /// # Examples
    ///
    /// ```
    /// # use garnet_types::{MutationToken, PartitionUuid, SeqNo};
    /// assert!(!MutationToken::NONE.is_valid());
    /// assert!(!MutationToken::new(PartitionUuid::new(7), SeqNo::ZERO).is_valid());
    /// assert!(MutationToken::new(PartitionUuid::new(7), SeqNo::new(1)).is_valid());
    /// ```
    pub fn is_valid(&self) -> bool {
        self.partition_uuid.0 != 0 && self.seqno.0 != 0
    }
}

impl Display for MutationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.partition_uuid, self.seqno)
    }
}

// ============================================================================
// Cluster Addressing
// ============================================================================

/// Position of a node in a key's replica chain.
///
/// Index 0 is the master (the coordinating node that acknowledged the
/// mutation); indices `1..=num_replicas` are its replicas.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub const MASTER: NodeIndex = NodeIndex(0);

    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn is_master(&self) -> bool {
        self.0 == 0
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }

    /// Iterates every node index of a cluster with `server_count` nodes,
    /// master first.
    pub fn all(server_count: usize) -> impl Iterator<Item = NodeIndex> {
        (0..server_count).map(NodeIndex)
    }
}

impl Display for NodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for NodeIndex {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl From<NodeIndex> for usize {
    fn from(index: NodeIndex) -> Self {
        index.0
    }
}

// ============================================================================
// Observations
// ============================================================================

/// State a node reports for a key in response to a CAS observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    /// Held in memory, not yet flushed.
    NotPersisted,
    /// Held in memory and flushed to stable storage.
    Persisted,
    /// The node has no record of the key at all.
    NotFound,
    /// The node holds a deletion marker for the key.
    Deleted,
    /// A state code this client does not understand.
    Unknown,
}

impl KeyState {
    /// Decodes the one-byte state code nodes put on the wire.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => KeyState::NotPersisted,
            0x01 => KeyState::Persisted,
            0x80 => KeyState::NotFound,
            0x81 => KeyState::Deleted,
            _ => KeyState::Unknown,
        }
    }

    /// Wire code for this state. `Unknown` has no code of its own and
    /// encodes as `0xff`.
    pub fn code(&self) -> u8 {
        match self {
            KeyState::NotPersisted => 0x00,
            KeyState::Persisted => 0x01,
            KeyState::NotFound => 0x80,
            KeyState::Deleted => 0x81,
            KeyState::Unknown => 0xff,
        }
    }
}

impl Display for KeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KeyState::NotPersisted => "not-persisted",
            KeyState::Persisted => "persisted",
            KeyState::NotFound => "not-found",
            KeyState::Deleted => "deleted",
            KeyState::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One node's answer to a CAS observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyObservation {
    pub state: KeyState,
    /// CAS the node currently holds for the key.
    pub cas: Cas,
}

impl KeyObservation {
    pub fn new(state: KeyState, cas: Cas) -> Self {
        Self { state, cas }
    }
}

/// One node's answer to a sequence-number observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqNoObservation {
    /// Highest sequence number applied in memory.
    pub current: SeqNo,
    /// Highest sequence number flushed to stable storage.
    pub persisted: SeqNo,
}

impl SeqNoObservation {
    pub fn new(current: SeqNo, persisted: SeqNo) -> Self {
        Self { current, persisted }
    }
}

// ============================================================================
// Durability Requests and Outcomes
// ============================================================================

/// How far a mutation must spread before the caller considers it durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct DurabilityRequirement {
    /// Replica nodes (master excluded) that must hold the mutation in memory.
    pub replicate_to: u32,
    /// Nodes (master included) that must have flushed the mutation.
    pub persist_to: u32,
}

impl DurabilityRequirement {
    /// No durability beyond the coordinator's acknowledgement.
    pub const NONE: DurabilityRequirement = DurabilityRequirement {
        replicate_to: 0,
        persist_to: 0,
    };

    pub fn new(replicate_to: u32, persist_to: u32) -> Self {
        Self {
            replicate_to,
            persist_to,
        }
    }

    /// True when nothing needs to be observed.
    pub fn is_trivial(&self) -> bool {
        self.replicate_to == 0 && self.persist_to == 0
    }

    /// Checks the requirement against a cluster of `server_count` nodes
    /// (master plus replicas).
    ///
    /// # Examples
    ///
    /// ```
    /// # use garnet_types::DurabilityRequirement;
    /// // One master, one replica.
    /// assert!(DurabilityRequirement::new(1, 2).fits(2));
    /// assert!(!DurabilityRequirement::new(2, 0).fits(2));
    /// assert!(!DurabilityRequirement::new(0, 3).fits(2));
    /// ```
    pub fn fits(&self, server_count: usize) -> bool {
        let replicas = server_count.saturating_sub(1);
        self.replicate_to as usize <= replicas && self.persist_to as usize <= server_count
    }
}

impl Display for DurabilityRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "replicate_to={} persist_to={}",
            self.replicate_to, self.persist_to
        )
    }
}

/// What one observation proved about one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Verdict {
    pub replicated: bool,
    pub persisted: bool,
}

impl Verdict {
    /// Nothing proven.
    pub const NONE: Verdict = Verdict {
        replicated: false,
        persisted: false,
    };

    pub fn new(replicated: bool, persisted: bool) -> Self {
        Self {
            replicated,
            persisted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(0x00, KeyState::NotPersisted; "not persisted")]
    #[test_case(0x01, KeyState::Persisted; "persisted")]
    #[test_case(0x80, KeyState::NotFound; "not found")]
    #[test_case(0x81, KeyState::Deleted; "deleted")]
    fn key_state_codes(code: u8, expected: KeyState) {
        assert_eq!(KeyState::from_code(code), expected);
        assert_eq!(expected.code(), code);
    }

    #[test]
    fn unrecognised_key_state_code_is_unknown() {
        assert_eq!(KeyState::from_code(0x02), KeyState::Unknown);
        assert_eq!(KeyState::from_code(0x7f), KeyState::Unknown);
        assert_eq!(KeyState::from_code(0xff), KeyState::Unknown);
    }

    #[test]
    fn master_is_index_zero() {
        assert!(NodeIndex::MASTER.is_master());
        assert!(!NodeIndex::new(1).is_master());
        let all: Vec<_> = NodeIndex::all(3).collect();
        assert_eq!(all, vec![NodeIndex::new(0), NodeIndex::new(1), NodeIndex::new(2)]);
    }

    #[test]
    fn trivial_requirement() {
        assert!(DurabilityRequirement::NONE.is_trivial());
        assert!(!DurabilityRequirement::new(0, 1).is_trivial());
        assert!(!DurabilityRequirement::new(1, 0).is_trivial());
    }

    #[test]
    fn single_node_cluster_cannot_replicate() {
        assert!(DurabilityRequirement::new(0, 1).fits(1));
        assert!(!DurabilityRequirement::new(1, 0).fits(1));
    }

    #[test]
    fn requirement_deserializes_from_json() {
        let req: DurabilityRequirement =
            serde_json::from_str(r#"{"replicate_to":2,"persist_to":1}"#).unwrap();
        assert_eq!(req, DurabilityRequirement::new(2, 1));
    }

    #[test]
    fn cas_display_is_fixed_width_hex() {
        assert_eq!(Cas::new(0xabc).to_string(), "0x0000000000000abc");
    }

    proptest! {
        /// Property: a token is valid exactly when neither half is zero
        #[test]
        fn prop_token_validity(uuid in any::<u64>(), seqno in any::<u64>()) {
            let token = MutationToken::new(PartitionUuid::new(uuid), SeqNo::new(seqno));
            prop_assert_eq!(token.is_valid(), uuid != 0 && seqno != 0);
        }

        /// Property: fits() matches the replica/persist bounds
        #[test]
        fn prop_requirement_bounds(
            replicas in 0usize..8,
            replicate_to in 0u32..10,
            persist_to in 0u32..10,
        ) {
            let server_count = replicas + 1;
            let req = DurabilityRequirement::new(replicate_to, persist_to);
            let expected = (replicate_to as usize) <= replicas
                && (persist_to as usize) <= server_count;
            prop_assert_eq!(req.fits(server_count), expected);
        }
    }
}
