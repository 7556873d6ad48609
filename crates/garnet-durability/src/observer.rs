//! The per-node observation RPCs this crate consumes.

use bytes::Bytes;
use garnet_types::{KeyObservation, NodeIndex, PartitionUuid, SeqNoObservation};

use crate::{ObserveError, PendingOp};

/// Access to the cluster's per-node view of a key.
///
/// Implementations own the wire protocol. Both observation calls are
/// non-blocking: they dispatch a request and return a [`PendingOp`]
/// immediately. An `Err` from the call itself means the request could not
/// be sent at all; an `Err` from the pending op means it was sent but no
/// usable answer came back.
pub trait NodeObserver: Send + Sync + 'static {
    /// Number of replicas configured for the bucket (master excluded).
    fn num_replicas(&self) -> usize;

    /// Asks `node` for the state and CAS it currently holds for `key`.
    fn observe(&self, key: &Bytes, node: NodeIndex)
    -> Result<PendingOp<KeyObservation>, ObserveError>;

    /// Asks `node` how far it has applied and persisted the history of the
    /// partition owning `key`.
    fn observe_seqno(
        &self,
        key: &Bytes,
        partition_uuid: PartitionUuid,
        node: NodeIndex,
    ) -> Result<PendingOp<SeqNoObservation>, ObserveError>;

    /// Master plus replicas.
    fn server_count(&self) -> usize {
        self.num_replicas() + 1
    }
}
