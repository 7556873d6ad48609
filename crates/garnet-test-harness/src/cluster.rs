//! In-memory cluster: one shared document store, per-node visibility derived
//! from how long ago each mutation happened.
//!
//! Nothing is copied between nodes. A node "holds" a version once its
//! replication delay has passed since the mutation and "has flushed" it once
//! its persistence delay has passed. Time is `tokio::time`, so tests running
//! on a paused clock get deterministic schedules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use garnet::{
    Cas, CounterMutation, KeyObservation, KeyState, KvClient, Mutation, MutationError,
    MutationToken, NodeIndex, NodeObserver, ObserveError, PartitionUuid, PendingOp, SeqNo,
    SeqNoObservation,
};
use garnet_config::SimulationConfig;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::trace;

use crate::behavior::{NodeBehavior, NodeFault, NodeTiming};

/// Partitions keys are hashed into.
pub const NUM_PARTITIONS: usize = 64;

/// Values a node compares against when it looks at a key.
#[derive(Debug, Clone)]
struct Version {
    cas: Cas,
    seqno: SeqNo,
    value: Bytes,
    deleted: bool,
    at: Instant,
}

#[derive(Debug)]
struct Partition {
    uuid: PartitionUuid,
    high_seqno: SeqNo,
    history: Vec<(SeqNo, Instant)>,
}

#[derive(Debug)]
struct Store {
    documents: HashMap<Bytes, Vec<Version>>,
    partitions: Vec<Partition>,
    last_cas: u64,
}

impl Store {
    fn new() -> Self {
        let partitions = (0..NUM_PARTITIONS as u64)
            .map(|i| Partition {
                uuid: PartitionUuid::new(0xa5a5_0000 + i),
                high_seqno: SeqNo::ZERO,
                history: Vec::new(),
            })
            .collect();
        Self {
            documents: HashMap::new(),
            partitions,
            last_cas: 0x1000,
        }
    }

    /// Latest live version of `key`, as the master sees it.
    fn live(&self, key: &str) -> Option<&Version> {
        self.documents
            .get(key.as_bytes())
            .and_then(|versions| versions.last())
            .filter(|version| !version.deleted)
    }

    fn check_cas(&self, key: &str, cas: Cas) -> Result<&Version, MutationError> {
        let current = self.live(key).ok_or(MutationError::KeyNotFound)?;
        if cas != Cas::ZERO && cas != current.cas {
            return Err(MutationError::CasMismatch);
        }
        Ok(current)
    }

    fn commit(&mut self, key: &str, value: Bytes, deleted: bool, tokens: bool) -> Mutation {
        let now = Instant::now();
        self.last_cas += 1;
        let cas = Cas::new(self.last_cas);

        let partition = &mut self.partitions[partition_of(key.as_bytes())];
        partition.high_seqno = SeqNo::new(partition.high_seqno.as_u64() + 1);
        let seqno = partition.high_seqno;
        partition.history.push((seqno, now));

        self.documents
            .entry(Bytes::copy_from_slice(key.as_bytes()))
            .or_default()
            .push(Version {
                cas,
                seqno,
                value,
                deleted,
                at: now,
            });

        let token = if tokens {
            MutationToken::new(partition.uuid, seqno)
        } else {
            MutationToken::NONE
        };
        trace!(key, %cas, seqno = seqno.as_u64(), deleted, "committed");
        Mutation::new(cas, token)
    }
}

/// FNV-1a, folded onto the partition count.
fn partition_of(key: &[u8]) -> usize {
    let hash = key.iter().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    });
    (hash % NUM_PARTITIONS as u64) as usize
}

fn reached(at: Instant, delay: Option<Duration>, now: Instant) -> bool {
    delay.is_some_and(|delay| at + delay <= now)
}

#[derive(Debug)]
struct Shared {
    nodes: Vec<NodeTiming>,
    observe_latency: Duration,
    mutation_tokens: bool,
    store: Mutex<Store>,
    observe_calls: AtomicUsize,
    cancelled: AtomicUsize,
}

impl Shared {
    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key_view(&self, key: &[u8], node: NodeTiming) -> KeyObservation {
        let now = Instant::now();
        let store = self.store();
        let visible = store
            .documents
            .get(key)
            .and_then(|versions| versions.iter().rev().find(|v| reached(v.at, node.replication, now)));

        match visible {
            None => KeyObservation::new(KeyState::NotFound, Cas::ZERO),
            Some(version) => {
                let flushed = reached(version.at, node.persistence, now);
                let state = match (version.deleted, flushed) {
                    (false, false) => KeyState::NotPersisted,
                    (false, true) => KeyState::Persisted,
                    (true, false) => KeyState::Deleted,
                    // A flushed tombstone is purged from the node's view.
                    (true, true) => KeyState::NotFound,
                };
                KeyObservation::new(state, version.cas)
            }
        }
    }

    fn seqno_view(
        &self,
        key: &[u8],
        partition_uuid: PartitionUuid,
        node: NodeTiming,
    ) -> Result<SeqNoObservation, ObserveError> {
        let now = Instant::now();
        let store = self.store();
        let partition = &store.partitions[partition_of(key)];
        if partition.uuid != partition_uuid {
            return Err(ObserveError::Transport(format!(
                "partition uuid {partition_uuid} is not current"
            )));
        }
        let highest = |delay| {
            partition
                .history
                .iter()
                .rev()
                .find(|(_, at)| reached(*at, delay, now))
                .map_or(SeqNo::ZERO, |(seqno, _)| *seqno)
        };
        Ok(SeqNoObservation::new(
            highest(node.replication),
            highest(node.persistence),
        ))
    }
}

/// A simulated cluster implementing both the mutation primitives and the
/// per-node observation calls.
///
/// Cloning shares the cluster.
#[derive(Debug, Clone)]
pub struct SimCluster {
    shared: Arc<Shared>,
}

impl SimCluster {
    pub fn builder() -> SimClusterBuilder {
        SimClusterBuilder::new()
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        SimClusterBuilder::from_config(config).build()
    }

    /// Observation requests dispatched so far, refused ones included.
    pub fn observe_calls(&self) -> usize {
        self.shared.observe_calls.load(Ordering::SeqCst)
    }

    /// Observation requests cancelled before they were answered.
    pub fn cancelled_observations(&self) -> usize {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Current value and CAS of `key`, as the master sees it.
    pub fn get(&self, key: &str) -> Option<(Bytes, Cas)> {
        self.shared
            .store()
            .live(key)
            .map(|version| (version.value.clone(), version.cas))
    }

    fn timing(&self, node: NodeIndex) -> Result<NodeTiming, ObserveError> {
        self.shared.observe_calls.fetch_add(1, Ordering::SeqCst);
        let timing = self
            .shared
            .nodes
            .get(node.as_usize())
            .copied()
            .ok_or(ObserveError::NodeUnavailable(node))?;
        if timing.fault == Some(NodeFault::Unreachable) {
            return Err(ObserveError::NodeUnavailable(node));
        }
        Ok(timing)
    }

    /// Answers after the observe latency, computing the answer at that
    /// moment so it reflects progress made while the request was in flight.
    fn dispatch<T, F>(&self, timing: NodeTiming, answer: F) -> PendingOp<T>
    where
        T: Send + 'static,
        F: FnOnce(&Shared) -> Result<T, ObserveError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let latency = shared.observe_latency;
        let task = tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            match timing.fault {
                Some(NodeFault::Unresponsive) => {
                    let _tx = tx;
                    std::future::pending::<()>().await;
                }
                Some(NodeFault::DropResponses) => {
                    let _ = tx.send(Err(ObserveError::Transport("response dropped".into())));
                }
                _ => {
                    let _ = tx.send(answer(&shared));
                }
            }
        });

        let abort = task.abort_handle();
        let shared = Arc::clone(&self.shared);
        PendingOp::from_receiver(rx, move || {
            shared.cancelled.fetch_add(1, Ordering::SeqCst);
            abort.abort();
        })
    }

    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Store, bool) -> Result<T, MutationError>,
    ) -> Result<T, MutationError> {
        op(&mut self.shared.store(), self.shared.mutation_tokens)
    }
}

impl NodeObserver for SimCluster {
    fn num_replicas(&self) -> usize {
        self.shared.nodes.len() - 1
    }

    fn observe(
        &self,
        key: &Bytes,
        node: NodeIndex,
    ) -> Result<PendingOp<KeyObservation>, ObserveError> {
        let timing = self.timing(node)?;
        let key = key.clone();
        Ok(self.dispatch(timing, move |shared| Ok(shared.key_view(&key, timing))))
    }

    fn observe_seqno(
        &self,
        key: &Bytes,
        partition_uuid: PartitionUuid,
        node: NodeIndex,
    ) -> Result<PendingOp<SeqNoObservation>, ObserveError> {
        let timing = self.timing(node)?;
        let key = key.clone();
        Ok(self.dispatch(timing, move |shared| {
            shared.seqno_view(&key, partition_uuid, timing)
        }))
    }
}

impl KvClient for SimCluster {
    async fn touch(&self, key: &str, cas: Cas, _expiry: u32) -> Result<Mutation, MutationError> {
        self.mutate(|store, tokens| {
            let value = store.check_cas(key, cas)?.value.clone();
            Ok(store.commit(key, value, false, tokens))
        })
    }

    async fn remove(&self, key: &str, cas: Cas) -> Result<Mutation, MutationError> {
        self.mutate(|store, tokens| {
            store.check_cas(key, cas)?;
            Ok(store.commit(key, Bytes::new(), true, tokens))
        })
    }

    async fn upsert(
        &self,
        key: &str,
        value: Bytes,
        _expiry: u32,
    ) -> Result<Mutation, MutationError> {
        self.mutate(|store, tokens| Ok(store.commit(key, value, false, tokens)))
    }

    async fn insert(
        &self,
        key: &str,
        value: Bytes,
        _expiry: u32,
    ) -> Result<Mutation, MutationError> {
        self.mutate(|store, tokens| {
            if store.live(key).is_some() {
                return Err(MutationError::KeyExists);
            }
            Ok(store.commit(key, value, false, tokens))
        })
    }

    async fn replace(
        &self,
        key: &str,
        value: Bytes,
        cas: Cas,
        _expiry: u32,
    ) -> Result<Mutation, MutationError> {
        self.mutate(|store, tokens| {
            store.check_cas(key, cas)?;
            Ok(store.commit(key, value, false, tokens))
        })
    }

    async fn append(&self, key: &str, value: Bytes) -> Result<Mutation, MutationError> {
        self.mutate(|store, tokens| {
            let current = &store.live(key).ok_or(MutationError::KeyNotFound)?.value;
            let mut joined = BytesMut::with_capacity(current.len() + value.len());
            joined.extend_from_slice(current);
            joined.extend_from_slice(&value);
            Ok(store.commit(key, joined.freeze(), false, tokens))
        })
    }

    async fn prepend(&self, key: &str, value: Bytes) -> Result<Mutation, MutationError> {
        self.mutate(|store, tokens| {
            let current = &store.live(key).ok_or(MutationError::KeyNotFound)?.value;
            let mut joined = BytesMut::with_capacity(current.len() + value.len());
            joined.extend_from_slice(&value);
            joined.extend_from_slice(current);
            Ok(store.commit(key, joined.freeze(), false, tokens))
        })
    }

    async fn counter(
        &self,
        key: &str,
        delta: i64,
        initial: Option<u64>,
        _expiry: u32,
    ) -> Result<CounterMutation, MutationError> {
        self.mutate(|store, tokens| {
            let value = match store.live(key) {
                None => initial.ok_or(MutationError::KeyNotFound)?,
                Some(version) => {
                    let current = std::str::from_utf8(&version.value)
                        .ok()
                        .and_then(|text| text.trim().parse::<u64>().ok())
                        .ok_or(MutationError::NotNumeric)?;
                    // Increments wrap, decrements stop at zero.
                    if delta >= 0 {
                        current.wrapping_add(delta.unsigned_abs())
                    } else {
                        current.saturating_sub(delta.unsigned_abs())
                    }
                }
            };
            let mutation = store.commit(key, Bytes::from(value.to_string()), false, tokens);
            Ok(CounterMutation { value, mutation })
        })
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builds a [`SimCluster`]. Defaults match [`SimulationConfig::default`].
#[derive(Debug, Clone)]
pub struct SimClusterBuilder {
    replicas: usize,
    replication_delay: Duration,
    persistence_delay: Duration,
    observe_latency: Duration,
    mutation_tokens: bool,
    overrides: HashMap<usize, NodeBehavior>,
}

impl SimClusterBuilder {
    pub fn new() -> Self {
        Self::from_config(&SimulationConfig::default())
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            replicas: config.replicas as usize,
            replication_delay: Duration::from_millis(config.replication_delay_ms),
            persistence_delay: Duration::from_millis(config.persistence_delay_ms),
            observe_latency: Duration::from_millis(config.observe_latency_ms),
            mutation_tokens: config.mutation_tokens,
            overrides: HashMap::new(),
        }
    }

    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn with_replication_delay(mut self, delay: Duration) -> Self {
        self.replication_delay = delay;
        self
    }

    pub fn with_persistence_delay(mut self, delay: Duration) -> Self {
        self.persistence_delay = delay;
        self
    }

    pub fn with_observe_latency(mut self, latency: Duration) -> Self {
        self.observe_latency = latency;
        self
    }

    /// When disabled every mutation returns [`MutationToken::NONE`], which
    /// forces CAS-based confirmation.
    pub fn with_mutation_tokens(mut self, enabled: bool) -> Self {
        self.mutation_tokens = enabled;
        self
    }

    /// Overrides the behavior of node `index` (0 is the master).
    pub fn with_node(mut self, index: usize, behavior: NodeBehavior) -> Self {
        self.overrides.insert(index, behavior);
        self
    }

    pub fn build(self) -> SimCluster {
        let nodes = (0..=self.replicas)
            .map(|index| {
                NodeTiming::resolve(
                    self.overrides.get(&index).copied().unwrap_or_default(),
                    self.replication_delay,
                    self.persistence_delay,
                    index == 0,
                )
            })
            .collect();
        SimCluster {
            shared: Arc::new(Shared {
                nodes,
                observe_latency: self.observe_latency,
                mutation_tokens: self.mutation_tokens,
                store: Mutex::new(Store::new()),
                observe_calls: AtomicUsize::new(0),
                cancelled: AtomicUsize::new(0),
            }),
        }
    }
}

impl Default for SimClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
