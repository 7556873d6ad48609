//! Cluster-wide confirmation: fan out one poller per node, fan their
//! verdicts back in, and decide against the caller's requirement.

use std::sync::Arc;

use bytes::Bytes;
use garnet_types::{Cas, DurabilityRequirement, MutationToken, NodeIndex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::poller::{NodePoller, VerdictSink};
use crate::{DurabilityError, NodeObserver, ObservationStrategy, PollSchedule, Result};

/// Running count of verdict signals for one confirmation attempt.
///
/// Both counters only ever grow. Each node sends exactly one replication
/// signal and one persistence signal, so an attempt over `n` nodes is over
/// after `2 * n` signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QuorumTally {
    requirement: DurabilityRequirement,
    replicated: u32,
    persisted: u32,
    received: usize,
    expected: usize,
}

impl QuorumTally {
    pub(crate) fn new(requirement: DurabilityRequirement, server_count: usize) -> Self {
        Self {
            requirement,
            replicated: 0,
            persisted: 0,
            received: 0,
            expected: server_count * 2,
        }
    }

    pub(crate) fn record_replicated(&mut self, confirmed: bool) {
        self.received += 1;
        if confirmed {
            self.replicated += 1;
        }
    }

    pub(crate) fn record_persisted(&mut self, confirmed: bool) {
        self.received += 1;
        if confirmed {
            self.persisted += 1;
        }
    }

    pub(crate) fn is_met(&self) -> bool {
        self.replicated >= self.requirement.replicate_to
            && self.persisted >= self.requirement.persist_to
    }

    /// Every node has reported both flags.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.received >= self.expected
    }

    pub(crate) fn timeout_error(&self) -> DurabilityError {
        DurabilityError::Timeout {
            replicated: self.replicated,
            replicate_to: self.requirement.replicate_to,
            persisted: self.persisted,
            persist_to: self.requirement.persist_to,
        }
    }
}

/// Confirms that mutations reached enough replicas and disks.
///
/// Cheap to share: holds the observer behind an `Arc` and a copyable
/// schedule. Every call to [`confirm`](Self::confirm) is an independent
/// attempt with its own pollers, channels and timers.
#[derive(Debug)]
pub struct DurabilityChecker<O: ?Sized> {
    observer: Arc<O>,
    schedule: PollSchedule,
}

impl<O: ?Sized> Clone for DurabilityChecker<O> {
    fn clone(&self) -> Self {
        Self {
            observer: Arc::clone(&self.observer),
            schedule: self.schedule,
        }
    }
}

impl<O: NodeObserver + ?Sized> DurabilityChecker<O> {
    pub fn new(observer: Arc<O>, schedule: PollSchedule) -> Self {
        Self { observer, schedule }
    }

    pub fn schedule(&self) -> PollSchedule {
        self.schedule
    }

    pub fn observer(&self) -> &Arc<O> {
        &self.observer
    }

    /// Waits until the mutation of `key` identified by `cas` / `token` is
    /// replicated and persisted as `requirement` demands.
    ///
    /// The token is used when valid, otherwise the CAS. `for_delete` selects
    /// the deletion rows of the CAS rule and is ignored under the token rule.
    ///
    /// Returns as soon as the requirement is met. Pollers still running at
    /// that point notice the orchestrator is gone, cancel their in-flight
    /// observation and exit.
    ///
    /// # Errors
    ///
    /// - [`DurabilityError::InsufficientReplicas`] if the cluster is too small
    ///   for the requirement; no node is contacted.
    /// - [`DurabilityError::Timeout`] once every node has reported without
    ///   the requirement being met.
    pub async fn confirm(
        &self,
        key: &[u8],
        cas: Cas,
        token: MutationToken,
        requirement: DurabilityRequirement,
        for_delete: bool,
    ) -> Result<()> {
        let server_count = self.observer.server_count();
        if !requirement.fits(server_count) {
            return Err(DurabilityError::InsufficientReplicas {
                requirement,
                server_count,
            });
        }
        if requirement.is_trivial() {
            return Ok(());
        }

        let strategy = ObservationStrategy::select(cas, token, for_delete);
        let key = Bytes::copy_from_slice(key);
        debug!(
            %requirement,
            server_count,
            seqno = strategy.is_seqno(),
            for_delete,
            "confirming durability"
        );

        // Each poller sends at most one signal per channel, so a capacity of
        // one slot per node means sends never wait.
        let (replicated_tx, mut replicated_rx) = mpsc::channel(server_count);
        let (persisted_tx, mut persisted_rx) = mpsc::channel(server_count);

        for node in NodeIndex::all(server_count) {
            let sink = VerdictSink::new(replicated_tx.clone(), persisted_tx.clone());
            NodePoller::new(
                Arc::clone(&self.observer),
                key.clone(),
                strategy,
                node,
                self.schedule,
                sink,
            )
            .spawn();
        }
        drop(replicated_tx);
        drop(persisted_tx);

        let mut tally = QuorumTally::new(requirement, server_count);
        while !tally.is_exhausted() {
            tokio::select! {
                Some(confirmed) = replicated_rx.recv() => tally.record_replicated(confirmed),
                Some(confirmed) = persisted_rx.recv() => tally.record_persisted(confirmed),
                else => break,
            }

            if tally.is_met() {
                debug!(
                    replicated = tally.replicated,
                    persisted = tally.persisted,
                    "durability requirement met"
                );
                return Ok(());
            }
        }

        let error = tally.timeout_error();
        warn!(%error, "durability requirement not met");
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_declared_exactly_when_both_thresholds_cross() {
        let mut tally = QuorumTally::new(DurabilityRequirement::new(1, 1), 3);

        tally.record_replicated(true);
        assert!(!tally.is_met());

        tally.record_persisted(false);
        assert!(!tally.is_met());

        tally.record_persisted(true);
        assert!(tally.is_met());
    }

    #[test]
    fn exhausted_after_two_signals_per_node() {
        let mut tally = QuorumTally::new(DurabilityRequirement::new(2, 3), 3);
        for _ in 0..3 {
            tally.record_replicated(false);
            assert!(!tally.is_exhausted());
        }
        for _ in 0..2 {
            tally.record_persisted(false);
            assert!(!tally.is_exhausted());
        }
        tally.record_persisted(false);
        assert!(tally.is_exhausted());
    }

    #[test]
    fn negative_signals_never_count() {
        let mut tally = QuorumTally::new(DurabilityRequirement::new(1, 0), 2);
        tally.record_replicated(false);
        tally.record_replicated(false);
        assert!(!tally.is_met());
        assert_eq!(
            tally.timeout_error(),
            DurabilityError::Timeout {
                replicated: 0,
                replicate_to: 1,
                persisted: 0,
                persist_to: 0,
            }
        );
    }
}
