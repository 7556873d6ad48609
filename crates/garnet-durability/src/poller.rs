//! Per-node observation loop.
//!
//! Each node of the cluster gets its own [`NodePoller`], running as an
//! independent task. A poller observes its node until it has proven both
//! replication and persistence, its deadline elapses, or the orchestrator
//! stops listening. Over its lifetime it sends exactly one signal on each of
//! the two verdict channels, unless the orchestrator has already gone away.

use std::sync::Arc;

use bytes::Bytes;
use garnet_types::{NodeIndex, Verdict};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, debug_span, warn};

use crate::{NodeObserver, ObservationStrategy, ObserveError, PollSchedule};

/// The orchestrator dropped its receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Disconnected;

/// A poller's half of the two verdict channels, with at-most-once delivery
/// per flag.
#[derive(Debug)]
pub(crate) struct VerdictSink {
    replicated: mpsc::Sender<bool>,
    persisted: mpsc::Sender<bool>,
    sent_replicated: bool,
    sent_persisted: bool,
}

impl VerdictSink {
    pub(crate) fn new(replicated: mpsc::Sender<bool>, persisted: mpsc::Sender<bool>) -> Self {
        Self {
            replicated,
            persisted,
            sent_replicated: false,
            sent_persisted: false,
        }
    }

    /// Both flags have been delivered.
    pub(crate) fn is_complete(&self) -> bool {
        self.sent_replicated && self.sent_persisted
    }

    /// Sends `true` for every flag the verdict proves and that has not been
    /// sent yet. Flags the verdict does not prove stay open.
    pub(crate) async fn offer(&mut self, verdict: Verdict) -> Result<(), Disconnected> {
        if verdict.replicated && !self.sent_replicated {
            self.sent_replicated = true;
            self.replicated.send(true).await.map_err(|_| Disconnected)?;
        }
        if verdict.persisted && !self.sent_persisted {
            self.sent_persisted = true;
            self.persisted.send(true).await.map_err(|_| Disconnected)?;
        }
        Ok(())
    }

    /// Sends `false` for every flag still open.
    pub(crate) async fn fail_remaining(&mut self) -> Result<(), Disconnected> {
        if !self.sent_replicated {
            self.sent_replicated = true;
            self.replicated.send(false).await.map_err(|_| Disconnected)?;
        }
        if !self.sent_persisted {
            self.sent_persisted = true;
            self.persisted.send(false).await.map_err(|_| Disconnected)?;
        }
        Ok(())
    }

    /// Resolves once the orchestrator has stopped receiving.
    pub(crate) async fn closed(&self) {
        self.replicated.closed().await;
    }
}

/// How a poller's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    /// Both flags proven.
    Resolved,
    /// Deadline elapsed with at least one flag unproven.
    TimedOut,
    /// The observation could not even be sent.
    DispatchFailed,
    /// The orchestrator stopped listening first.
    Abandoned,
}

enum Wake<T> {
    Ready(T),
    DeadlineElapsed,
    Abandoned,
}

/// Observation loop for a single node.
pub(crate) struct NodePoller<O: ?Sized> {
    observer: Arc<O>,
    key: Bytes,
    strategy: ObservationStrategy,
    node: NodeIndex,
    schedule: PollSchedule,
    sink: VerdictSink,
}

impl<O: NodeObserver + ?Sized> NodePoller<O> {
    pub(crate) fn new(
        observer: Arc<O>,
        key: Bytes,
        strategy: ObservationStrategy,
        node: NodeIndex,
        schedule: PollSchedule,
        sink: VerdictSink,
    ) -> Self {
        Self {
            observer,
            key,
            strategy,
            node,
            schedule,
            sink,
        }
    }

    /// Detaches the loop onto the runtime. Nobody joins it; it ends on its
    /// own deadline at the latest.
    pub(crate) fn spawn(self) {
        let span = debug_span!("durability_poll", node = %self.node);
        tokio::spawn(self.run().instrument(span));
    }

    pub(crate) async fn run(mut self) -> PollOutcome {
        let mut deadline = self.schedule.deadline();
        let mut round: u32 = 0;

        loop {
            round += 1;
            let mut pending = match self.strategy.observe(&*self.observer, &self.key, self.node) {
                Ok(pending) => pending,
                Err(error) => {
                    warn!(%error, round, "observation dispatch failed");
                    return match self.sink.fail_remaining().await {
                        Ok(()) => PollOutcome::DispatchFailed,
                        Err(Disconnected) => PollOutcome::Abandoned,
                    };
                }
            };

            let wake = tokio::select! {
                result = &mut pending => Wake::Ready(result),
                () = &mut deadline => Wake::DeadlineElapsed,
                () = self.sink.closed() => Wake::Abandoned,
            };

            let verdict = match wake {
                Wake::Ready(result) => self.translate(round, result),
                Wake::DeadlineElapsed => {
                    pending.cancel();
                    return self.time_out(round).await;
                }
                Wake::Abandoned => {
                    pending.cancel();
                    debug!(round, "orchestrator finished, abandoning in-flight observation");
                    return PollOutcome::Abandoned;
                }
            };

            if self.sink.offer(verdict).await.is_err() {
                return PollOutcome::Abandoned;
            }
            if self.sink.is_complete() {
                debug!(round, "node confirmed");
                return PollOutcome::Resolved;
            }

            let wake = tokio::select! {
                () = self.schedule.pause() => Wake::Ready(()),
                () = &mut deadline => Wake::DeadlineElapsed,
                () = self.sink.closed() => Wake::Abandoned,
            };

            match wake {
                Wake::Ready(()) => {}
                Wake::DeadlineElapsed => return self.time_out(round).await,
                Wake::Abandoned => return PollOutcome::Abandoned,
            }
        }
    }

    fn translate(&self, round: u32, result: Result<Verdict, ObserveError>) -> Verdict {
        match result {
            Ok(verdict) => {
                debug!(
                    round,
                    replicated = verdict.replicated,
                    persisted = verdict.persisted,
                    "observed"
                );
                verdict
            }
            Err(error) => {
                debug!(%error, round, "observation failed, no progress this round");
                Verdict::NONE
            }
        }
    }

    async fn time_out(&mut self, round: u32) -> PollOutcome {
        debug!(round, "node deadline elapsed");
        match self.sink.fail_remaining().await {
            Ok(()) => PollOutcome::TimedOut,
            Err(Disconnected) => PollOutcome::Abandoned,
        }
    }
}
