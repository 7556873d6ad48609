//! Per-node timing and fault settings for a simulated cluster.

use std::time::Duration;

/// How a node misbehaves when observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFault {
    /// Observation requests cannot be dispatched at all.
    Unreachable,
    /// Requests are sent but every answer is lost in transit.
    DropResponses,
    /// Requests are sent and never answered.
    Unresponsive,
}

/// When a node reaches a stage (holding a mutation, or having flushed it).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delay {
    /// Whatever the cluster is configured with.
    #[default]
    ClusterDefault,
    After(Duration),
    Never,
}

/// Overrides for one node. Unset fields fall back to the cluster defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeBehavior {
    pub(crate) replication: Delay,
    pub(crate) persistence: Delay,
    pub(crate) fault: Option<NodeFault>,
}

impl NodeBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies mutations `replication` and flushes them `persistence` after
    /// they happen.
    pub fn lagging(replication: Duration, persistence: Duration) -> Self {
        Self::new()
            .with_replication_delay(replication)
            .with_persistence_delay(persistence)
    }

    pub fn never_replicates() -> Self {
        Self {
            replication: Delay::Never,
            ..Self::default()
        }
    }

    pub fn never_persists() -> Self {
        Self {
            persistence: Delay::Never,
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self::new().with_fault(NodeFault::Unreachable)
    }

    pub fn dropping_responses() -> Self {
        Self::new().with_fault(NodeFault::DropResponses)
    }

    pub fn unresponsive() -> Self {
        Self::new().with_fault(NodeFault::Unresponsive)
    }

    pub fn with_replication_delay(mut self, delay: Duration) -> Self {
        self.replication = Delay::After(delay);
        self
    }

    pub fn with_persistence_delay(mut self, delay: Duration) -> Self {
        self.persistence = Delay::After(delay);
        self
    }

    pub fn with_fault(mut self, fault: NodeFault) -> Self {
        self.fault = Some(fault);
        self
    }
}

/// Timing a node actually runs with after defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeTiming {
    pub(crate) replication: Option<Duration>,
    pub(crate) persistence: Option<Duration>,
    pub(crate) fault: Option<NodeFault>,
}

impl NodeTiming {
    pub(crate) fn resolve(
        behavior: NodeBehavior,
        replication: Duration,
        persistence: Duration,
        is_master: bool,
    ) -> Self {
        // The master applies every mutation as it acknowledges it.
        let replication = if is_master {
            Some(Duration::ZERO)
        } else {
            behavior.replication.resolve(replication)
        };
        Self {
            replication,
            persistence: behavior.persistence.resolve(persistence),
            fault: behavior.fault,
        }
    }
}

impl Delay {
    fn resolve(self, default: Duration) -> Option<Duration> {
        match self {
            Delay::ClusterDefault => Some(default),
            Delay::After(delay) => Some(delay),
            Delay::Never => None,
        }
    }
}
