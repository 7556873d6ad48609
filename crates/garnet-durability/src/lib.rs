//! # garnet-durability: Replication and persistence confirmation
//!
//! After the coordinating node acknowledges a mutation, a caller may demand
//! proof that it also reached some number of replicas and was flushed to
//! disk on some number of nodes. This crate produces that proof by polling
//! every node's view of the key until the requirement holds or the nodes
//! run out of time. It is a convergence poll, not a commit protocol: the
//! mutation is never retried or rolled back here.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────────┐
//!   confirm() ─────▶ │  DurabilityChecker   │ ◀── two verdict channels ──┐
//!                    └──────────┬───────────┘                            │
//!                               │ spawns one per node                    │
//!             ┌─────────────────┼─────────────────┐                      │
//!       ┌─────▼─────┐     ┌─────▼─────┐     ┌─────▼─────┐                │
//!       │ poller 0  │     │ poller 1  │     │ poller N  │ ───────────────┘
//!       │ (master)  │     │ (replica) │     │ (replica) │
//!       └─────┬─────┘     └─────┬─────┘     └─────┬─────┘
//!             │   ObservationStrategy::observe    │
//!             └──────────▶ NodeObserver ◀─────────┘
//! ```
//!
//! - [`NodeObserver`] is implemented by the transport and answers with a
//!   cancellable [`PendingOp`].
//! - [`ObservationStrategy`] turns each answer into a [`Verdict`], by
//!   sequence number when the mutation produced a valid token and by CAS
//!   otherwise.
//! - [`PollSchedule`] bounds each node's loop and spaces its rounds.
//!
//! [`Verdict`]: garnet_types::Verdict

mod error;
mod observer;
mod pending;
mod poller;
mod quorum;
mod schedule;
mod strategy;

pub use error::{DurabilityError, ObserveError, Result};
pub use observer::NodeObserver;
pub use pending::PendingOp;
pub use quorum::DurabilityChecker;
pub use schedule::{Deadline, PollSchedule};
pub use strategy::{ObservationStrategy, translate_key_state, translate_seqno};
