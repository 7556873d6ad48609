//! # garnet-test-harness: Simulated cluster for durability tests
//!
//! [`SimCluster`] is an in-memory stand-in for a real cluster. It applies
//! mutations on a single store and derives what each node can see from
//! per-node replication and persistence delays, so tests can script
//! replicas that lag, never flush, drop answers or stop answering.
//!
//! ```ignore
//! let cluster = Arc::new(
//!     SimCluster::builder()
//!         .with_replicas(2)
//!         .with_node(2, NodeBehavior::never_persists())
//!         .build(),
//! );
//! let bucket = Bucket::new(Arc::clone(&cluster));
//! bucket.upsert_dura("k", "v", 0, DurabilityRequirement::new(2, 2)).await?;
//! ```
//!
//! The `garnet-dura-sim` binary drives one durable mutation against a
//! cluster built from [`garnet_config::SimulationConfig`].

mod behavior;
mod cluster;

pub use behavior::{Delay, NodeBehavior, NodeFault};
pub use cluster::{NUM_PARTITIONS, SimCluster, SimClusterBuilder};
