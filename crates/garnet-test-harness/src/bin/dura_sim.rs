//! Runs one durable mutation against a simulated cluster.
//!
//! ```bash
//! # Two replicas, wait for one replica and two disks
//! garnet-dura-sim --replicate-to 1 --persist-to 2 upsert user:42 '{"name":"ada"}'
//!
//! # Same, but confirm by CAS instead of sequence number
//! garnet-dura-sim --legacy --persist-to 1 --seed 0 counter hits 1
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use garnet::{Bucket, Cas, GarnetError, KvClient};
use garnet_config::{ConfigLoader, GarnetConfig, LoggingConfig};
use garnet_test_harness::SimCluster;
use tokio::time::Instant;
use tracing::{error, info};

/// Garnet durability simulator.
#[derive(Parser)]
#[command(name = "garnet-dura-sim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file. Without it the layered sources are used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replicas that must hold the mutation.
    #[arg(long)]
    replicate_to: Option<u32>,

    /// Nodes that must have flushed the mutation.
    #[arg(long)]
    persist_to: Option<u32>,

    /// Replicas in the simulated cluster.
    #[arg(long)]
    replicas: Option<u32>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Return no mutation tokens, forcing CAS-based confirmation.
    #[arg(long)]
    legacy: bool,

    /// Store this value under the key before running the operation.
    #[arg(long)]
    seed: Option<String>,

    #[command(subcommand)]
    op: Op,
}

#[derive(Subcommand)]
enum Op {
    Upsert { key: String, value: String },
    Insert { key: String, value: String },
    Replace { key: String, value: String },
    Append { key: String, value: String },
    Prepend { key: String, value: String },
    Touch { key: String },
    Remove { key: String },
    Counter {
        key: String,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
        /// Value to create the counter with if it is missing.
        #[arg(long)]
        initial: Option<u64>,
    },
}

impl Op {
    fn key(&self) -> &str {
        match self {
            Op::Upsert { key, .. }
            | Op::Insert { key, .. }
            | Op::Replace { key, .. }
            | Op::Append { key, .. }
            | Op::Prepend { key, .. }
            | Op::Touch { key }
            | Op::Remove { key }
            | Op::Counter { key, .. } => key,
        }
    }
}

impl Cli {
    fn load_config(&self) -> Result<GarnetConfig> {
        let mut config = match &self.config {
            Some(path) => GarnetConfig::from_file(path)?,
            None => ConfigLoader::new().load()?,
        };

        let durability = &mut config.durability;
        if let Some(replicate_to) = self.replicate_to {
            durability.replicate_to = replicate_to;
        }
        if let Some(persist_to) = self.persist_to {
            durability.persist_to = persist_to;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            durability.timeout_ms = timeout_ms;
        }
        if let Some(poll_interval_ms) = self.poll_interval_ms {
            durability.poll_interval_ms = poll_interval_ms;
        }
        if let Some(replicas) = self.replicas {
            config.simulation.replicas = replicas;
        }
        if self.legacy {
            config.simulation.mutation_tokens = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured filter
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(logging.ansi)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_logging(&config.logging);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli.op, cli.seed, &config))
}

async fn run(op: Op, seed: Option<String>, config: &GarnetConfig) -> Result<()> {
    let cluster = Arc::new(SimCluster::from_config(&config.simulation));
    let bucket = Bucket::from_config(Arc::clone(&cluster), &config.durability)?;
    let requirement = config.durability.requirement();

    if let Some(seed) = seed {
        cluster.upsert(op.key(), Bytes::from(seed), 0).await?;
    }

    info!(
        key = op.key(),
        %requirement,
        replicas = config.simulation.replicas,
        tokens = config.simulation.mutation_tokens,
        "running durable mutation"
    );
    let started = Instant::now();

    let outcome: Result<(Cas, Option<u64>), GarnetError> = match &op {
        Op::Upsert { key, value } => bucket
            .upsert_dura(key, value.clone(), 0, requirement)
            .await
            .map(|cas| (cas, None)),
        Op::Insert { key, value } => bucket
            .insert_dura(key, value.clone(), 0, requirement)
            .await
            .map(|cas| (cas, None)),
        Op::Replace { key, value } => bucket
            .replace_dura(key, value.clone(), Cas::ZERO, 0, requirement)
            .await
            .map(|cas| (cas, None)),
        Op::Append { key, value } => bucket
            .append_dura(key, value.clone(), requirement)
            .await
            .map(|cas| (cas, None)),
        Op::Prepend { key, value } => bucket
            .prepend_dura(key, value.clone(), requirement)
            .await
            .map(|cas| (cas, None)),
        Op::Touch { key } => bucket
            .touch_dura(key, Cas::ZERO, 0, requirement)
            .await
            .map(|cas| (cas, None)),
        Op::Remove { key } => bucket
            .remove_dura(key, Cas::ZERO, requirement)
            .await
            .map(|cas| (cas, None)),
        Op::Counter {
            key,
            delta,
            initial,
        } => bucket
            .counter_dura(key, *delta, *initial, 0, requirement)
            .await
            .map(|(value, cas)| (cas, Some(value))),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok((cas, counter)) => {
            info!(%cas, ?counter, elapsed_ms, observations = cluster.observe_calls(), "durable");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, elapsed_ms, observations = cluster.observe_calls(), "not durable");
            Err(err.into())
        }
    }
}
