//! Configuration management for Garnet
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (GARNET_* prefix, highest precedence)
//! 2. garnet.local.toml (gitignored, local overrides)
//! 3. garnet.toml (git-tracked, project config)
//! 4. ~/.config/garnet/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use garnet_types::DurabilityRequirement;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Most replicas a bucket can be configured with.
pub const MAX_REPLICAS: u32 = 3;

/// Main Garnet configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GarnetConfig {
    pub durability: DurabilityConfig,
    pub logging: LoggingConfig,
    pub simulation: SimulationConfig,
}

/// Timing and default thresholds for durability confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurabilityConfig {
    /// How long each node is polled before it is given up on.
    pub timeout_ms: u64,
    /// Delay between two observations of the same node.
    pub poll_interval_ms: u64,
    /// Replicas that must hold a mutation when the caller does not say.
    pub replicate_to: u32,
    /// Nodes that must have flushed a mutation when the caller does not say.
    pub persist_to: u32,
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 40_000,
            poll_interval_ms: 100,
            replicate_to: 0,
            persist_to: 0,
        }
    }
}

impl DurabilityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn requirement(&self) -> DurabilityRequirement {
        DurabilityRequirement::new(self.replicate_to, self.persist_to)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `garnet_durability=debug`.
    pub filter: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            ansi: true,
        }
    }
}

/// Shape of the in-memory cluster used by the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub replicas: u32,
    /// Delay before a replica applies a mutation.
    pub replication_delay_ms: u64,
    /// Delay before any node flushes a mutation.
    pub persistence_delay_ms: u64,
    /// Round-trip time of one observation.
    pub observe_latency_ms: u64,
    /// Hand out mutation tokens; when false, mutations return the zero token.
    pub mutation_tokens: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            replicas: 2,
            replication_delay_ms: 5,
            persistence_delay_ms: 25,
            observe_latency_ms: 1,
            mutation_tokens: true,
        }
    }
}

impl GarnetConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Load a single TOML file, bypassing the layered sources.
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create a development configuration: short timeouts, fast polling
    pub fn development() -> Self {
        Self {
            durability: DurabilityConfig {
                timeout_ms: 5_000,
                poll_interval_ms: 10,
                ..Default::default()
            },
            logging: LoggingConfig {
                filter: "debug".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create a production configuration: one replica and one disk by default
    pub fn production() -> Self {
        Self {
            durability: DurabilityConfig {
                replicate_to: 1,
                persist_to: 1,
                ..Default::default()
            },
            logging: LoggingConfig {
                ansi: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Rejects settings the durability checker cannot run with.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let durability = &self.durability;
        if durability.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "durability.poll_interval_ms must be positive".to_string(),
            ));
        }
        if durability.poll_interval_ms > durability.timeout_ms {
            return Err(ConfigError::ValidationError(format!(
                "durability.poll_interval_ms ({}) exceeds durability.timeout_ms ({})",
                durability.poll_interval_ms, durability.timeout_ms
            )));
        }
        if durability.replicate_to > MAX_REPLICAS || durability.persist_to > MAX_REPLICAS + 1 {
            return Err(ConfigError::ValidationError(format!(
                "default requirement ({}) exceeds what any bucket supports",
                durability.requirement()
            )));
        }
        if self.simulation.replicas > MAX_REPLICAS {
            return Err(ConfigError::ValidationError(format!(
                "simulation.replicas ({}) exceeds the maximum of {MAX_REPLICAS}",
                self.simulation.replicas
            )));
        }
        Ok(())
    }
}
