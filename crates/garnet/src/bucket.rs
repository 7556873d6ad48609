//! Durable variants of the mutation primitives.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use garnet_config::DurabilityConfig;
use garnet_durability::{DurabilityChecker, PollSchedule};
use garnet_types::{Cas, DurabilityRequirement};
use tracing::{debug, warn};

use crate::{GarnetError, KvClient, Mutation, Result};

/// A bucket handle pairing a client with a durability checker.
///
/// Every `*_dura` method runs the plain mutation first. If the mutation
/// fails its error is returned as is and no node is polled. Otherwise the
/// call waits until `requirement` is confirmed and returns the new CAS.
/// A confirmation failure does not undo the mutation; the error carries the
/// CAS it was applied with.
#[derive(Debug)]
pub struct Bucket<C> {
    client: Arc<C>,
    checker: DurabilityChecker<C>,
}

impl<C> Clone for Bucket<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            checker: self.checker.clone(),
        }
    }
}

impl<C: KvClient> Bucket<C> {
    /// Creates a bucket with the default 40s timeout and 100ms interval.
    pub fn new(client: Arc<C>) -> Self {
        Self::with_schedule(client, PollSchedule::default())
    }

    pub fn with_schedule(client: Arc<C>, schedule: PollSchedule) -> Self {
        let checker = DurabilityChecker::new(Arc::clone(&client), schedule);
        Self { client, checker }
    }

    pub fn from_config(client: Arc<C>, config: &DurabilityConfig) -> Result<Self> {
        if config.poll_interval_ms == 0 {
            return Err(GarnetError::InvalidConfig(
                "poll interval must be positive".to_string(),
            ));
        }
        let schedule = PollSchedule::new(config.timeout(), config.poll_interval());
        Ok(Self::with_schedule(client, schedule))
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn durability_timeout(&self) -> Duration {
        self.checker.schedule().timeout()
    }

    pub fn durability_poll_interval(&self) -> Duration {
        self.checker.schedule().poll_interval()
    }

    // ========================================================================
    // Durable mutations
    // ========================================================================

    pub async fn touch_dura(
        &self,
        key: &str,
        cas: Cas,
        expiry: u32,
        requirement: DurabilityRequirement,
    ) -> Result<Cas> {
        let mutation = self.client.touch(key, cas, expiry).await?;
        self.confirm(key, mutation, requirement, false).await
    }

    /// Confirms the deletion using the delete rows of the CAS rule when the
    /// cluster returns no token.
    pub async fn remove_dura(
        &self,
        key: &str,
        cas: Cas,
        requirement: DurabilityRequirement,
    ) -> Result<Cas> {
        let mutation = self.client.remove(key, cas).await?;
        self.confirm(key, mutation, requirement, true).await
    }

    pub async fn upsert_dura(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        expiry: u32,
        requirement: DurabilityRequirement,
    ) -> Result<Cas> {
        let mutation = self.client.upsert(key, value.into(), expiry).await?;
        self.confirm(key, mutation, requirement, false).await
    }

    pub async fn insert_dura(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        expiry: u32,
        requirement: DurabilityRequirement,
    ) -> Result<Cas> {
        let mutation = self.client.insert(key, value.into(), expiry).await?;
        self.confirm(key, mutation, requirement, false).await
    }

    pub async fn replace_dura(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        cas: Cas,
        expiry: u32,
        requirement: DurabilityRequirement,
    ) -> Result<Cas> {
        let mutation = self.client.replace(key, value.into(), cas, expiry).await?;
        self.confirm(key, mutation, requirement, false).await
    }

    pub async fn append_dura(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        requirement: DurabilityRequirement,
    ) -> Result<Cas> {
        let mutation = self.client.append(key, value.into()).await?;
        self.confirm(key, mutation, requirement, false).await
    }

    pub async fn prepend_dura(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        requirement: DurabilityRequirement,
    ) -> Result<Cas> {
        let mutation = self.client.prepend(key, value.into()).await?;
        self.confirm(key, mutation, requirement, false).await
    }

    /// Returns the counter's new value alongside the CAS.
    pub async fn counter_dura(
        &self,
        key: &str,
        delta: i64,
        initial: Option<u64>,
        expiry: u32,
        requirement: DurabilityRequirement,
    ) -> Result<(u64, Cas)> {
        let counter = self.client.counter(key, delta, initial, expiry).await?;
        match self.confirm(key, counter.mutation, requirement, false).await {
            Ok(cas) => Ok((counter.value, cas)),
            Err(GarnetError::Durability { cas, source, .. }) => Err(GarnetError::Durability {
                cas,
                counter: Some(counter.value),
                source,
            }),
            Err(other) => Err(other),
        }
    }

    async fn confirm(
        &self,
        key: &str,
        mutation: Mutation,
        requirement: DurabilityRequirement,
        for_delete: bool,
    ) -> Result<Cas> {
        debug!(key, cas = %mutation.cas, %requirement, "mutation applied");
        self.checker
            .confirm(
                key.as_bytes(),
                mutation.cas,
                mutation.token,
                requirement,
                for_delete,
            )
            .await
            .map_err(|source| {
                warn!(key, cas = %mutation.cas, %source, "durability not confirmed");
                GarnetError::Durability {
                    cas: mutation.cas,
                    counter: None,
                    source,
                }
            })?;
        Ok(mutation.cas)
    }
}
