//! The mutation primitives a bucket builds its durable variants on.

use std::future::Future;

use bytes::Bytes;
use garnet_durability::NodeObserver;
use garnet_types::{Cas, MutationToken};

use crate::MutationError;

/// What a successful mutation leaves behind: its CAS and, when the cluster
/// hands them out, the token locating it in the partition history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation {
    pub cas: Cas,
    pub token: MutationToken,
}

impl Mutation {
    pub fn new(cas: Cas, token: MutationToken) -> Self {
        Self { cas, token }
    }
}

/// A counter mutation additionally returns the counter's new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterMutation {
    pub value: u64,
    pub mutation: Mutation,
}

/// A connection to a cluster able to mutate keys and observe nodes.
///
/// A `cas` argument of [`Cas::ZERO`] means "any version". Expiry is in
/// seconds, zero meaning the document never expires.
pub trait KvClient: NodeObserver {
    fn touch(
        &self,
        key: &str,
        cas: Cas,
        expiry: u32,
    ) -> impl Future<Output = Result<Mutation, MutationError>> + Send;

    fn remove(
        &self,
        key: &str,
        cas: Cas,
    ) -> impl Future<Output = Result<Mutation, MutationError>> + Send;

    fn upsert(
        &self,
        key: &str,
        value: Bytes,
        expiry: u32,
    ) -> impl Future<Output = Result<Mutation, MutationError>> + Send;

    /// Fails with [`MutationError::KeyExists`] if the key is present.
    fn insert(
        &self,
        key: &str,
        value: Bytes,
        expiry: u32,
    ) -> impl Future<Output = Result<Mutation, MutationError>> + Send;

    /// Fails with [`MutationError::KeyNotFound`] if the key is absent.
    fn replace(
        &self,
        key: &str,
        value: Bytes,
        cas: Cas,
        expiry: u32,
    ) -> impl Future<Output = Result<Mutation, MutationError>> + Send;

    fn append(
        &self,
        key: &str,
        value: Bytes,
    ) -> impl Future<Output = Result<Mutation, MutationError>> + Send;

    fn prepend(
        &self,
        key: &str,
        value: Bytes,
    ) -> impl Future<Output = Result<Mutation, MutationError>> + Send;

    /// Adds `delta` to a decimal counter. A missing key is created holding
    /// `initial`, or fails if `initial` is `None`.
    fn counter(
        &self,
        key: &str,
        delta: i64,
        initial: Option<u64>,
        expiry: u32,
    ) -> impl Future<Output = Result<CounterMutation, MutationError>> + Send;
}
