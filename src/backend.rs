// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Selection of scan engine implementations by name.

use crate::{
    shard::{ByteShard, Shard, WordShard},
    BucketIndex, PirError, DEFAULT_BACKEND,
};
use duplicate::duplicate_item;
use std::{collections::BTreeMap, sync::Arc};

/// Constructs shards of one scan engine implementation.
pub trait ShardBuilder: std::fmt::Debug + Send + Sync {
    /// Builds an immutable shard over `data`, laid out as `num_buckets` buckets of `bucket_size` bytes.
    fn build(
        &self,
        num_buckets: BucketIndex,
        bucket_size: usize,
        data: Vec<u8>,
    ) -> Result<Arc<dyn Shard>, PirError>;
}

/// Builds [`ByteShard`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteShardBuilder;

/// Builds [`WordShard`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordShardBuilder;

#[duplicate_item(
    builder_type    shard_type;
    [ByteShardBuilder] [ByteShard];
    [WordShardBuilder] [WordShard];
)]
impl ShardBuilder for builder_type {
    fn build(
        &self,
        num_buckets: BucketIndex,
        bucket_size: usize,
        data: Vec<u8>,
    ) -> Result<Arc<dyn Shard>, PirError> {
        Ok(Arc::new(shard_type::new(num_buckets, bucket_size, data)?))
    }
}

/// A set of named scan engines.
///
/// A registry is passed to whatever constructs a [`Replica`](crate::Replica), so callers can
/// add accelerated engines or substitute a reference engine under any name.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    builders: BTreeMap<String, Arc<dyn ShardBuilder>>,
}

impl BackendRegistry {
    /// Returns a registry with no engines.
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// Returns a registry with the CPU engines: `"cpu"` ([`ByteShard`]) and `"cpu64"` ([`WordShard`]).
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_BACKEND, Arc::new(ByteShardBuilder));
        registry.register("cpu64", Arc::new(WordShardBuilder));
        registry
    }

    /// Registers `builder` under `name`, returning the builder it replaced, if any.
    pub fn register(
        &mut self,
        name: &str,
        builder: Arc<dyn ShardBuilder>,
    ) -> Option<Arc<dyn ShardBuilder>> {
        log::debug!("BackendRegistry::register({})", name);
        self.builders.insert(name.to_owned(), builder)
    }

    /// Looks up the engine registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns an `UnknownBackendError` if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ShardBuilder>, PirError> {
        self.builders
            .get(name)
            .cloned()
            .ok_or_else(|| PirError::UnknownBackendError(name.to_owned()))
    }

    /// The registered engine names, in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
