// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A double-buffered replica: reads are served from an immutable active snapshot while writes
//! accumulate in an alternate table, and the two trade roles at each epoch boundary.
//!
//! ## Concurrency
//!
//! Reads never take a lock: they load the currently published [`Shard`] and scan it.
//! Writes and flops are serialized by a single writer lock. A flop publishes the alternate
//! table with one atomic pointer store, so a read that loaded the previous snapshot keeps
//! scanning it undisturbed, and the previous snapshot is freed once its last reader finishes.

use crate::{
    backend::{BackendRegistry, ShardBuilder},
    cuckoo::{CuckooTable, Item},
    drbg::Drbg,
    request::{concat_request_batch, ReadArgs},
    shard::Shard,
    utils::request_vector_len,
    BucketIndex, PirError, TableSeed, DEFAULT_BACKEND, DEFAULT_LOAD_FACTOR_STEP,
    DEFAULT_MAX_LOAD_FACTOR,
};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::{collections::VecDeque, mem, sync::Arc};

/// Parameters of a [`Replica`].
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicaConfig {
    /// The number of buckets in each table.
    pub num_buckets: BucketIndex,
    /// The number of item slots per bucket.
    pub bucket_depth: usize,
    /// The size in bytes of each item's payload.
    pub item_size: usize,
    /// The seed shared by both tables of the replica.
    pub seed: TableSeed,
    /// The fraction of capacity above which the oldest entries are evicted on write.
    pub max_load_factor: f64,
    /// The fraction of capacity evicted when `max_load_factor` is exceeded.
    pub load_factor_step: f64,
    /// The name of the scan engine, looked up in a [`BackendRegistry`].
    pub backend: String,
}

impl ReplicaConfig {
    /// Returns a configuration with the given geometry and default values for everything else.
    pub fn new(num_buckets: BucketIndex, bucket_depth: usize, item_size: usize) -> Self {
        Self {
            num_buckets,
            bucket_depth,
            item_size,
            seed: 0,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            load_factor_step: DEFAULT_LOAD_FACTOR_STEP,
            backend: DEFAULT_BACKEND.to_owned(),
        }
    }

    /// Sets the table seed.
    pub fn with_seed(mut self, seed: TableSeed) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the load-factor eviction threshold and step.
    pub fn with_load_factor(mut self, max_load_factor: f64, load_factor_step: f64) -> Self {
        self.max_load_factor = max_load_factor;
        self.load_factor_step = load_factor_step;
        self
    }

    /// Sets the scan engine.
    pub fn with_backend(mut self, backend: &str) -> Self {
        self.backend = backend.to_owned();
        self
    }

    /// The total number of item slots in each table.
    pub fn capacity(&self) -> usize {
        self.num_buckets.saturating_mul(self.bucket_depth)
    }

    /// The size of each bucket in bytes.
    pub fn bucket_size(&self) -> usize {
        self.bucket_depth.saturating_mul(self.item_size)
    }

    /// The length in bytes of one request vector.
    pub fn req_vector_len(&self) -> usize {
        request_vector_len(self.num_buckets)
    }

    fn eviction_threshold(&self) -> f64 {
        self.capacity() as f64 * self.max_load_factor
    }

    // At least one entry goes, even when the step rounds down to zero.
    fn eviction_count(&self) -> usize {
        ((self.capacity() as f64 * self.load_factor_step).floor() as usize).max(1)
    }

    /// Checks that the configuration describes a usable replica.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` in the following cases.
    ///
    /// - A dimension is 0.
    /// - `max_load_factor` or `load_factor_step` is not in `(0, 1]`.
    pub fn validate(&self) -> Result<(), PirError> {
        if self.num_buckets == 0 || self.bucket_depth == 0 || self.item_size == 0 {
            return Err(PirError::InvalidConfigurationError(
                "replica dimensions must be nonzero",
            ));
        }
        let in_unit_interval = |x: f64| x > 0.0 && x <= 1.0;
        if !in_unit_interval(self.max_load_factor) || !in_unit_interval(self.load_factor_step) {
            return Err(PirError::InvalidConfigurationError(
                "load factors must lie in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// A table together with the insertion order of its entries.
#[derive(Debug)]
struct Snapshot {
    table: CuckooTable,
    // Oldest first. Payloads are not kept.
    history: VecDeque<Item>,
}

impl Snapshot {
    fn new(config: &ReplicaConfig) -> Result<Self, PirError> {
        Ok(Self {
            table: CuckooTable::new(
                config.num_buckets,
                config.bucket_depth,
                config.item_size,
                config.seed,
            )?,
            history: VecDeque::new(),
        })
    }

    /// Evicts the oldest entries if the table is over its load factor, then inserts `item`.
    /// An item the table rejects leaves the snapshot unmodified.
    fn apply(&mut self, item: &Item, config: &ReplicaConfig) -> Result<(), PirError> {
        self.table.check(item)?;
        if self.table.num_elements() as f64 > config.eviction_threshold() {
            self.evict_oldest(config.eviction_count());
        }

        let record = Item::new(item.id, Vec::new(), item.bucket1, item.bucket2);
        match self.table.insert(item.clone()) {
            Ok(()) => {
                self.history.push_back(record);
                Ok(())
            }
            Err(PirError::CapacityError { displaced }) => {
                self.history.push_back(record);
                let position = self.history.iter().position(|entry| {
                    entry.id == displaced.id
                        && entry.bucket1 == displaced.bucket1
                        && entry.bucket2 == displaced.bucket2
                });
                if let Some(position) = position {
                    self.history.remove(position);
                }
                Err(PirError::CapacityError { displaced })
            }
            Err(e) => Err(e),
        }
    }

    fn evict_oldest(&mut self, count: usize) {
        let mut evicted = 0;
        while evicted < count {
            match self.history.pop_front() {
                Some(oldest) => {
                    if self.table.remove(&oldest) {
                        evicted += 1;
                    }
                }
                None => break,
            }
        }
        log::debug!("Replica -- load factor exceeded, evicted {} entries", evicted);
    }
}

#[derive(Debug)]
struct WriterState {
    // The table whose data is currently published for reads.
    active: Box<Snapshot>,
    alternate: Box<Snapshot>,
    pending: Vec<Item>,
}

#[derive(Debug)]
struct Published {
    epoch: u64,
    shard: Arc<dyn Shard>,
}

/// A double-buffered store serving PIR reads from one snapshot while writes go to another.
#[derive(Debug)]
pub struct Replica {
    config: ReplicaConfig,
    builder: Arc<dyn ShardBuilder>,
    writer: Mutex<WriterState>,
    published: ArcSwap<Published>,
}

impl Replica {
    /// Returns an empty replica using the default scan engines.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or names an unknown scan engine.
    pub fn new(config: ReplicaConfig) -> Result<Self, PirError> {
        Self::with_registry(config, &BackendRegistry::with_defaults())
    }

    /// Returns an empty replica, looking up its scan engine in `registry`.
    ///
    /// # Errors
    ///
    /// - `InvalidConfigurationError` if `config` is invalid.
    /// - `UnknownBackendError` if `config.backend` is not in `registry`.
    /// - `StateError` if the engine builds shards that do not match `config`.
    pub fn with_registry(
        config: ReplicaConfig,
        registry: &BackendRegistry,
    ) -> Result<Self, PirError> {
        config.validate()?;
        let builder = registry.get(&config.backend)?;

        log::info!(
            "Replica::new(buckets = {}, depth = {}, item_size = {}, backend = {})",
            config.num_buckets,
            config.bucket_depth,
            config.item_size,
            config.backend
        );

        let active = Box::new(Snapshot::new(&config)?);
        let alternate = Box::new(Snapshot::new(&config)?);
        let shard = build_shard(builder.as_ref(), &config, &active.table)?;

        Ok(Self {
            builder,
            writer: Mutex::new(WriterState {
                active,
                alternate,
                pending: Vec::new(),
            }),
            published: ArcSwap::from_pointee(Published { epoch: 0, shard }),
            config,
        })
    }

    /// The replica's configuration.
    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    /// Writes `item` to the alternate table and records it for replay at the next flop.
    /// The write becomes visible to reads after the next [`flop`](Self::flop).
    ///
    /// # Errors
    ///
    /// - `InvalidConfigurationError` or `BucketOutOfBoundsError` if `item` does not fit the
    ///   table; nothing is written or recorded.
    /// - `CapacityError` if the insert displaced an item, which is returned.
    ///   `item` itself was stored and recorded.
    pub fn write(&self, item: Item) -> Result<(), PirError> {
        let mut state = self.writer.lock();
        let result = state.alternate.apply(&item, &self.config);
        match &result {
            Ok(()) => state.pending.push(item),
            Err(PirError::CapacityError { displaced }) => {
                log::warn!(
                    "Replica::write -- item {} displaced item {}",
                    item.id,
                    displaced.id
                );
                state.pending.push(item);
            }
            Err(_) => {}
        }
        result
    }

    /// Publishes the alternate table for reads and makes the previously active table the new
    /// alternate, bringing it up to date by replaying the writes recorded since the last flop.
    ///
    /// # Errors
    ///
    /// Returns a `StateError` if the scan engine builds a shard that does not match the
    /// configuration, in which case nothing changes.
    pub fn flop(&self) -> Result<(), PirError> {
        let mut state = self.writer.lock();
        let shard = build_shard(self.builder.as_ref(), &self.config, &state.alternate.table)?;

        let WriterState {
            active,
            alternate,
            pending,
        } = &mut *state;
        mem::swap(active, alternate);

        let epoch = self.published.load().epoch + 1;
        self.published.store(Arc::new(Published { epoch, shard }));

        // Only the prefix recorded before the swap is replayed and trimmed.
        let replay_len = pending.len();
        for item in &pending[..replay_len] {
            if let Err(e) = alternate.apply(item, &self.config) {
                log::warn!("Replica::flop -- replay of item {}: {}", item.id, e);
            }
        }
        pending.drain(..replay_len);

        log::info!(
            "Replica::flop -- published epoch {}, replayed {} writes",
            epoch,
            replay_len
        );
        Ok(())
    }

    /// Answers a batch of concatenated request vectors against the active snapshot,
    /// returning one `bucket_size`-byte response per request.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` if `requests` is not a whole number of request vectors.
    pub fn batch_read(&self, requests: &[u8]) -> Result<Vec<u8>, PirError> {
        let published = self.published.load_full();
        log::debug!(
            "Replica::batch_read -- {} bytes against epoch {}",
            requests.len(),
            published.epoch
        );
        published.shard.read(requests, self.config.req_vector_len())
    }

    /// Answers each read against the active snapshot, masking each response with the pad
    /// derived from that read's seed.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` if a request vector addresses a different number of buckets.
    pub fn batch_read_padded(&self, args: &[ReadArgs]) -> Result<Vec<Vec<u8>>, PirError> {
        let vectors = args
            .iter()
            .map(|arg| {
                if arg.request_vector.num_buckets() == self.config.num_buckets {
                    Ok(&arg.request_vector)
                } else {
                    Err(PirError::InvalidConfigurationError(
                        "request vector does not match the replica's number of buckets",
                    ))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let responses = self.batch_read(&concat_request_batch(&vectors)?)?;

        Ok(responses
            .chunks_exact(self.config.bucket_size())
            .zip(args)
            .map(|(response, arg)| {
                let mut response = response.to_vec();
                Drbg::new(&arg.pad_seed).apply_pad(&mut response);
                response
            })
            .collect())
    }

    /// Returns the active snapshot. It stays readable, and unchanged, after later flops.
    pub fn snapshot(&self) -> Arc<dyn Shard> {
        self.published.load().shard.clone()
    }

    /// The number of flops performed so far.
    pub fn epoch(&self) -> u64 {
        self.published.load().epoch
    }

    /// The number of writes recorded since the last flop.
    pub fn pending_writes(&self) -> usize {
        self.writer.lock().pending.len()
    }

    /// The number of items in the alternate table. Linear in the table's capacity.
    pub fn num_items(&self) -> usize {
        self.writer.lock().alternate.table.num_elements()
    }
}

fn build_shard(
    builder: &dyn ShardBuilder,
    config: &ReplicaConfig,
    table: &CuckooTable,
) -> Result<Arc<dyn Shard>, PirError> {
    let shard = builder.build(
        table.num_buckets(),
        table.bucket_size(),
        table.data().to_vec(),
    )?;
    if shard.num_buckets() != config.num_buckets || shard.bucket_size() != config.bucket_size() {
        return Err(PirError::StateError(
            "scan engine built a shard with the wrong geometry",
        ));
    }
    Ok(shard)
}
