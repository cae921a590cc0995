// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A fixed-capacity, bucketed cuckoo hash table with two-choice placement and bounded eviction.

use crate::{BucketIndex, ItemId, PirError, TableSeed, MAX_EVICTIONS};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[derive(Clone, Debug, PartialEq, Eq)]
/// A placement record: an item's payload together with its two candidate buckets.
pub struct Item {
    /// The item's identifier.
    pub id: ItemId,
    /// The item's payload. Must be exactly `item_size` bytes to be stored.
    pub data: Vec<u8>,
    /// The first candidate bucket.
    pub bucket1: BucketIndex,
    /// The second candidate bucket.
    pub bucket2: BucketIndex,
}

impl Item {
    /// Creates an item with payload `data` that may live in `bucket1` or `bucket2`.
    pub fn new(id: ItemId, data: Vec<u8>, bucket1: BucketIndex, bucket2: BucketIndex) -> Self {
        Self {
            id,
            data,
            bucket1,
            bucket2,
        }
    }

    /// Given one of this item's buckets, returns the other one.
    pub fn other_bucket(&self, bucket: BucketIndex) -> BucketIndex {
        if bucket == self.bucket1 {
            self.bucket2
        } else {
            self.bucket1
        }
    }

    fn matches(&self, slot: &SlotMetadata) -> bool {
        slot.filled
            && slot.id == self.id
            && slot.bucket1 == self.bucket1
            && slot.bucket2 == self.bucket2
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct SlotMetadata {
    id: ItemId,
    bucket1: BucketIndex,
    bucket2: BucketIndex,
    filled: bool,
}

/// A `num_buckets x bucket_depth` grid of `item_size`-byte slots.
///
/// Slot payloads live in one flat, bucket-major byte buffer so that the table can be
/// published directly as a [`Shard`](crate::Shard): bucket `b` occupies
/// `data[b * bucket_size..(b + 1) * bucket_size]`.
///
/// All randomness (coin flips and eviction victims) comes from a generator seeded at
/// construction. Two tables created with the same parameters and seed that see the same
/// sequence of inserts and removes hold byte-identical data.
#[derive(Debug, Clone)]
pub struct CuckooTable {
    num_buckets: BucketIndex,
    bucket_depth: usize,
    item_size: usize,
    data: Vec<u8>,
    slots: Vec<SlotMetadata>,
    rng: StdRng,
}

impl CuckooTable {
    /// Returns an empty table.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` if any dimension is zero or the total size overflows.
    pub fn new(
        num_buckets: BucketIndex,
        bucket_depth: usize,
        item_size: usize,
        seed: TableSeed,
    ) -> Result<Self, PirError> {
        if num_buckets == 0 || bucket_depth == 0 || item_size == 0 {
            return Err(PirError::InvalidConfigurationError(
                "table dimensions must be nonzero",
            ));
        }

        let capacity = num_buckets
            .checked_mul(bucket_depth)
            .ok_or(PirError::InvalidConfigurationError("table capacity overflows"))?;
        let data_len = capacity
            .checked_mul(item_size)
            .ok_or(PirError::InvalidConfigurationError("table size overflows"))?;

        log::info!(
            "CuckooTable::new(buckets = {}, depth = {}, item_size = {})",
            num_buckets,
            bucket_depth,
            item_size
        );

        Ok(Self {
            num_buckets,
            bucket_depth,
            item_size,
            data: vec![0u8; data_len],
            slots: vec![SlotMetadata::default(); capacity],
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// The number of buckets.
    pub fn num_buckets(&self) -> BucketIndex {
        self.num_buckets
    }

    /// The number of slots per bucket.
    pub fn bucket_depth(&self) -> usize {
        self.bucket_depth
    }

    /// The size of each item's payload in bytes.
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// The size of each bucket in bytes.
    pub fn bucket_size(&self) -> usize {
        self.bucket_depth * self.item_size
    }

    /// The total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The flat, bucket-major slot buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the bytes of bucket `bucket`.
    pub fn bucket(&self, bucket: BucketIndex) -> Result<&[u8], PirError> {
        self.check_bucket(bucket)?;
        let bucket_size = self.bucket_size();
        Ok(&self.data[bucket * bucket_size..(bucket + 1) * bucket_size])
    }

    /// Counts occupied slots. Linear in the table's capacity.
    pub fn num_elements(&self) -> usize {
        self.slots.iter().filter(|slot| slot.filled).count()
    }

    /// The fraction of slots that are occupied.
    pub fn load_factor(&self) -> f64 {
        self.num_elements() as f64 / self.capacity() as f64
    }

    /// Returns true iff one of `item`'s two buckets holds a slot with `item`'s id and buckets.
    /// The payload is not compared.
    pub fn contains(&self, item: &Item) -> bool {
        if self.check_item_buckets(item).is_err() {
            return false;
        }
        self.find_in_bucket(item.bucket1, item).is_some()
            || self.find_in_bucket(item.bucket2, item).is_some()
    }

    /// Checks that `item` fits this table without modifying it.
    ///
    /// # Errors
    ///
    /// - `InvalidConfigurationError` if the payload length is not `item_size`.
    /// - `BucketOutOfBoundsError` if either bucket is out of range.
    pub fn check(&self, item: &Item) -> Result<(), PirError> {
        if item.data.len() != self.item_size {
            return Err(PirError::InvalidConfigurationError(
                "item data length does not match the table's item size",
            ));
        }
        self.check_item_buckets(item)
    }

    /// Inserts `item` into one of its two buckets, evicting and relocating other items as needed.
    ///
    /// # Errors
    ///
    /// - `InvalidConfigurationError` if `item.data` is not `item_size` bytes.
    /// - `BucketOutOfBoundsError` if either of `item`'s buckets is out of range.
    ///
    /// In both of these cases the table is unmodified.
    ///
    /// - `CapacityError` if the eviction chain reached `MAX_EVICTIONS` without finding a free slot.
    ///   `item` itself is stored, and the item left without a slot is returned in the error.
    pub fn insert(&mut self, item: Item) -> Result<(), PirError> {
        self.check(&item)?;

        let start = if self.rng.gen::<bool>() {
            item.bucket1
        } else {
            item.bucket2
        };
        if self.try_place(start, &item) {
            return Ok(());
        }

        let mut target = item.other_bucket(start);
        let mut current = item;
        for evictions in 0..MAX_EVICTIONS {
            if self.try_place(target, &current) {
                log::debug!("CuckooTable::insert -- placed after {} evictions", evictions);
                return Ok(());
            }

            // Every slot of `target` is occupied; swap `current` in for a random victim.
            let victim_depth = self.rng.gen_range(0..self.bucket_depth);
            let victim_slot = self.slot_index(target, victim_depth);
            let evicted = self.take_slot(victim_slot);
            assert!(
                self.place_at(victim_slot, &current),
                "an evicted slot could not be immediately refilled"
            );

            target = evicted.other_bucket(target);
            current = evicted;
        }

        log::debug!(
            "CuckooTable::insert -- eviction budget exhausted, displacing item {}",
            current.id
        );
        Err(PirError::CapacityError {
            displaced: Box::new(current),
        })
    }

    /// Removes one slot matching `item` from one of its two buckets.
    /// Only `item.bucket1` and `item.bucket2` are searched.
    /// Returns whether a slot was removed.
    pub fn remove(&mut self, item: &Item) -> bool {
        if self.check_item_buckets(item).is_err() {
            return false;
        }

        let first = if self.rng.gen::<bool>() {
            item.bucket1
        } else {
            item.bucket2
        };

        for bucket in [first, item.other_bucket(first)] {
            if let Some(index) = self.find_in_bucket(bucket, item) {
                self.take_slot(index);
                return true;
            }
        }
        false
    }

    fn check_bucket(&self, bucket: BucketIndex) -> Result<(), PirError> {
        if bucket >= self.num_buckets {
            return Err(PirError::BucketOutOfBoundsError {
                bucket,
                num_buckets: self.num_buckets,
            });
        }
        Ok(())
    }

    fn check_item_buckets(&self, item: &Item) -> Result<(), PirError> {
        self.check_bucket(item.bucket1)?;
        self.check_bucket(item.bucket2)
    }

    fn slot_index(&self, bucket: BucketIndex, depth: usize) -> usize {
        bucket * self.bucket_depth + depth
    }

    fn bucket_slots(&self, bucket: BucketIndex) -> std::ops::Range<usize> {
        let first = self.slot_index(bucket, 0);
        first..first + self.bucket_depth
    }

    fn find_in_bucket(&self, bucket: BucketIndex, item: &Item) -> Option<usize> {
        self.bucket_slots(bucket)
            .find(|&index| item.matches(&self.slots[index]))
    }

    /// Places `item` in the first free slot of `bucket`, returning whether one was free.
    fn try_place(&mut self, bucket: BucketIndex, item: &Item) -> bool {
        let free_slot = self
            .bucket_slots(bucket)
            .find(|&index| !self.slots[index].filled);
        match free_slot {
            Some(index) => self.place_at(index, item),
            None => false,
        }
    }

    fn place_at(&mut self, index: usize, item: &Item) -> bool {
        if self.slots[index].filled {
            return false;
        }
        let offset = index * self.item_size;
        self.data[offset..offset + self.item_size].copy_from_slice(&item.data);
        self.slots[index] = SlotMetadata {
            id: item.id,
            bucket1: item.bucket1,
            bucket2: item.bucket2,
            filled: true,
        };
        true
    }

    /// Empties slot `index` and returns a copy of the item it held.
    fn take_slot(&mut self, index: usize) -> Item {
        let slot = self.slots[index];
        assert!(slot.filled);

        let offset = index * self.item_size;
        let region = &mut self.data[offset..offset + self.item_size];
        let data = region.to_vec();
        region.fill(0);
        self.slots[index] = SlotMetadata::default();

        Item {
            id: slot.id,
            data,
            bucket1: slot.bucket1,
            bucket2: slot.bucket2,
        }
    }
}
