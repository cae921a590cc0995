// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! An oblivious storage and retrieval engine for a private publish/subscribe log.
//!
//! Writers hand [`Item`]s to a [`Replica`], which places them in a cuckoo-hashed
//! [`CuckooTable`]. Readers retrieve whole buckets with Private Information Retrieval:
//! a client secret-shares a one-hot [`RequestVector`] across several trust domains
//! (see [`generate_read_args`]), each domain answers with a data-oblivious linear
//! scan of its [`Shard`] masked by a [`Drbg`] pad, and the client XORs the answers
//! back together with [`recover_bucket`].
//!
//! ```
//! use pirlog::{generate_read_args, recover_bucket, Item, Replica, ReplicaConfig};
//! use rand::rngs::OsRng;
//!
//! # fn main() -> Result<(), pirlog::PirError> {
//! let config = ReplicaConfig::new(16, 2, 8);
//! let domains = [Replica::new(config.clone())?, Replica::new(config)?];
//!
//! let item = Item::new(1, vec![7u8; 8], 3, 3);
//! for domain in &domains {
//!     domain.write(item.clone())?;
//!     domain.flop()?;
//! }
//!
//! let args = generate_read_args(3, domains.len(), 16, &mut OsRng)?;
//! let mut responses = Vec::new();
//! for (domain, arg) in domains.iter().zip(&args) {
//!     responses.push(domain.batch_read_padded(std::slice::from_ref(arg))?.remove(0));
//! }
//! let bucket = recover_bucket(&args, &responses)?;
//! assert!(bucket.chunks(8).any(|slot| slot == [7u8; 8]));
//! # Ok(())
//! # }
//! ```

#![warn(clippy::cargo, clippy::doc_markdown, missing_docs, rustdoc::all)]

use std::num::TryFromIntError;
use thiserror::Error;

pub mod backend;
pub mod cuckoo;
pub mod drbg;
pub mod replica;
pub mod request;
pub mod shard;
#[cfg(test)]
mod test_utils;
mod utils;

pub use crate::backend::{BackendRegistry, ShardBuilder};
pub use crate::cuckoo::{CuckooTable, Item};
pub use crate::drbg::{Drbg, PadSeed};
pub use crate::replica::{Replica, ReplicaConfig};
pub use crate::request::{
    combine_responses, concat_request_batch, generate_read_args, generate_request_vectors,
    recover_bucket, ReadArgs, RequestVector,
};
pub use crate::shard::{ByteShard, Shard, WordShard};

/// Numeric type used to index buckets.
pub type BucketIndex = usize;

/// Numeric type used to identify items.
pub type ItemId = u64;

/// Seed for the generator owned by a [`CuckooTable`].
pub type TableSeed = u64;

/// The maximum number of chained evictions a single cuckoo insert may perform.
pub const MAX_EVICTIONS: usize = 500;

/// The default fraction of table capacity above which a replica evicts its oldest entries.
pub const DEFAULT_MAX_LOAD_FACTOR: f64 = 0.95;

/// The default fraction of table capacity evicted when the load factor is exceeded.
pub const DEFAULT_LOAD_FACTOR_STEP: f64 = 0.05;

/// The name under which the reference scan backend is registered.
pub const DEFAULT_BACKEND: &str = "cpu";

/// The size in bytes of the DRBG key portion of a [`PadSeed`].
pub const DRBG_KEY_SIZE: usize = 16;

/// The size in bytes of one DRBG output block, and of the iv portion of a [`PadSeed`].
pub const DRBG_BLOCK_SIZE: usize = 16;

/// The size in bytes of a [`PadSeed`].
pub const PAD_SEED_SIZE: usize = DRBG_KEY_SIZE + DRBG_BLOCK_SIZE;

#[derive(Error, Debug)]
/// Errors produced by the storage and retrieval engine.
pub enum PirError {
    /// Sizes or parameters are inconsistent with the configured geometry.
    /// Rejected operations leave all structures unmodified.
    #[error("Invalid configuration: {0}")]
    InvalidConfigurationError(&'static str),

    /// A bucket index was at least the number of buckets.
    #[error("Bucket {bucket} is out of bounds for a table of {num_buckets} buckets")]
    BucketOutOfBoundsError {
        /// The offending bucket index.
        bucket: BucketIndex,
        /// The number of buckets in the table.
        num_buckets: BucketIndex,
    },

    /// A cuckoo insert exhausted its eviction budget.
    /// The item left without a slot is returned so the caller can decide its fate.
    #[error("Cuckoo insert exhausted its eviction budget; item {} was displaced", .displaced.id)]
    CapacityError {
        /// The item that could not be placed.
        displaced: Box<Item>,
    },

    /// A table or shard is not in a usable state.
    #[error("Invalid state: {0}")]
    StateError(&'static str),

    /// No scan backend is registered under the requested name.
    #[error("Unknown scan backend: {0}")]
    UnknownBackendError(String),

    /// Arithmetic conversion error.
    #[error("Arithmetic error encountered.")]
    IntegerConversionError(#[from] TryFromIntError),
}
