// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! This module contains common test utilities for the `pirlog` crate.

use crate::shard::{ByteShard, Shard, WordShard};
use crate::utils::{random_bytes, request_vector_len, xor_into};
use crate::{BucketIndex, Item, ItemId, PirError};
use duplicate::duplicate_item;
use simplelog::{Config, WriteLogger};
use std::sync::Once;

pub(crate) use rand::{rngs::StdRng, Rng, SeedableRng};

static INIT: Once = Once::new();

// For use in manual testing and inspection.
pub(crate) fn init_logger() {
    INIT.call_once(|| {
        WriteLogger::init(log::LevelFilter::Info, Config::default(), std::io::stdout()).unwrap()
    })
}

/// Shard types the correctness tests can be generated for.
pub(crate) trait TestableShard: Shard + Sized {
    fn construct(
        num_buckets: BucketIndex,
        bucket_size: usize,
        data: Vec<u8>,
    ) -> Result<Self, PirError>;
}

#[duplicate_item(
    shard_type;
    [ByteShard];
    [WordShard];
)]
impl TestableShard for shard_type {
    fn construct(
        num_buckets: BucketIndex,
        bucket_size: usize,
        data: Vec<u8>,
    ) -> Result<Self, PirError> {
        shard_type::new(num_buckets, bucket_size, data)
    }
}

/// Returns `num_buckets * bucket_size` random bytes.
pub(crate) fn random_database(
    num_buckets: BucketIndex,
    bucket_size: usize,
    rng: &mut StdRng,
) -> Vec<u8> {
    random_bytes(num_buckets * bucket_size, rng)
}

/// Returns an item with random payload and random buckets.
pub(crate) fn random_item(
    id: ItemId,
    num_buckets: BucketIndex,
    item_size: usize,
    rng: &mut StdRng,
) -> Item {
    Item::new(
        id,
        random_bytes(item_size, rng),
        rng.gen_range(0..num_buckets),
        rng.gen_range(0..num_buckets),
    )
}

/// A straightforward (branching, not oblivious) scan used as an oracle.
pub(crate) fn reference_scan(data: &[u8], bucket_size: usize, request: &[u8]) -> Vec<u8> {
    let mut result = vec![0u8; bucket_size];
    for (i, bucket) in data.chunks(bucket_size).enumerate() {
        if request[i / 8] & (1 << (i % 8)) != 0 {
            xor_into(&mut result, bucket);
        }
    }
    result
}

/// Checks that a vector with a single bit `k` set returns exactly bucket `k`.
pub(crate) fn test_unit_vectors<S: TestableShard>(
    num_buckets: BucketIndex,
    bucket_size: usize,
    _batch_size: usize,
) {
    init_logger();
    let mut rng = StdRng::seed_from_u64(0);

    let data = random_database(num_buckets, bucket_size, &mut rng);
    let shard = S::construct(num_buckets, bucket_size, data.clone()).unwrap();
    let req_vector_len = request_vector_len(num_buckets);

    for k in 0..num_buckets {
        let mut request = vec![0u8; req_vector_len];
        request[k / 8] |= 1 << (k % 8);
        assert_eq!(
            shard.read(&request, req_vector_len).unwrap(),
            &data[k * bucket_size..(k + 1) * bucket_size],
            "{k}"
        );
        assert_eq!(shard.bucket(k).unwrap(), &data[k * bucket_size..(k + 1) * bucket_size]);
    }

    assert!(shard.bucket(num_buckets).is_err());
    let zeros = vec![0u8; req_vector_len];
    assert_eq!(
        shard.read(&zeros, req_vector_len).unwrap(),
        vec![0u8; bucket_size]
    );
}

/// Checks random request batches against [`reference_scan`].
pub(crate) fn test_random_batches<S: TestableShard>(
    num_buckets: BucketIndex,
    bucket_size: usize,
    batch_size: usize,
) {
    init_logger();
    let mut rng = StdRng::seed_from_u64(1);

    let data = random_database(num_buckets, bucket_size, &mut rng);
    let shard = S::construct(num_buckets, bucket_size, data.clone()).unwrap();
    let req_vector_len = request_vector_len(num_buckets);

    let requests = random_bytes(req_vector_len * batch_size, &mut rng);
    let responses = shard.read(&requests, req_vector_len).unwrap();
    assert_eq!(responses.len(), batch_size * bucket_size);

    for (request, response) in requests
        .chunks(req_vector_len)
        .zip(responses.chunks(bucket_size))
    {
        assert_eq!(response, reference_scan(&data, bucket_size, request));
    }
}

/// Checks that malformed batches are rejected.
pub(crate) fn test_batch_sizing<S: TestableShard>(
    num_buckets: BucketIndex,
    bucket_size: usize,
    batch_size: usize,
) {
    let data = vec![1u8; num_buckets * bucket_size];
    let shard = S::construct(num_buckets, bucket_size, data).unwrap();
    let req_vector_len = request_vector_len(num_buckets);

    assert!(matches!(
        shard.read(&[], 0),
        Err(PirError::InvalidConfigurationError(_))
    ));
    if req_vector_len > 1 {
        let requests = vec![0u8; req_vector_len * batch_size + 1];
        assert!(matches!(
            shard.read(&requests, req_vector_len),
            Err(PirError::InvalidConfigurationError(_))
        ));
        let short = vec![0u8; (req_vector_len - 1) * batch_size];
        assert!(shard.read(&short, req_vector_len - 1).is_err());
    }

    // Longer vectors than necessary are accepted; the extra bits select nothing.
    let padded = vec![0xffu8; (req_vector_len + 1) * batch_size];
    let responses = shard.read(&padded, req_vector_len + 1).unwrap();
    assert_eq!(responses.len(), batch_size * bucket_size);

    assert!(shard.read(&[], req_vector_len).unwrap().is_empty());
}

macro_rules! create_shard_correctness_test {
    ($function_name:ident, $shard_type:ident, $num_buckets:expr, $bucket_size:expr, $batch_size:expr) => {
        paste::paste! {
            #[test]
            fn [<$function_name _ $shard_type:snake _ $num_buckets _ $bucket_size _ $batch_size>]() {
                $function_name::<$shard_type>($num_buckets, $bucket_size, $batch_size);
            }
        }
    };
}

macro_rules! create_shard_correctness_tests_for_workload {
    ($function_name:ident, $shard_type:ident) => {
        create_shard_correctness_test!($function_name, $shard_type, 1, 1, 1);
        create_shard_correctness_test!($function_name, $shard_type, 8, 8, 4);
        create_shard_correctness_test!($function_name, $shard_type, 16, 16, 3);
        create_shard_correctness_test!($function_name, $shard_type, 37, 13, 5);
        create_shard_correctness_test!($function_name, $shard_type, 100, 64, 8);
        create_shard_correctness_test!($function_name, $shard_type, 257, 24, 2);
    };
}

macro_rules! create_shard_correctness_tests {
    ($shard_type:ident) => {
        create_shard_correctness_tests_for_workload!(test_unit_vectors, $shard_type);
        create_shard_correctness_tests_for_workload!(test_random_batches, $shard_type);
        create_shard_correctness_tests_for_workload!(test_batch_sizing, $shard_type);
    };
}

pub(crate) use create_shard_correctness_test;
pub(crate) use create_shard_correctness_tests;
pub(crate) use create_shard_correctness_tests_for_workload;
