// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Immutable PIR scan engines over a flat, bucket-major buffer.
//!
//! A read request is a bitvector with one bit per bucket; the response is the XOR of every
//! bucket whose bit is set. Every scan touches every bucket, in order, for every request,
//! and selects buckets with constant-time masking, so neither the memory access pattern nor
//! the timing depends on which bits are set.

use crate::{utils::ct_bit, utils::request_vector_len, BucketIndex, PirError};
use subtle::ConditionallySelectable;

/// An immutable snapshot that answers batched PIR reads.
///
/// Implementations must be safe to read from any number of threads at once.
pub trait Shard: std::fmt::Debug + Send + Sync {
    /// The number of buckets in the shard.
    fn num_buckets(&self) -> BucketIndex;

    /// The size of each bucket in bytes.
    fn bucket_size(&self) -> usize;

    /// Returns the bytes of bucket `bucket`.
    fn bucket(&self, bucket: BucketIndex) -> Result<&[u8], PirError>;

    /// Answers a batch of `requests.len() / req_vector_len` request vectors, returning the
    /// concatenation of one `bucket_size`-byte response per request.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` if `requests.len()` is not a multiple of
    /// `req_vector_len`, or if `req_vector_len` is too short to hold one bit per bucket.
    fn read(&self, requests: &[u8], req_vector_len: usize) -> Result<Vec<u8>, PirError>;
}

/// Checks the geometry of a shard's backing buffer.
fn check_geometry(
    num_buckets: BucketIndex,
    bucket_size: usize,
    data: &[u8],
) -> Result<(), PirError> {
    if num_buckets == 0 || bucket_size == 0 {
        return Err(PirError::InvalidConfigurationError(
            "shard dimensions must be nonzero",
        ));
    }
    if num_buckets.checked_mul(bucket_size) != Some(data.len()) {
        return Err(PirError::InvalidConfigurationError(
            "shard data length must equal num_buckets * bucket_size",
        ));
    }
    Ok(())
}

/// Checks a request batch against a shard, returning the number of requests in it.
fn check_batch(
    num_buckets: BucketIndex,
    requests: &[u8],
    req_vector_len: usize,
) -> Result<usize, PirError> {
    if req_vector_len < request_vector_len(num_buckets) {
        return Err(PirError::InvalidConfigurationError(
            "request vector is shorter than one bit per bucket",
        ));
    }
    if requests.len() % req_vector_len != 0 {
        return Err(PirError::InvalidConfigurationError(
            "request batch length is not a multiple of the request vector length",
        ));
    }
    Ok(requests.len() / req_vector_len)
}

fn bucket_slice(
    data: &[u8],
    num_buckets: BucketIndex,
    bucket_size: usize,
    bucket: BucketIndex,
) -> Result<&[u8], PirError> {
    if bucket >= num_buckets {
        return Err(PirError::BucketOutOfBoundsError {
            bucket,
            num_buckets,
        });
    }
    Ok(&data[bucket * bucket_size..(bucket + 1) * bucket_size])
}

/// The reference scan engine: selects and XORs one byte at a time.
#[derive(Debug)]
pub struct ByteShard {
    num_buckets: BucketIndex,
    bucket_size: usize,
    data: Vec<u8>,
}

impl ByteShard {
    /// Wraps `data` as `num_buckets` buckets of `bucket_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` if a dimension is zero or
    /// `data.len() != num_buckets * bucket_size`.
    pub fn new(
        num_buckets: BucketIndex,
        bucket_size: usize,
        data: Vec<u8>,
    ) -> Result<Self, PirError> {
        check_geometry(num_buckets, bucket_size, &data)?;
        Ok(Self {
            num_buckets,
            bucket_size,
            data,
        })
    }
}

impl Shard for ByteShard {
    fn num_buckets(&self) -> BucketIndex {
        self.num_buckets
    }

    fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    fn bucket(&self, bucket: BucketIndex) -> Result<&[u8], PirError> {
        bucket_slice(&self.data, self.num_buckets, self.bucket_size, bucket)
    }

    fn read(&self, requests: &[u8], req_vector_len: usize) -> Result<Vec<u8>, PirError> {
        let batch_size = check_batch(self.num_buckets, requests, req_vector_len)?;
        let mut responses = vec![0u8; batch_size * self.bucket_size];

        for (request, response) in requests
            .chunks_exact(req_vector_len)
            .zip(responses.chunks_exact_mut(self.bucket_size))
        {
            for (i, bucket) in self.data.chunks_exact(self.bucket_size).enumerate() {
                let selected = ct_bit(request, i);
                for (r, b) in response.iter_mut().zip(bucket) {
                    *r ^= u8::conditional_select(&0, b, selected);
                }
            }
        }
        Ok(responses)
    }
}

const LANE_SIZE: usize = 8;

/// A scan engine that selects and XORs 64-bit lanes, falling back to bytes for any tail.
/// Produces output identical to [`ByteShard`].
#[derive(Debug)]
pub struct WordShard {
    num_buckets: BucketIndex,
    bucket_size: usize,
    data: Vec<u8>,
}

impl WordShard {
    /// Wraps `data` as `num_buckets` buckets of `bucket_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` if a dimension is zero or
    /// `data.len() != num_buckets * bucket_size`.
    pub fn new(
        num_buckets: BucketIndex,
        bucket_size: usize,
        data: Vec<u8>,
    ) -> Result<Self, PirError> {
        check_geometry(num_buckets, bucket_size, &data)?;
        Ok(Self {
            num_buckets,
            bucket_size,
            data,
        })
    }
}

impl Shard for WordShard {
    fn num_buckets(&self) -> BucketIndex {
        self.num_buckets
    }

    fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    fn bucket(&self, bucket: BucketIndex) -> Result<&[u8], PirError> {
        bucket_slice(&self.data, self.num_buckets, self.bucket_size, bucket)
    }

    fn read(&self, requests: &[u8], req_vector_len: usize) -> Result<Vec<u8>, PirError> {
        let batch_size = check_batch(self.num_buckets, requests, req_vector_len)?;
        let num_lanes = self.bucket_size / LANE_SIZE;
        let lane_bytes = num_lanes * LANE_SIZE;

        let mut responses = Vec::with_capacity(batch_size * self.bucket_size);
        let mut lanes = vec![0u64; num_lanes];
        let mut tail = vec![0u8; self.bucket_size - lane_bytes];

        for request in requests.chunks_exact(req_vector_len) {
            lanes.fill(0);
            tail.fill(0);

            for (i, bucket) in self.data.chunks_exact(self.bucket_size).enumerate() {
                let mask = u64::conditional_select(&0, &u64::MAX, ct_bit(request, i));
                let (words, rest) = bucket.split_at(lane_bytes);

                for (lane, word) in lanes.iter_mut().zip(words.chunks_exact(LANE_SIZE)) {
                    let mut bytes = [0u8; LANE_SIZE];
                    bytes.copy_from_slice(word);
                    *lane ^= u64::from_le_bytes(bytes) & mask;
                }
                for (t, b) in tail.iter_mut().zip(rest) {
                    *t ^= b & (mask as u8);
                }
            }

            for lane in &lanes {
                responses.extend_from_slice(&lane.to_le_bytes());
            }
            responses.extend_from_slice(&tail);
        }
        Ok(responses)
    }
}
