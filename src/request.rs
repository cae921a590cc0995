// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Client-side secret sharing of PIR requests across trust domains, and recombination of responses.
//!
//! To read bucket `t` from `N` trust domains, a client draws `N - 1` uniformly random request
//! vectors and XORs all of them into the unit vector at `t` to form the remaining one. Any proper
//! subset of the vectors is uniformly random, so no coalition short of all `N` domains learns `t`.
//! Because each domain's scan is linear over XOR, the XOR of the `N` responses is bucket `t`.

use crate::{
    drbg::{Drbg, PadSeed},
    utils::{random_bytes, request_vector_len, xor_into},
    BucketIndex, PirError,
};
use rand::{CryptoRng, RngCore};

#[derive(Clone, PartialEq, Eq)]
/// A bitvector with one bit per bucket; bit `i` is bit `i % 8` of byte `i / 8`.
pub struct RequestVector {
    bits: Vec<u8>,
    num_buckets: BucketIndex,
}

impl RequestVector {
    /// Returns an all-zero vector over `num_buckets` buckets.
    pub fn new(num_buckets: BucketIndex) -> Self {
        Self {
            bits: vec![0u8; request_vector_len(num_buckets)],
            num_buckets,
        }
    }

    /// Returns the vector with only bit `target` set.
    ///
    /// # Errors
    ///
    /// Returns a `BucketOutOfBoundsError` if `target >= num_buckets`.
    pub fn unit(target: BucketIndex, num_buckets: BucketIndex) -> Result<Self, PirError> {
        let mut result = Self::new(num_buckets);
        result.set(target)?;
        Ok(result)
    }

    fn random<R: RngCore + CryptoRng>(num_buckets: BucketIndex, rng: &mut R) -> Self {
        Self {
            bits: random_bytes(request_vector_len(num_buckets), rng),
            num_buckets,
        }
    }

    /// The number of buckets this vector addresses.
    pub fn num_buckets(&self) -> BucketIndex {
        self.num_buckets
    }

    fn set(&mut self, bucket: BucketIndex) -> Result<(), PirError> {
        self.check_bucket(bucket)?;
        self.bits[bucket / 8] |= 1 << (bucket % 8);
        Ok(())
    }

    /// XORs `other` into `self`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` if the vectors address different numbers of buckets.
    pub fn xor_assign(&mut self, other: &RequestVector) -> Result<(), PirError> {
        if self.num_buckets != other.num_buckets {
            return Err(PirError::InvalidConfigurationError(
                "request vectors address different numbers of buckets",
            ));
        }
        xor_into(&mut self.bits, &other.bits);
        Ok(())
    }

    /// The vector's bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
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
}

impl std::fmt::Debug for RequestVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestVector")
            .field("num_buckets", &self.num_buckets)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// One trust domain's share of a read: its request vector and the seed of the pad it applies.
pub struct ReadArgs {
    /// This domain's share of the request.
    pub request_vector: RequestVector,
    /// The seed of the pad this domain XORs into its response.
    pub pad_seed: PadSeed,
}

/// Splits a request for bucket `target` into `num_domains` vectors that XOR to the unit vector at `target`.
///
/// # Errors
///
/// - `InvalidConfigurationError` if `num_domains < 2`, since a single vector would reveal `target`.
/// - `BucketOutOfBoundsError` if `target >= num_buckets`.
pub fn generate_request_vectors<R: RngCore + CryptoRng>(
    target: BucketIndex,
    num_domains: usize,
    num_buckets: BucketIndex,
    rng: &mut R,
) -> Result<Vec<RequestVector>, PirError> {
    if num_domains < 2 {
        return Err(PirError::InvalidConfigurationError(
            "at least two trust domains are required",
        ));
    }

    let mut vectors = Vec::with_capacity(num_domains);
    vectors.push(RequestVector::unit(target, num_buckets)?);
    for _ in 1..num_domains {
        let share = RequestVector::random(num_buckets, rng);
        vectors[0].xor_assign(&share)?;
        vectors.push(share);
    }
    Ok(vectors)
}

/// Like [`generate_request_vectors`], additionally pairing each vector with a fresh random pad seed.
pub fn generate_read_args<R: RngCore + CryptoRng>(
    target: BucketIndex,
    num_domains: usize,
    num_buckets: BucketIndex,
    rng: &mut R,
) -> Result<Vec<ReadArgs>, PirError> {
    Ok(generate_request_vectors(target, num_domains, num_buckets, rng)?
        .into_iter()
        .map(|request_vector| ReadArgs {
            request_vector,
            pad_seed: PadSeed::random(rng),
        })
        .collect())
}

/// Concatenates request vectors into a request batch for [`Shard::read`](crate::Shard::read).
///
/// # Errors
///
/// Returns an `InvalidConfigurationError` if the vectors address different numbers of buckets.
pub fn concat_request_batch(vectors: &[&RequestVector]) -> Result<Vec<u8>, PirError> {
    let mut batch = Vec::new();
    if let Some(first) = vectors.first() {
        batch.reserve(vectors.len() * first.as_bytes().len());
        for vector in vectors {
            if vector.num_buckets != first.num_buckets {
                return Err(PirError::InvalidConfigurationError(
                    "request vectors address different numbers of buckets",
                ));
            }
            batch.extend_from_slice(vector.as_bytes());
        }
    }
    Ok(batch)
}

/// XORs `responses` together.
///
/// # Errors
///
/// Returns an `InvalidConfigurationError` if `responses` is empty or the responses differ in length.
pub fn combine_responses<T: AsRef<[u8]>>(responses: &[T]) -> Result<Vec<u8>, PirError> {
    let (first, rest) = responses
        .split_first()
        .ok_or(PirError::InvalidConfigurationError("no responses to combine"))?;

    let mut result = first.as_ref().to_vec();
    for response in rest {
        let response = response.as_ref();
        if response.len() != result.len() {
            return Err(PirError::InvalidConfigurationError(
                "responses differ in length",
            ));
        }
        xor_into(&mut result, response);
    }
    Ok(result)
}

/// Removes each domain's pad from its response and combines the results,
/// recovering the bucket the read targeted.
/// `responses[i]` must be the answer of the domain that received `args[i]`.
///
/// # Errors
///
/// Returns an `InvalidConfigurationError` if `args` and `responses` differ in length,
/// or under the conditions of [`combine_responses`].
pub fn recover_bucket<T: AsRef<[u8]>>(
    args: &[ReadArgs],
    responses: &[T],
) -> Result<Vec<u8>, PirError> {
    if args.len() != responses.len() {
        return Err(PirError::InvalidConfigurationError(
            "expected exactly one response per trust domain",
        ));
    }

    let unpadded = args
        .iter()
        .zip(responses)
        .map(|(arg, response)| {
            let mut response = response.as_ref().to_vec();
            Drbg::new(&arg.pad_seed).apply_pad(&mut response);
            response
        })
        .collect::<Vec<_>>();
    combine_responses(&unpadded)
}
