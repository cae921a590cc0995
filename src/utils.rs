// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Utilities.

use crate::BucketIndex;
use rand::{CryptoRng, RngCore};
use subtle::Choice;

/// Returns the number of bytes needed for a bitvector with one bit per bucket.
pub(crate) fn request_vector_len(num_buckets: BucketIndex) -> usize {
    num_buckets.div_ceil(8)
}

/// Reads bit `index` of a little-endian-within-byte bitvector without branching on its value.
/// Bit `i` lives in byte `i / 8` at position `i % 8`.
pub(crate) fn ct_bit(vector: &[u8], index: usize) -> Choice {
    Choice::from((vector[index / 8] >> (index % 8)) & 1)
}

/// XORs `src` into `dest` byte by byte. Assumes `dest.len() == src.len()`.
pub(crate) fn xor_into(dest: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dest.len(), src.len());
    for (d, s) in dest.iter_mut().zip(src) {
        *d ^= s;
    }
}

/// Returns `len` bytes drawn from `rng`.
pub(crate) fn random_bytes<R: RngCore + CryptoRng>(len: usize, rng: &mut R) -> Vec<u8> {
    let mut result = vec![0u8; len];
    rng.fill_bytes(&mut result);
    result
}
