// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A deterministic random bit generator used to mask PIR responses.
//!
//! The stream is AES-128 in counter mode: the first `DRBG_KEY_SIZE` bytes of a [`PadSeed`]
//! are the key and the remaining `DRBG_BLOCK_SIZE` bytes are the initial counter block,
//! read as a big-endian integer and incremented (with wraparound) once per output block.
//! The same seed always yields the same stream, so a client can strip the pad a trust
//! domain applied to its response.

use crate::{PirError, DRBG_BLOCK_SIZE, DRBG_KEY_SIZE, PAD_SEED_SIZE};
use aes::{
    cipher::{BlockEncrypt, KeyInit},
    Aes128,
};
use rand::{
    distributions::{Distribution, Standard},
    CryptoRng, Rng, RngCore,
};
use static_assertions::const_assert_eq;

const_assert_eq!(PAD_SEED_SIZE, 32);

#[derive(Clone, Copy, PartialEq, Eq)]
/// The seed of a response pad: `{key, iv}`.
pub struct PadSeed([u8; PAD_SEED_SIZE]);

impl PadSeed {
    /// Instantiates a `PadSeed` from `PAD_SEED_SIZE` bytes.
    pub fn new(bytes: [u8; PAD_SEED_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parses a `PadSeed` from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` if `bytes` is not `PAD_SEED_SIZE` bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PirError> {
        let bytes: [u8; PAD_SEED_SIZE] = bytes
            .try_into()
            .map_err(|_| PirError::InvalidConfigurationError("pad seed has the wrong length"))?;
        Ok(Self(bytes))
    }

    /// Draws a fresh seed from a cryptographically secure generator.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        rng.gen()
    }

    /// The AES key.
    pub fn key(&self) -> &[u8] {
        &self.0[..DRBG_KEY_SIZE]
    }

    /// The initial counter block.
    pub fn iv(&self) -> &[u8] {
        &self.0[DRBG_KEY_SIZE..]
    }

    /// The seed's bytes, `key || iv`.
    pub fn as_bytes(&self) -> &[u8; PAD_SEED_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for PadSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PadSeed(..)")
    }
}

impl Distribution<PadSeed> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> PadSeed {
        let mut result = [0u8; PAD_SEED_SIZE];
        rng.fill_bytes(&mut result);
        PadSeed(result)
    }
}

/// An AES-128-CTR keystream generator.
pub struct Drbg {
    cipher: Aes128,
    counter: u128,
    block: [u8; DRBG_BLOCK_SIZE],
    // Bytes of `block` already handed out.
    consumed: usize,
}

impl Drbg {
    /// Returns a generator positioned at the start of `seed`'s stream.
    pub fn new(seed: &PadSeed) -> Self {
        let mut key = [0u8; DRBG_KEY_SIZE];
        key.copy_from_slice(seed.key());
        let mut iv = [0u8; DRBG_BLOCK_SIZE];
        iv.copy_from_slice(seed.iv());

        Self {
            cipher: Aes128::new(&key.into()),
            counter: u128::from_be_bytes(iv),
            block: [0u8; DRBG_BLOCK_SIZE],
            consumed: DRBG_BLOCK_SIZE,
        }
    }

    fn refill(&mut self) {
        let mut block = aes::Block::from(self.counter.to_be_bytes());
        self.cipher.encrypt_block(&mut block);
        self.block.copy_from_slice(&block);
        self.counter = self.counter.wrapping_add(1);
        self.consumed = 0;
    }

    /// XORs the next `buf.len()` bytes of the stream into `buf`.
    pub fn apply_pad(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            if self.consumed == DRBG_BLOCK_SIZE {
                self.refill();
            }
            *byte ^= self.block[self.consumed];
            self.consumed += 1;
        }
    }

    /// Returns the next `len` bytes of the stream.
    pub fn pad(&mut self, len: usize) -> Vec<u8> {
        let mut result = vec![0u8; len];
        self.apply_pad(&mut result);
        result
    }
}

impl std::fmt::Debug for Drbg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drbg").finish_non_exhaustive()
    }
}

impl RngCore for Drbg {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.fill_bytes(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.fill_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(0);
        self.apply_pad(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for Drbg {}
