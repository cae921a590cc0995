// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Publishes a message to two trust domains and privately reads it back.

extern crate pirlog;

use pirlog::{generate_read_args, recover_bucket, Item, PirError, Replica, ReplicaConfig};
use rand::rngs::OsRng;

const NUM_BUCKETS: usize = 1024;
const BUCKET_DEPTH: usize = 4;
const ITEM_SIZE: usize = 64;

fn main() -> Result<(), PirError> {
    let config = ReplicaConfig::new(NUM_BUCKETS, BUCKET_DEPTH, ITEM_SIZE);
    let domains = [
        Replica::new(config.clone())?,
        Replica::new(config.with_backend("cpu64"))?,
    ];

    let mut message = b"hello, oblivious world".to_vec();
    message.resize(ITEM_SIZE, 0);
    let item = Item::new(1, message.clone(), 17, 600);

    // The write coordinator hands every write to every domain, then closes the epoch.
    for domain in &domains {
        domain.write(item.clone())?;
        domain.flop()?;
    }

    // The reader does not know which of its two buckets the item landed in, so it reads both.
    for bucket in [item.bucket1, item.bucket2] {
        let args = generate_read_args(bucket, domains.len(), NUM_BUCKETS, &mut OsRng)?;
        let mut responses = Vec::new();
        for (domain, arg) in domains.iter().zip(&args) {
            responses.extend(domain.batch_read_padded(std::slice::from_ref(arg))?);
        }

        let contents = recover_bucket(&args, &responses)?;
        let found = contents.chunks(ITEM_SIZE).any(|slot| slot == message);
        println!("bucket {}: message found = {}", bucket, found);
    }

    Ok(())
}
