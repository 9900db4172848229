// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Random identifiers.

use anyhow::anyhow;
use ring::rand::{SecureRandom, SystemRandom};

/// Length in bytes of generated user IDs (24 hex characters).
const ID_BYTES: usize = 12;

/// Generate `len` random bytes, hex encoded.
pub fn random_hex(len: usize) -> anyhow::Result<String> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| anyhow!("system random source unavailable"))?;
    Ok(hex::encode(buf))
}

/// Generate a new document ID.
pub fn new_id() -> anyhow::Result<String> {
    random_hex(ID_BYTES)
}
