// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Argon2id password hashing.
//!
//! Hashing is deliberately expensive, so both operations run on the
//! blocking thread pool.

use crate::config::HasherConfig;
use crate::error::AppError;
use anyhow::Context;
use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};

const OUTPUT_LENGTH: usize = 32;

/// Argon2id password hasher.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// Create a hasher with the configured cost parameters.
    pub fn new(config: HasherConfig) -> Result<Self, AppError> {
        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(OUTPUT_LENGTH),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid argon2 parameters: {}", e)))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext password into a PHC string.
    pub async fn hash(&self, plaintext: &str) -> Result<String, AppError> {
        let argon2 = self.argon2();
        let plaintext = plaintext.to_string();

        let digest = tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(plaintext.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| anyhow::anyhow!("argon2 hashing failed: {}", e))
        })
        .await
        .context("password hashing task panicked")??;

        Ok(digest)
    }

    /// Check a plaintext password against a stored digest.
    ///
    /// A wrong password is `Ok(false)`. A digest that cannot be parsed is an
    /// internal error.
    pub async fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AppError> {
        let argon2 = self.argon2();
        let plaintext = plaintext.to_string();
        let digest = digest.to_string();

        let matches = tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&digest)
                .map_err(|e| anyhow::anyhow!("malformed password digest: {}", e))?;
            Ok::<_, anyhow::Error>(
                argon2
                    .verify_password(plaintext.as_bytes(), &parsed)
                    .is_ok(),
            )
        })
        .await
        .context("password verification task panicked")??;

        Ok(matches)
    }
}
