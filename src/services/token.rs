// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access/refresh token issuance, verification and rotation.
//!
//! Access tokens are verified from their signature alone. Refresh tokens are
//! also persisted on the user document, and a presented refresh token is only
//! accepted if it equals the stored value. Rotating a token therefore
//! invalidates the previous one even before it expires.

use crate::config::TokenConfig;
use crate::db::UserStore;
use crate::error::AppError;
use crate::ids::random_hex;
use anyhow::Context;
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;

/// JWT claims shared by both token kinds.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    /// Unique token ID, so two tokens issued in the same second still differ
    pub jti: String,
}

/// A freshly issued session.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Per-user locks serializing every write of a user's refresh token within
/// this process: issue, rotate and revoke.
pub type SessionLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Issues, verifies and rotates session tokens.
#[derive(Clone)]
pub struct TokenService {
    config: TokenConfig,
    store: Arc<dyn UserStore>,
    session_locks: SessionLocks,
}

impl TokenService {
    pub fn new(config: TokenConfig, store: Arc<dyn UserStore>) -> Self {
        Self {
            config,
            store,
            session_locks: Arc::new(DashMap::new()),
        }
    }

    /// Access token lifetime, used for cookie max-age.
    pub fn access_ttl(&self) -> Duration {
        self.config.access_token_ttl
    }

    /// Refresh token lifetime, used for cookie max-age.
    pub fn refresh_ttl(&self) -> Duration {
        self.config.refresh_token_ttl
    }

    fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Sign a new token pair and store the refresh token on the user,
    /// replacing any previous one.
    pub async fn issue_pair(&self, user_id: &str) -> Result<TokenPair, AppError> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;
        self.issue_pair_locked(user_id).await
    }

    /// Caller must hold the user's session lock.
    async fn issue_pair_locked(&self, user_id: &str) -> Result<TokenPair, AppError> {
        let access_token = sign(
            user_id,
            &self.config.access_token_secret,
            self.config.access_token_ttl,
        )?;
        let refresh_token = sign(
            user_id,
            &self.config.refresh_token_secret,
            self.config.refresh_token_ttl,
        )?;

        self.store
            .set_refresh_token(user_id, Some(&refresh_token))
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Verify an access token's signature and expiry, returning the user ID.
    pub fn verify_access(&self, token: &str) -> Result<String, AppError> {
        verify(token, &self.config.access_token_secret)
            .map(|claims| claims.sub)
            .ok_or(AppError::Unauthorized)
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// Every rejection reason yields the same `InvalidRefreshToken` error.
    pub async fn rotate(&self, presented: &str) -> Result<TokenPair, AppError> {
        let Some(claims) = verify(presented, &self.config.refresh_token_secret) else {
            tracing::debug!("Refresh rejected: bad signature or expired");
            return Err(AppError::InvalidRefreshToken);
        };
        let user_id = claims.sub;

        let lock = self.lock_for(&user_id);
        let _guard = lock.lock().await;

        let Some(user) = self.store.find_by_id(&user_id).await? else {
            tracing::debug!(user_id = %user_id, "Refresh rejected: user no longer exists");
            return Err(AppError::InvalidRefreshToken);
        };

        let matches = user
            .refresh_token
            .as_deref()
            .is_some_and(|stored| bool::from(stored.as_bytes().ct_eq(presented.as_bytes())));

        if !matches {
            tracing::warn!(
                user_id = %user_id,
                "Refresh rejected: token does not match stored session (possible replay)"
            );
            return Err(AppError::InvalidRefreshToken);
        }

        self.issue_pair_locked(&user_id).await
    }

    /// End the user's session by unsetting the stored refresh token.
    ///
    /// Waits for an in-flight rotation, so a refresh racing a logout cannot
    /// write a live token back afterwards.
    pub async fn revoke(&self, user_id: &str) -> Result<(), AppError> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;
        self.store.set_refresh_token(user_id, None).await
    }
}

fn sign(user_id: &str, secret: &[u8], ttl: Duration) -> Result<String, AppError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before Unix epoch")?
        .as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + ttl.as_secs() as usize,
        jti: random_hex(16)?,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .context("JWT signing failed")?;

    Ok(token)
}

fn verify(token: &str, secret: &[u8]) -> Option<Claims> {
    let key = DecodingKey::from_secret(secret);
    let validation = Validation::new(Algorithm::HS256);

    decode::<Claims>(token, &key, &validation)
        .ok()
        .map(|data| data.claims)
}
