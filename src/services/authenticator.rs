// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Resolves access tokens into caller identities.

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{MediaAssetRef, User};
use crate::services::token::TokenService;
use std::sync::Arc;

/// The authenticated caller, with its current non-sensitive profile fields.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub id: String,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar: MediaAssetRef,
    pub cover_image: Option<MediaAssetRef>,
}

impl From<User> for CallerIdentity {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            fullname: user.fullname,
            avatar: user.avatar,
            cover_image: user.cover_image,
        }
    }
}

/// Turns an access token into a [`CallerIdentity`].
#[derive(Clone)]
pub struct Authenticator {
    tokens: TokenService,
    store: Arc<dyn UserStore>,
}

impl Authenticator {
    pub fn new(tokens: TokenService, store: Arc<dyn UserStore>) -> Self {
        Self { tokens, store }
    }

    /// Authenticate a request. Missing, malformed, expired and
    /// deleted-user tokens all fail with `Unauthorized`.
    pub async fn authenticate(
        &self,
        access_token: Option<&str>,
    ) -> Result<CallerIdentity, AppError> {
        let token = access_token
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        let user_id = self.tokens.verify_access(token)?;

        let user = self
            .store
            .find_by_id(&user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(CallerIdentity::from(user))
    }
}
