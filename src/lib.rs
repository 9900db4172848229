// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! VidTube: identity and session backend for a video-sharing service
//!
//! This crate provides user registration, login, token-based sessions with
//! refresh-token rotation, profile maintenance with media uploads, and the
//! channel-profile and watch-history read views.

pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::UserStore;
use error::AppError;
use services::{
    Authenticator, IdentityService, MediaAssetManager, ObjectStorage, PasswordHasher, TokenService,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub identity: IdentityService,
    pub authenticator: Authenticator,
}

impl AppState {
    /// Wire services on top of a user store and an object store.
    pub fn new(
        config: Config,
        store: Arc<dyn UserStore>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Result<Self, AppError> {
        let tokens = TokenService::new(config.tokens.clone(), store.clone());
        let hasher = PasswordHasher::new(config.hasher)?;
        let media = MediaAssetManager::new(storage);

        let authenticator = Authenticator::new(tokens.clone(), store.clone());
        let identity = IdentityService::new(store, hasher, tokens, media);

        Ok(Self {
            config,
            identity,
            authenticator,
        })
    }
}
