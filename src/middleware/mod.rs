// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request middleware: access-token authentication and response hardening.

pub mod auth;
pub mod security;

pub use auth::{require_auth, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
pub use security::add_security_headers;
