// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod channel;
pub mod user;

pub use channel::{ChannelProfile, Subscription, Video, VideoOwner, WatchedVideo};
pub use user::{LocalFile, MediaAssetRef, User, UserResponse};
