// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod authenticator;
pub mod cloudinary;
pub mod identity;
pub mod media;
pub mod password;
pub mod storage;
pub mod token;

pub use authenticator::{Authenticator, CallerIdentity};
pub use cloudinary::CloudinaryStorage;
pub use identity::{
    ChangePasswordInput, IdentityService, LoginInput, RegisterInput, Session, UpdateAccountInput,
};
pub use media::MediaAssetManager;
pub use password::PasswordHasher;
pub use storage::{DeleteOutcome, MemoryStorage, ObjectStorage};
pub use token::{TokenPair, TokenService};
