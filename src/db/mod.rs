//! Database layer.
//!
//! [`UserStore`] is the persistence seam for user documents and the
//! read-side views built on them. Firestore backs it in production;
//! [`MemoryUserStore`] backs tests and local development.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreUserStore;
pub use memory::MemoryUserStore;

use crate::error::AppError;
use crate::models::{ChannelProfile, MediaAssetRef, User, WatchedVideo};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    pub const VIDEOS: &str = "videos";
    /// Claim documents keyed by username, one per user.
    pub const USERNAMES: &str = "usernames";
    /// Claim documents keyed by email, one per user.
    pub const EMAILS: &str = "emails";
}

/// Persistence for user documents.
///
/// Every write targets a single user document. The `set_*` methods touch
/// only the named fields (plus `updated_at`) and skip whole-document
/// validation.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Find a user whose username (already lower-cased) or email matches.
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AppError>;

    /// Store a new user.
    ///
    /// Username and email are claimed in the same atomic step; if either is
    /// already taken nothing is written and `Conflict` is returned.
    async fn insert(&self, user: &User) -> Result<(), AppError>;

    /// Overwrite the stored refresh token, or unset it with `None`.
    async fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<(), AppError>;

    async fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AppError>;

    /// Update whichever of `fullname`/`email` are given, returning the new document.
    ///
    /// An email owned by another user fails with `Conflict`.
    async fn update_details(
        &self,
        id: &str,
        fullname: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AppError>;

    /// Replace the avatar, returning the reference that was stored before.
    async fn set_avatar(
        &self,
        id: &str,
        avatar: &MediaAssetRef,
    ) -> Result<MediaAssetRef, AppError>;

    /// Replace the cover image, returning the reference that was stored before.
    async fn set_cover_image(
        &self,
        id: &str,
        cover_image: Option<&MediaAssetRef>,
    ) -> Result<Option<MediaAssetRef>, AppError>;

    /// Append a viewed video to the user's history.
    ///
    /// Playback is not served here; this is the write side the history view
    /// reads, used to seed it.
    async fn push_watch_history(&self, id: &str, video_id: &str) -> Result<(), AppError>;

    /// Channel profile for `username` as seen by `viewer_id`.
    async fn channel_profile(
        &self,
        username: &str,
        viewer_id: &str,
    ) -> Result<Option<ChannelProfile>, AppError>;

    /// Watch history of `id`, most recent last.
    async fn watch_history(&self, id: &str) -> Result<Vec<WatchedVideo>, AppError>;
}

/// Build a channel profile from the user document and subscription counts.
pub(crate) fn build_channel_profile(
    user: &User,
    subscribers_count: u64,
    channels_subscribed_to_count: u64,
    is_subscribed: bool,
) -> ChannelProfile {
    ChannelProfile {
        id: user.id.clone(),
        username: user.username.clone(),
        fullname: user.fullname.clone(),
        email: user.email.clone(),
        avatar: user.avatar.url.clone(),
        cover_image: user
            .cover_image
            .as_ref()
            .map(|c| c.url.clone())
            .unwrap_or_default(),
        subscribers_count,
        channels_subscribed_to_count,
        is_subscribed,
    }
}
