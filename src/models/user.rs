//! User model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Reference to one object held by the storage provider.
///
/// Both fields always change together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MediaAssetRef {
    /// Caller-facing URL
    pub url: String,
    /// Provider handle needed for deletion
    pub storage_id: String,
}

/// A file received from the client, not yet uploaded anywhere.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }
}

/// User document stored in Firestore (document ID is `id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Always stored lower-cased
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub password_hash: String,
    pub avatar: MediaAssetRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<MediaAssetRef>,
    /// Present only while a session is live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Video IDs in viewing order
    #[serde(default)]
    pub watch_history: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// User as returned by the API. Never carries secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub fullname: String,
    /// Avatar URL
    pub avatar: String,
    /// Cover image URL, empty when none is set
    pub cover_image: String,
    pub watch_history: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            fullname: user.fullname.clone(),
            avatar: user.avatar.url.clone(),
            cover_image: user
                .cover_image
                .as_ref()
                .map(|c| c.url.clone())
                .unwrap_or_default(),
            watch_history: user.watch_history.clone(),
            created_at: user.created_at.clone(),
            updated_at: user.updated_at.clone(),
        }
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}
