//! Read-side views over the social graph: channel profiles and watch history.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// One subscription edge stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// User who subscribes
    pub subscriber: String,
    /// User being subscribed to
    pub channel: String,
    pub created_at: String,
}

/// Video document stored in Firestore (document ID is `id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    /// Duration in seconds
    pub duration: f64,
    /// Owning user ID
    pub owner: String,
}

/// Channel profile as seen by the calling user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ChannelProfile {
    pub id: String,
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub avatar: String,
    pub cover_image: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub subscribers_count: u64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub channels_subscribed_to_count: u64,
    /// Whether the caller subscribes to this channel
    pub is_subscribed: bool,
}

/// Public fields of a video's owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct VideoOwner {
    pub username: String,
    pub fullname: String,
    pub avatar: String,
}

/// One watch-history entry joined with its video and owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WatchedVideo {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub duration: f64,
    pub owner: Option<VideoOwner>,
}
