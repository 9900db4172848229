// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process user store for tests and local development.

use crate::db::{build_channel_profile, UserStore};
use crate::error::AppError;
use crate::models::{
    ChannelProfile, MediaAssetRef, Subscription, User, Video, VideoOwner, WatchedVideo,
};
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// User store kept entirely in memory.
#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<String, User>,
    /// Claimed usernames and emails, mapped to the owning user ID.
    usernames: DashMap<String, String>,
    emails: DashMap<String, String>,
    videos: DashMap<String, Video>,
    subscriptions: Mutex<Vec<Subscription>>,
    fail_writes: AtomicBool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a database error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn add_video(&self, video: Video) {
        self.videos.insert(video.id.clone(), video);
    }

    pub fn add_subscription(&self, subscriber: &str, channel: &str) {
        let mut subs = self
            .subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subs.push(Subscription {
            subscriber: subscriber.to_string(),
            channel: channel.to_string(),
            created_at: now_rfc3339(),
        });
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("write rejected (injected failure)".to_string()));
        }
        Ok(())
    }

    /// Apply `f` to the stored user, bumping `updated_at`.
    fn modify<T, F>(&self, id: &str, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut User) -> T,
    {
        self.check_writable()?;
        let mut user = self
            .users
            .get_mut(id)
            .ok_or_else(|| AppError::Database(format!("user {} does not exist", id)))?;
        let out = f(user.value_mut());
        user.updated_at = now_rfc3339();
        Ok(out)
    }
}

/// Claim `key` for `owner`. False when another user already holds it.
fn claim(index: &DashMap<String, String>, key: &str, owner: &str) -> bool {
    match index.entry(key.to_string()) {
        Entry::Occupied(held) => held.get() == owner,
        Entry::Vacant(slot) => {
            slot.insert(owner.to_string());
            true
        }
    }
}

fn release(index: &DashMap<String, String>, key: &str, owner: &str) {
    index.remove_if(key, |_, held| held == owner);
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .iter()
            .find(|u| {
                username.is_some_and(|name| u.username == name)
                    || email.is_some_and(|mail| u.email == mail)
            })
            .map(|u| u.value().clone()))
    }

    async fn insert(&self, user: &User) -> Result<(), AppError> {
        self.check_writable()?;

        let taken =
            || AppError::Conflict("User with username or email already exists".to_string());
        if !claim(&self.usernames, &user.username, &user.id) {
            return Err(taken());
        }
        if !claim(&self.emails, &user.email, &user.id) {
            release(&self.usernames, &user.username, &user.id);
            return Err(taken());
        }

        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<(), AppError> {
        self.modify(id, |u| u.refresh_token = token.map(str::to_string))
    }

    async fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AppError> {
        self.modify(id, |u| u.password_hash = password_hash.to_string())
    }

    async fn update_details(
        &self,
        id: &str,
        fullname: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AppError> {
        let Some(current_email) = self.users.get(id).map(|u| u.email.clone()) else {
            return Ok(None);
        };

        let new_email = email.filter(|e| *e != current_email);
        if let Some(new_email) = new_email {
            self.check_writable()?;
            if !claim(&self.emails, new_email, id) {
                return Err(AppError::Conflict("Email is already in use".to_string()));
            }
        }

        let written = self.modify(id, |u| {
            if let Some(fullname) = fullname {
                u.fullname = fullname.to_string();
            }
            if let Some(email) = new_email {
                u.email = email.to_string();
            }
        });

        match (written, new_email) {
            (Err(e), Some(new_email)) => {
                release(&self.emails, new_email, id);
                return Err(e);
            }
            (Err(e), None) => return Err(e),
            (Ok(()), Some(_)) => release(&self.emails, &current_email, id),
            (Ok(()), None) => {}
        }

        self.find_by_id(id).await
    }

    async fn set_avatar(
        &self,
        id: &str,
        avatar: &MediaAssetRef,
    ) -> Result<MediaAssetRef, AppError> {
        self.modify(id, |u| std::mem::replace(&mut u.avatar, avatar.clone()))
    }

    async fn set_cover_image(
        &self,
        id: &str,
        cover_image: Option<&MediaAssetRef>,
    ) -> Result<Option<MediaAssetRef>, AppError> {
        self.modify(id, |u| std::mem::replace(&mut u.cover_image, cover_image.cloned()))
    }

    async fn push_watch_history(&self, id: &str, video_id: &str) -> Result<(), AppError> {
        self.modify(id, |u| u.watch_history.push(video_id.to_string()))
    }

    async fn channel_profile(
        &self,
        username: &str,
        viewer_id: &str,
    ) -> Result<Option<ChannelProfile>, AppError> {
        let Some(user) = self.find_by_username_or_email(Some(username), None).await? else {
            return Ok(None);
        };

        let subs = self
            .subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let subscribers = subs.iter().filter(|s| s.channel == user.id).count() as u64;
        let subscribed_to = subs.iter().filter(|s| s.subscriber == user.id).count() as u64;
        let is_subscribed = subs
            .iter()
            .any(|s| s.channel == user.id && s.subscriber == viewer_id);

        Ok(Some(build_channel_profile(
            &user,
            subscribers,
            subscribed_to,
            is_subscribed,
        )))
    }

    async fn watch_history(&self, id: &str) -> Result<Vec<WatchedVideo>, AppError> {
        let Some(user) = self.find_by_id(id).await? else {
            return Ok(Vec::new());
        };

        let history = user
            .watch_history
            .iter()
            .filter_map(|video_id| self.videos.get(video_id).map(|v| v.value().clone()))
            .map(|video| {
                let owner = self.users.get(&video.owner).map(|o| VideoOwner {
                    username: o.username.clone(),
                    fullname: o.fullname.clone(),
                    avatar: o.avatar.url.clone(),
                });
                WatchedVideo {
                    id: video.id,
                    title: video.title,
                    thumbnail: video.thumbnail,
                    duration: video.duration,
                    owner,
                }
            })
            .collect();

        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, username: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            fullname: "Test User".to_string(),
            password_hash: "x".to_string(),
            avatar: MediaAssetRef {
                url: format!("memory://{id}"),
                storage_id: format!("avatar-{id}"),
            },
            cover_image: None,
            refresh_token: None,
            watch_history: Vec::new(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_taken_username_or_email() {
        let store = MemoryUserStore::new();
        store.insert(&user("u1", "alice", "alice@example.com")).await.unwrap();

        let same_name = store.insert(&user("u2", "alice", "other@example.com")).await;
        assert!(matches!(same_name, Err(AppError::Conflict(_))));

        let same_email = store.insert(&user("u3", "carol", "alice@example.com")).await;
        assert!(matches!(same_email, Err(AppError::Conflict(_))));

        // The rejected insert released its username claim.
        store.insert(&user("u4", "carol", "carol@example.com")).await.unwrap();
        assert_eq!(store.user_count(), 2);
    }

    #[tokio::test]
    async fn test_email_change_moves_claim() {
        let store = MemoryUserStore::new();
        store.insert(&user("u1", "alice", "alice@example.com")).await.unwrap();
        store.insert(&user("u2", "bob", "bob@example.com")).await.unwrap();

        let taken = store.update_details("u1", None, Some("bob@example.com")).await;
        assert!(matches!(taken, Err(AppError::Conflict(_))));

        let updated = store
            .update_details("u1", None, Some("new@example.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.email, "new@example.com");

        // The old address is free again.
        store.insert(&user("u3", "carol", "alice@example.com")).await.unwrap();
        let stolen = store.insert(&user("u4", "dave", "new@example.com")).await;
        assert!(matches!(stolen, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_failed_email_change_releases_claim() {
        let store = MemoryUserStore::new();
        store.insert(&user("u1", "alice", "alice@example.com")).await.unwrap();

        store.set_fail_writes(true);
        let result = store.update_details("u1", None, Some("new@example.com")).await;
        assert!(matches!(result, Err(AppError::Database(_))));
        store.set_fail_writes(false);

        store.insert(&user("u2", "bob", "new@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_media_setters_return_replaced_reference() {
        let store = MemoryUserStore::new();
        let original = user("u1", "alice", "alice@example.com");
        store.insert(&original).await.unwrap();

        let next = MediaAssetRef {
            url: "memory://next".to_string(),
            storage_id: "next".to_string(),
        };
        let replaced = store.set_avatar("u1", &next).await.unwrap();
        assert_eq!(replaced, original.avatar);
        assert_eq!(store.set_avatar("u1", &next).await.unwrap(), next);

        assert_eq!(store.set_cover_image("u1", Some(&next)).await.unwrap(), None);
        assert_eq!(
            store.set_cover_image("u1", None).await.unwrap(),
            Some(next.clone())
        );
    }
}
