// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed user store.
//!
//! Provides typed operations for:
//! - Users (identity, credentials, media references, session token)
//! - Username and email claims, written with the user so both stay unique
//! - Subscriptions and videos (read-only, for profile and history views)

use crate::db::{build_channel_profile, collections, UserStore};
use crate::error::AppError;
use crate::models::{
    ChannelProfile, MediaAssetRef, Subscription, User, Video, VideoOwner, WatchedVideo,
};
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::{
    paths, FirestoreConsistencySelector, FirestoreDb, FirestoreTransaction,
    FirestoreWritePrecondition,
};
use serde::{Deserialize, Serialize};

const USER_TAKEN: &str = "User with username or email already exists";
const EMAIL_TAKEN: &str = "Email is already in use";

/// Marks a username or email as belonging to one user.
#[derive(Debug, Serialize, Deserialize)]
struct IdentityClaim {
    user_id: String,
}

/// Claim document ID. Hex encoded, since emails may contain `/`.
fn claim_id(value: &str) -> String {
    hex::encode(value.as_bytes())
}

async fn begin_transaction(client: &FirestoreDb) -> Result<FirestoreTransaction<'_>, AppError> {
    client
        .begin_transaction()
        .await
        .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))
}

/// Add a claim that only succeeds if nobody holds `value` yet.
fn add_claim(
    client: &FirestoreDb,
    transaction: &mut FirestoreTransaction<'_>,
    collection: &str,
    value: &str,
    claim: &IdentityClaim,
) -> Result<(), AppError> {
    client
        .fluent()
        .update()
        .in_col(collection)
        .precondition(FirestoreWritePrecondition::Exists(false))
        .document_id(claim_id(value))
        .object(claim)
        .add_to_transaction(transaction)
        .map_err(|e| AppError::Database(format!("Failed to add claim to transaction: {}", e)))?;
    Ok(())
}

/// A failed `Exists(false)` precondition means the value is already claimed.
fn commit_error(e: FirestoreError, conflict: &str) -> AppError {
    match e {
        FirestoreError::DataConflictError(_) => AppError::Conflict(conflict.to_string()),
        FirestoreError::DatabaseError(ref db) if db.public.code == "FailedPrecondition" => {
            AppError::Conflict(conflict.to_string())
        }
        other => AppError::Database(format!("Transaction commit failed: {}", other)),
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreUserStore {
    client: Option<FirestoreDb>,
}

impl FirestoreUserStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client. All operations return a database error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Fetch the user or fail; partial writes always start from the stored document.
    async fn load_for_update(&self, id: &str) -> Result<User, AppError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Database(format!("user {} does not exist", id)))
    }

    /// Read a user as part of `transaction`, so the commit fails if the
    /// document changed in between.
    async fn load_in_transaction(
        &self,
        transaction: &FirestoreTransaction<'_>,
        id: &str,
    ) -> Result<User, AppError> {
        let user: Option<User> = self
            .get_client()?
            .clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ))
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        user.ok_or_else(|| AppError::Database(format!("user {} does not exist", id)))
    }

    async fn find_one_by_field(
        &self,
        field: &'static str,
        value: &str,
    ) -> Result<Option<User>, AppError> {
        let value = value.to_string();
        let mut users: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.for_all([q.field(field).eq(value.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(users.pop())
    }

    async fn subscriptions_where(
        &self,
        field: &'static str,
        user_id: &str,
    ) -> Result<Vec<Subscription>, AppError> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::SUBSCRIPTIONS)
            .filter(move |q| q.for_all([q.field(field).eq(user_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[async_trait]
impl UserStore for FirestoreUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AppError> {
        if let Some(username) = username {
            if let Some(user) = self.find_one_by_field("username", username).await? {
                return Ok(Some(user));
            }
        }
        if let Some(email) = email {
            return self.find_one_by_field("email", email).await;
        }
        Ok(None)
    }

    async fn insert(&self, user: &User) -> Result<(), AppError> {
        let client = self.get_client()?;
        let claim = IdentityClaim {
            user_id: user.id.clone(),
        };

        // Claims and the user document commit together or not at all.
        let mut transaction = begin_transaction(client).await?;
        add_claim(client, &mut transaction, collections::USERNAMES, &user.username, &claim)?;
        add_claim(client, &mut transaction, collections::EMAILS, &user.email, &claim)?;
        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(&user.id)
            .object(user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add user to transaction: {}", e)))?;

        transaction
            .commit()
            .await
            .map_err(|e| commit_error(e, USER_TAKEN))?;
        Ok(())
    }

    async fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<(), AppError> {
        let mut user = self.load_for_update(id).await?;
        // None is skipped on serialization, so the masked field is removed.
        user.refresh_token = token.map(str::to_string);
        user.updated_at = now_rfc3339();

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(User::{refresh_token, updated_at}))
            .in_col(collections::USERS)
            .document_id(id)
            .object(&user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AppError> {
        let mut user = self.load_for_update(id).await?;
        user.password_hash = password_hash.to_string();
        user.updated_at = now_rfc3339();

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(User::{password_hash, updated_at}))
            .in_col(collections::USERS)
            .document_id(id)
            .object(&user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn update_details(
        &self,
        id: &str,
        fullname: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AppError> {
        let Some(mut user) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let previous_email = user.email.clone();
        if let Some(fullname) = fullname {
            user.fullname = fullname.to_string();
        }
        if let Some(email) = email {
            user.email = email.to_string();
        }
        user.updated_at = now_rfc3339();

        let client = self.get_client()?;
        let mut transaction = begin_transaction(client).await?;

        // An email change moves the claim along with the field.
        if user.email != previous_email {
            let claim = IdentityClaim {
                user_id: id.to_string(),
            };
            add_claim(client, &mut transaction, collections::EMAILS, &user.email, &claim)?;
            client
                .fluent()
                .delete()
                .from(collections::EMAILS)
                .document_id(claim_id(&previous_email))
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to release email claim: {}", e))
                })?;
        }

        client
            .fluent()
            .update()
            .fields(paths!(User::{fullname, email, updated_at}))
            .in_col(collections::USERS)
            .document_id(id)
            .object(&user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add user to transaction: {}", e)))?;

        transaction
            .commit()
            .await
            .map_err(|e| commit_error(e, EMAIL_TAKEN))?;
        Ok(Some(user))
    }

    async fn set_avatar(
        &self,
        id: &str,
        avatar: &MediaAssetRef,
    ) -> Result<MediaAssetRef, AppError> {
        let client = self.get_client()?;
        let mut transaction = begin_transaction(client).await?;

        let mut user = self.load_in_transaction(&transaction, id).await?;
        let previous = std::mem::replace(&mut user.avatar, avatar.clone());
        user.updated_at = now_rfc3339();

        client
            .fluent()
            .update()
            .fields(paths!(User::{avatar, updated_at}))
            .in_col(collections::USERS)
            .document_id(id)
            .object(&user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add user to transaction: {}", e)))?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;
        Ok(previous)
    }

    async fn set_cover_image(
        &self,
        id: &str,
        cover_image: Option<&MediaAssetRef>,
    ) -> Result<Option<MediaAssetRef>, AppError> {
        let client = self.get_client()?;
        let mut transaction = begin_transaction(client).await?;

        let mut user = self.load_in_transaction(&transaction, id).await?;
        let previous = std::mem::replace(&mut user.cover_image, cover_image.cloned());
        user.updated_at = now_rfc3339();

        client
            .fluent()
            .update()
            .fields(paths!(User::{cover_image, updated_at}))
            .in_col(collections::USERS)
            .document_id(id)
            .object(&user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add user to transaction: {}", e)))?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;
        Ok(previous)
    }

    async fn push_watch_history(&self, id: &str, video_id: &str) -> Result<(), AppError> {
        let mut user = self.load_for_update(id).await?;
        user.watch_history.push(video_id.to_string());
        user.updated_at = now_rfc3339();

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(User::{watch_history, updated_at}))
            .in_col(collections::USERS)
            .document_id(id)
            .object(&user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn channel_profile(
        &self,
        username: &str,
        viewer_id: &str,
    ) -> Result<Option<ChannelProfile>, AppError> {
        let Some(user) = self.find_one_by_field("username", username).await? else {
            return Ok(None);
        };

        let subscribers = self.subscriptions_where("channel", &user.id).await?;
        let subscribed_to = self.subscriptions_where("subscriber", &user.id).await?;
        let is_subscribed = subscribers.iter().any(|s| s.subscriber == viewer_id);

        Ok(Some(build_channel_profile(
            &user,
            subscribers.len() as u64,
            subscribed_to.len() as u64,
            is_subscribed,
        )))
    }

    async fn watch_history(&self, id: &str) -> Result<Vec<WatchedVideo>, AppError> {
        let Some(user) = self.find_by_id(id).await? else {
            return Ok(Vec::new());
        };

        let mut history = Vec::with_capacity(user.watch_history.len());
        for video_id in &user.watch_history {
            let video: Option<Video> = self
                .get_client()?
                .fluent()
                .select()
                .by_id_in(collections::VIDEOS)
                .obj()
                .one(video_id)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            // Deleted videos drop out of the history view.
            let Some(video) = video else { continue };

            let owner = self.find_by_id(&video.owner).await?.map(|o| VideoOwner {
                username: o.username,
                fullname: o.fullname,
                avatar: o.avatar.url,
            });

            history.push(WatchedVideo {
                id: video.id,
                title: video.title,
                thumbnail: video.thumbnail,
                duration: video.duration,
                owner,
            });
        }

        Ok(history)
    }
}
