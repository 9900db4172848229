// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account lifecycle: registration, login, session refresh, logout, password
//! and profile updates, plus the read views for the calling user.

use crate::db::UserStore;
use crate::error::AppError;
use crate::ids::new_id;
use crate::models::{ChannelProfile, LocalFile, MediaAssetRef, User, UserResponse, WatchedVideo};
use crate::services::authenticator::CallerIdentity;
use crate::services::media::MediaAssetManager;
use crate::services::password::PasswordHasher;
use crate::services::token::{TokenPair, TokenService};
use crate::time_utils::now_rfc3339;
use std::sync::Arc;
use validator::Validate;

/// Registration form.
#[derive(Debug, Clone, Default, Validate)]
pub struct RegisterInput {
    pub username: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    pub password: String,
    pub fullname: String,
    pub avatar: Option<LocalFile>,
    pub cover_image: Option<LocalFile>,
}

/// Login form. One of `username` or `email` is required.
#[derive(Debug, Clone, Default)]
pub struct LoginInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password: String,
}

/// Partial account update. At least one field is required.
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateAccountInput {
    pub fullname: Option<String>,
    #[validate(email(message = "Email must be formatted."))]
    pub email: Option<String>,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserResponse,
    pub tokens: TokenPair,
}

/// Identity service composing the store, hasher, token service and media manager.
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    tokens: TokenService,
    media: MediaAssetManager,
}

/// Trim and drop empty optional strings.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        tokens: TokenService,
        media: MediaAssetManager,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            media,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn media(&self) -> &MediaAssetManager {
        &self.media
    }

    // ─── Registration & Login ────────────────────────────────────

    /// Create an account with a mandatory avatar and optional cover image.
    pub async fn register(&self, input: RegisterInput) -> Result<UserResponse, AppError> {
        let input = RegisterInput {
            username: input.username.trim().to_lowercase(),
            email: input.email.trim().to_string(),
            password: input.password,
            fullname: input.fullname.trim().to_string(),
            avatar: input.avatar,
            cover_image: input.cover_image,
        };

        if [&input.fullname, &input.email, &input.username]
            .iter()
            .any(|field| field.is_empty())
            || input.password.trim().is_empty()
        {
            return Err(AppError::Validation("All fields are required".to_string()));
        }
        input.validate()?;

        if self
            .store
            .find_by_username_or_email(Some(&input.username), Some(&input.email))
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "User with username or email already exists".to_string(),
            ));
        }

        let avatar_file = input
            .avatar
            .as_ref()
            .filter(|f| !f.bytes.is_empty())
            .ok_or_else(|| AppError::Validation("Avatar file is required".to_string()))?;

        let id = new_id()?;
        let avatar = self.media.swap(None, Some(avatar_file)).await?;

        let cover_image = match input.cover_image.as_ref().filter(|f| !f.bytes.is_empty()) {
            Some(file) => match self.media.swap(None, Some(file)).await {
                Ok(asset) => Some(asset),
                Err(e) => {
                    tracing::warn!(error = %e, "Cover image upload failed, registering without it");
                    None
                }
            },
            None => None,
        };

        let uploaded: Vec<MediaAssetRef> =
            std::iter::once(avatar.clone()).chain(cover_image.clone()).collect();

        let password_hash = match self.hasher.hash(&input.password).await {
            Ok(hash) => hash,
            Err(e) => {
                self.discard_all(&uploaded).await;
                return Err(e);
            }
        };

        let now = now_rfc3339();
        let user = User {
            id,
            username: input.username,
            email: input.email,
            fullname: input.fullname,
            password_hash,
            avatar,
            cover_image,
            refresh_token: None,
            watch_history: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        };

        if let Err(e) = self.store.insert(&user).await {
            self.discard_all(&uploaded).await;
            return Err(e);
        }

        let created = self.store.find_by_id(&user.id).await?.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "Something went wrong while registering the user"
            ))
        })?;

        tracing::info!(user_id = %created.id, username = %created.username, "User registered");

        Ok(UserResponse::from(created))
    }

    async fn discard_all(&self, assets: &[MediaAssetRef]) {
        for asset in assets {
            self.media.discard(asset).await;
        }
    }

    /// Verify credentials and start a new session.
    ///
    /// Unknown accounts and wrong passwords fail identically.
    pub async fn login(&self, input: LoginInput) -> Result<Session, AppError> {
        let username = non_empty(input.username).map(|u| u.to_lowercase());
        let email = non_empty(input.email);

        if username.is_none() && email.is_none() {
            return Err(AppError::Validation(
                "username or email is required".to_string(),
            ));
        }
        if input.password.is_empty() {
            return Err(AppError::Validation("password is required".to_string()));
        }

        let user = self
            .store
            .find_by_username_or_email(username.as_deref(), email.as_deref())
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !self.hasher.verify(&input.password, &user.password_hash).await? {
            return Err(AppError::InvalidCredentials);
        }

        let tokens = self.tokens.issue_pair(&user.id).await?;

        tracing::info!(user_id = %user.id, "User logged in");

        Ok(Session {
            user: UserResponse::from(user),
            tokens,
        })
    }

    /// End the caller's session.
    pub async fn logout(&self, caller: &CallerIdentity) -> Result<(), AppError> {
        self.tokens.revoke(&caller.id).await?;
        tracing::info!(user_id = %caller.id, "User logged out");
        Ok(())
    }

    /// Exchange a refresh token for a new pair.
    pub async fn refresh_session(&self, refresh_token: Option<&str>) -> Result<TokenPair, AppError> {
        let token = refresh_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::InvalidRefreshToken)?;

        self.tokens.rotate(token).await
    }

    // ─── Account Maintenance ─────────────────────────────────────

    async fn load_caller(&self, caller: &CallerIdentity) -> Result<User, AppError> {
        self.store
            .find_by_id(&caller.id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Current profile of the caller.
    pub async fn current_user(&self, caller: &CallerIdentity) -> Result<UserResponse, AppError> {
        Ok(UserResponse::from(self.load_caller(caller).await?))
    }

    pub async fn change_password(
        &self,
        caller: &CallerIdentity,
        input: ChangePasswordInput,
    ) -> Result<(), AppError> {
        if input.new_password.trim().is_empty() {
            return Err(AppError::Validation("New password is required".to_string()));
        }

        let user = self.load_caller(caller).await?;

        if !self
            .hasher
            .verify(&input.old_password, &user.password_hash)
            .await?
        {
            return Err(AppError::Validation("Invalid old password".to_string()));
        }

        let password_hash = self.hasher.hash(&input.new_password).await?;
        self.store
            .set_password_hash(&user.id, &password_hash)
            .await?;

        tracing::info!(user_id = %user.id, "Password changed");
        Ok(())
    }

    /// Update fullname and/or email. Writes nothing when values are unchanged.
    pub async fn update_account(
        &self,
        caller: &CallerIdentity,
        input: UpdateAccountInput,
    ) -> Result<UserResponse, AppError> {
        let input = UpdateAccountInput {
            fullname: non_empty(input.fullname),
            email: non_empty(input.email),
        };

        if input.fullname.is_none() && input.email.is_none() {
            return Err(AppError::Validation(
                "fullname or email is required".to_string(),
            ));
        }
        input.validate()?;

        let user = self.load_caller(caller).await?;

        let fullname = input.fullname.filter(|f| *f != user.fullname);
        let email = input.email.filter(|e| *e != user.email);

        if fullname.is_none() && email.is_none() {
            return Ok(UserResponse::from(user));
        }

        if let Some(email) = &email {
            let owner = self
                .store
                .find_by_username_or_email(None, Some(email))
                .await?;
            if owner.is_some_and(|o| o.id != user.id) {
                return Err(AppError::Conflict("Email is already in use".to_string()));
            }
        }

        let updated = self
            .store
            .update_details(&user.id, fullname.as_deref(), email.as_deref())
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        Ok(UserResponse::from(updated))
    }

    /// Replace the caller's avatar.
    pub async fn update_avatar(
        &self,
        caller: &CallerIdentity,
        file: Option<LocalFile>,
    ) -> Result<UserResponse, AppError> {
        let file = file.ok_or_else(|| AppError::Validation("Avatar file is missing".to_string()))?;
        let user = self.load_caller(caller).await?;

        let store = self.store.clone();
        let user_id = user.id.clone();
        self.media
            .swap_committed(Some(&file), move |asset| async move {
                store.set_avatar(&user_id, &asset).await.map(Some)
            })
            .await?;

        self.current_user(caller).await
    }

    /// Replace (or set for the first time) the caller's cover image.
    pub async fn update_cover_image(
        &self,
        caller: &CallerIdentity,
        file: Option<LocalFile>,
    ) -> Result<UserResponse, AppError> {
        let file =
            file.ok_or_else(|| AppError::Validation("Cover image file is missing".to_string()))?;
        let user = self.load_caller(caller).await?;

        let store = self.store.clone();
        let user_id = user.id.clone();
        self.media
            .swap_committed(Some(&file), move |asset| async move {
                store.set_cover_image(&user_id, Some(&asset)).await
            })
            .await?;

        self.current_user(caller).await
    }

    // ─── Read Views ──────────────────────────────────────────────

    pub async fn channel_profile(
        &self,
        caller: &CallerIdentity,
        username: &str,
    ) -> Result<ChannelProfile, AppError> {
        let username = username.trim().to_lowercase();
        if username.is_empty() {
            return Err(AppError::Validation("username is missing".to_string()));
        }

        self.store
            .channel_profile(&username, &caller.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Channel does not exist".to_string()))
    }

    pub async fn watch_history(
        &self,
        caller: &CallerIdentity,
    ) -> Result<Vec<WatchedVideo>, AppError> {
        self.store.watch_history(&caller.id).await
    }
}
