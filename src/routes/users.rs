// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User account and session routes.

use crate::error::{AppError, Result};
use crate::middleware::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::models::{ChannelProfile, LocalFile, UserResponse, WatchedVideo};
use crate::services::{
    CallerIdentity, ChangePasswordInput, LoginInput, RegisterInput, TokenPair, UpdateAccountInput,
};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Routes reachable without a session.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
}

/// Routes requiring an access token.
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/logout", post(logout))
        .route("/change-password", post(change_password))
        .route("/current-user", get(current_user))
        .route("/update-account", patch(update_account))
        .route("/avatar", patch(update_avatar))
        .route("/cover-image", patch(update_cover_image))
        .route("/c/{username}", get(channel_profile))
        .route("/history", get(watch_history))
}

// ─── Response Envelope ───────────────────────────────────────

/// Success envelope shared by every endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

fn reply<T: Serialize>(status: StatusCode, data: T, message: &str) -> Reply<T> {
    (
        status,
        Json(ApiResponse {
            status_code: status.as_u16(),
            data,
            message: message.to_string(),
            success: status.is_success(),
        }),
    )
}

/// Empty `data` object.
#[derive(Serialize)]
pub struct Empty {}

/// Map a JSON body rejection onto the API's validation error.
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

// ─── Multipart ───────────────────────────────────────────────

/// Text fields and files of a multipart form. At most one file per field.
#[derive(Default)]
struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, LocalFile>,
}

impl MultipartForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("Malformed multipart body: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(|e| {
                        AppError::Validation(format!("Failed to read file '{}': {}", name, e))
                    })?;
                    if form.files.contains_key(&name) {
                        return Err(AppError::Validation(format!(
                            "Only one file is allowed for '{}'",
                            name
                        )));
                    }
                    form.files.insert(
                        name,
                        LocalFile::new(file_name, content_type, bytes.to_vec()),
                    );
                }
                None => {
                    let text = field.text().await.map_err(|e| {
                        AppError::Validation(format!("Failed to read field '{}': {}", name, e))
                    })?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    fn text(&mut self, name: &str) -> String {
        self.fields.remove(name).unwrap_or_default()
    }

    fn file(&mut self, name: &str) -> Option<LocalFile> {
        self.files.remove(name)
    }
}

// ─── Session Cookies ─────────────────────────────────────────

fn session_cookie(name: &'static str, value: String, ttl: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::seconds(ttl.as_secs() as i64))
        .build()
}

fn with_session_cookies(state: &AppState, jar: CookieJar, tokens: &TokenPair) -> CookieJar {
    let secure = state.config.cookie_secure;
    let service = state.identity.tokens();
    jar.add(session_cookie(
        ACCESS_TOKEN_COOKIE,
        tokens.access_token.clone(),
        service.access_ttl(),
        secure,
    ))
    .add(session_cookie(
        REFRESH_TOKEN_COOKIE,
        tokens.refresh_token.clone(),
        service.refresh_ttl(),
        secure,
    ))
}

/// Expire both session cookies, whether or not the client sent them.
fn without_session_cookies(state: &AppState, jar: CookieJar) -> CookieJar {
    let secure = state.config.cookie_secure;
    [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE]
        .into_iter()
        .fold(jar, |jar, name| {
            let mut cookie = session_cookie(name, String::new(), Duration::ZERO, secure);
            cookie.make_removal();
            jar.add(cookie)
        })
}

// ─── Registration & Session ──────────────────────────────────

async fn register(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Reply<UserResponse>> {
    let mut form = MultipartForm::read(multipart).await?;

    let input = RegisterInput {
        username: form.text("username"),
        email: form.text("email"),
        password: form.text("password"),
        fullname: form.text("fullname"),
        avatar: form.file("avatar"),
        cover_image: form.file("coverImage"),
    };

    let user = state.identity.register(input).await?;

    Ok(reply(
        StatusCode::CREATED,
        user,
        "User registered successfully",
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: String,
}

/// Login payload returned alongside the session cookies.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Reply<LoginResponse>)> {
    let body = json_body(payload)?;

    let session = state
        .identity
        .login(LoginInput {
            username: body.username,
            email: body.email,
            password: body.password,
        })
        .await?;

    let jar = with_session_cookies(&state, jar, &session.tokens);

    Ok((
        jar,
        reply(
            StatusCode::OK,
            LoginResponse {
                user: session.user,
                access_token: session.tokens.access_token,
                refresh_token: session.tokens.refresh_token,
            },
            "User logged in successfully",
        ),
    ))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    jar: CookieJar,
) -> Result<(CookieJar, Reply<Empty>)> {
    state.identity.logout(&caller).await?;

    Ok((
        without_session_cookies(&state, jar),
        reply(StatusCode::OK, Empty {}, "User logged out"),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Rotated token pair.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Rotate the session. The cookie wins over a token in the body.
async fn refresh_token(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Reply<RefreshResponse>)> {
    let presented = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| {
            serde_json::from_slice::<RefreshRequest>(&body)
                .ok()
                .and_then(|req| req.refresh_token)
        });

    let tokens = state
        .identity
        .refresh_session(presented.as_deref())
        .await?;

    let jar = with_session_cookies(&state, jar, &tokens);

    Ok((
        jar,
        reply(
            StatusCode::OK,
            RefreshResponse {
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
            },
            "Access token refreshed",
        ),
    ))
}

// ─── Account Maintenance ─────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    #[serde(default)]
    old_password: String,
    #[serde(default)]
    new_password: String,
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    payload: std::result::Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Reply<Empty>> {
    let body = json_body(payload)?;

    state
        .identity
        .change_password(
            &caller,
            ChangePasswordInput {
                old_password: body.old_password,
                new_password: body.new_password,
            },
        )
        .await?;

    Ok(reply(StatusCode::OK, Empty {}, "Password changed successfully"))
}

async fn current_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Reply<UserResponse>> {
    let user = state.identity.current_user(&caller).await?;
    Ok(reply(StatusCode::OK, user, "Current user fetched successfully"))
}

#[derive(Deserialize)]
struct UpdateAccountRequest {
    #[serde(default)]
    fullname: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

async fn update_account(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    payload: std::result::Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> Result<Reply<UserResponse>> {
    let body = json_body(payload)?;

    let user = state
        .identity
        .update_account(
            &caller,
            UpdateAccountInput {
                fullname: body.fullname,
                email: body.email,
            },
        )
        .await?;

    Ok(reply(
        StatusCode::OK,
        user,
        "Account details updated successfully",
    ))
}

async fn update_avatar(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    multipart: Multipart,
) -> Result<Reply<UserResponse>> {
    let mut form = MultipartForm::read(multipart).await?;

    let user = state
        .identity
        .update_avatar(&caller, form.file("avatar"))
        .await?;

    Ok(reply(StatusCode::OK, user, "Avatar updated successfully"))
}

async fn update_cover_image(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    multipart: Multipart,
) -> Result<Reply<UserResponse>> {
    let mut form = MultipartForm::read(multipart).await?;

    let user = state
        .identity
        .update_cover_image(&caller, form.file("coverImage"))
        .await?;

    Ok(reply(StatusCode::OK, user, "Cover image updated successfully"))
}

// ─── Read Views ──────────────────────────────────────────────

async fn channel_profile(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Path(username): Path<String>,
) -> Result<Reply<ChannelProfile>> {
    let profile = state.identity.channel_profile(&caller, &username).await?;
    Ok(reply(
        StatusCode::OK,
        profile,
        "User channel fetched successfully",
    ))
}

async fn watch_history(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Reply<Vec<WatchedVideo>>> {
    let history = state.identity.watch_history(&caller).await?;
    Ok(reply(
        StatusCode::OK,
        history,
        "Watch history fetched successfully",
    ))
}
