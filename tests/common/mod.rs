// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use std::sync::Arc;
use tower::ServiceExt;
use vidtube::config::Config;
use vidtube::db::{FirestoreUserStore, MemoryUserStore};
use vidtube::routes::create_router;
use vidtube::services::MemoryStorage;
use vidtube::AppState;

pub const USERS: &str = "/api/v1/users";
pub const PASSWORD: &str = "correct horse battery";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a Firestore user store against the emulator.
#[allow(dead_code)]
pub async fn test_firestore() -> FirestoreUserStore {
    FirestoreUserStore::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// In-memory app plus handles for inspecting and breaking its backends.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryUserStore>,
    pub storage: Arc<MemoryStorage>,
}

/// Create a test app backed by in-memory user and object stores.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> TestApp {
    let store = Arc::new(MemoryUserStore::new());
    let storage = Arc::new(MemoryStorage::new());
    let state = Arc::new(AppState::new(config, store.clone(), storage.clone()).unwrap());

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        storage,
    }
}

const BOUNDARY: &str = "vidtube-test-boundary";

/// Builder for `multipart/form-data` request bodies.
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

#[allow(dead_code)]
impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn request(mut self, method: &str, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

/// Registration form with an avatar and the shared test password.
#[allow(dead_code)]
pub fn registration(username: &str, email: &str) -> MultipartBody {
    MultipartBody::new()
        .text("username", username)
        .text("email", email)
        .text("password", PASSWORD)
        .text("fullname", "Test User")
        .file("avatar", "avatar.png", b"\x89PNG avatar")
}

#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[allow(dead_code)]
pub fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

#[allow(dead_code)]
pub async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

#[allow(dead_code)]
pub fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}

/// Tokens returned by a successful login.
#[allow(dead_code)]
pub struct LoggedIn {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// Register `username` and log in, returning the issued tokens.
#[allow(dead_code)]
pub async fn register_and_login(app: &TestApp, username: &str) -> LoggedIn {
    let email = format!("{username}@example.com");
    let response = send(
        app,
        registration(username, &email).request("POST", &format!("{USERS}/register")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(
        app,
        json_request(
            "POST",
            &format!("{USERS}/login"),
            serde_json::json!({ "username": username, "password": PASSWORD }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    LoggedIn {
        user_id: json["data"]["user"]["id"].as_str().unwrap().to_string(),
        access_token: json["data"]["accessToken"].as_str().unwrap().to_string(),
        refresh_token: json["data"]["refreshToken"].as_str().unwrap().to_string(),
    }
}
