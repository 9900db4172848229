// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Registration, profile maintenance and media swap over HTTP.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use vidtube::config::Config;
use vidtube::db::UserStore;
use vidtube::models::Video;

mod common;
use common::{
    body_json, create_test_app, create_test_app_with_config, json_request, register_and_login,
    registration, send, MultipartBody, PASSWORD, USERS,
};

fn authed_json(method: &str, uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    let mut request = json_request(method, uri, body);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    request
}

fn authed_multipart(form: MultipartBody, method: &str, uri: &str, token: &str) -> Request<Body> {
    let mut request = form.request(method, uri);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    request
}

// ─── Registration ────────────────────────────────────────────

#[tokio::test]
async fn test_register_returns_sanitized_user() {
    let app = create_test_app();
    let form = MultipartBody::new()
        .text("username", "  AliceW ")
        .text("email", "alice@example.com")
        .text("password", PASSWORD)
        .text("fullname", "Alice W")
        .file("avatar", "a.png", b"avatar-bytes")
        .file("coverImage", "c.png", b"cover-bytes");

    let response = send(&app, form.request("POST", &format!("{USERS}/register"))).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    assert_eq!(json["statusCode"], 201);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["username"], "alicew");
    assert!(json["data"]["avatar"].as_str().unwrap().starts_with("memory://"));
    assert!(json["data"]["coverImage"].as_str().unwrap().starts_with("memory://"));
    assert!(json["data"].get("passwordHash").is_none());
    assert!(json["data"].get("refreshToken").is_none());
    assert_eq!(app.storage.object_count(), 2);
}

#[tokio::test]
async fn test_register_without_cover_image_has_empty_cover() {
    let app = create_test_app();
    let response = send(
        &app,
        registration("bob", "bob@example.com").request("POST", &format!("{USERS}/register")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    assert_eq!(json["data"]["coverImage"], "");
}

#[tokio::test]
async fn test_register_missing_avatar() {
    let app = create_test_app();
    let form = MultipartBody::new()
        .text("username", "carol")
        .text("email", "carol@example.com")
        .text("password", PASSWORD)
        .text("fullname", "Carol");

    let response = send(&app, form.request("POST", &format!("{USERS}/register"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.user_count(), 0);
}

#[tokio::test]
async fn test_register_blank_field() {
    let app = create_test_app();
    let form = MultipartBody::new()
        .text("username", "carol")
        .text("email", "   ")
        .text("password", PASSWORD)
        .text("fullname", "Carol")
        .file("avatar", "a.png", b"avatar");

    let response = send(&app, form.request("POST", &format!("{USERS}/register"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.storage.upload_calls(), 0);
}

#[tokio::test]
async fn test_register_duplicate_is_conflict() {
    let app = create_test_app();
    let first = send(
        &app,
        registration("dave", "dave@example.com").request("POST", &format!("{USERS}/register")),
    )
    .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = send(
        &app,
        registration("DAVE", "other@example.com").request("POST", &format!("{USERS}/register")),
    )
    .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(app.storage.object_count(), 1);
}

#[tokio::test]
async fn test_register_rejects_two_avatars() {
    let app = create_test_app();
    let form = registration("erin", "erin@example.com").file("avatar", "b.png", b"second");

    let response = send(&app, form.request("POST", &format!("{USERS}/register"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.user_count(), 0);
}

#[tokio::test]
async fn test_register_upload_failure() {
    let app = create_test_app();
    app.storage.set_fail_uploads(true);

    let response = send(
        &app,
        registration("frank", "frank@example.com").request("POST", &format!("{USERS}/register")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.user_count(), 0);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let mut config = Config::test_default();
    config.max_upload_bytes = 1024;
    let app = create_test_app_with_config(config);

    let form = registration("gina", "gina@example.com").file(
        "coverImage",
        "big.png",
        &vec![0u8; 4096],
    );
    let response = send(&app, form.request("POST", &format!("{USERS}/register"))).await;

    assert!(response.status().is_client_error());
    assert_eq!(app.store.user_count(), 0);
}

// ─── Account Maintenance ─────────────────────────────────────

#[tokio::test]
async fn test_change_password() {
    let app = create_test_app();
    let session = register_and_login(&app, "alice").await;
    let uri = format!("{USERS}/change-password");

    let wrong = send(
        &app,
        authed_json(
            "POST",
            &uri,
            &session.access_token,
            serde_json::json!({ "oldPassword": "bad", "newPassword": "fresh-password" }),
        ),
    )
    .await;
    assert_eq!(wrong.status(), StatusCode::BAD_REQUEST);

    let ok = send(
        &app,
        authed_json(
            "POST",
            &uri,
            &session.access_token,
            serde_json::json!({ "oldPassword": PASSWORD, "newPassword": "fresh-password" }),
        ),
    )
    .await;
    assert_eq!(ok.status(), StatusCode::OK);

    let login = send(
        &app,
        json_request(
            "POST",
            &format!("{USERS}/login"),
            serde_json::json!({ "username": "alice", "password": "fresh-password" }),
        ),
    )
    .await;
    assert_eq!(login.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_update_account() {
    let app = create_test_app();
    let alice = register_and_login(&app, "alice").await;
    register_and_login(&app, "bob").await;
    let uri = format!("{USERS}/update-account");

    let empty = send(
        &app,
        authed_json("PATCH", &uri, &alice.access_token, serde_json::json!({})),
    )
    .await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let taken = send(
        &app,
        authed_json(
            "PATCH",
            &uri,
            &alice.access_token,
            serde_json::json!({ "email": "bob@example.com" }),
        ),
    )
    .await;
    assert_eq!(taken.status(), StatusCode::CONFLICT);

    let updated = send(
        &app,
        authed_json(
            "PATCH",
            &uri,
            &alice.access_token,
            serde_json::json!({ "fullname": "Alice Cooper", "email": "alice.c@example.com" }),
        ),
    )
    .await;
    assert_eq!(updated.status(), StatusCode::OK);

    let json = body_json(updated).await;
    assert_eq!(json["data"]["fullname"], "Alice Cooper");
    assert_eq!(json["data"]["email"], "alice.c@example.com");
}

// ─── Media ───────────────────────────────────────────────────

#[tokio::test]
async fn test_avatar_swap_deletes_previous() {
    let app = create_test_app();
    let session = register_and_login(&app, "alice").await;
    let before = app.store.find_by_id(&session.user_id).await.unwrap().unwrap();

    let form = MultipartBody::new().file("avatar", "new.png", b"new-avatar");
    let response = send(
        &app,
        authed_multipart(form, "PATCH", &format!("{USERS}/avatar"), &session.access_token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let after = app.store.find_by_id(&session.user_id).await.unwrap().unwrap();
    assert_ne!(after.avatar, before.avatar);
    assert!(!app.storage.contains(&before.avatar.storage_id));
    assert!(app.storage.contains(&after.avatar.storage_id));

    let json = body_json(response).await;
    assert_eq!(json["data"]["avatar"], after.avatar.url);
}

#[tokio::test]
async fn test_avatar_upload_failure_leaves_user_untouched() {
    let app = create_test_app();
    let session = register_and_login(&app, "alice").await;
    let before = app.store.find_by_id(&session.user_id).await.unwrap().unwrap();
    app.storage.set_fail_uploads(true);

    let form = MultipartBody::new().file("avatar", "new.png", b"new-avatar");
    let response = send(
        &app,
        authed_multipart(form, "PATCH", &format!("{USERS}/avatar"), &session.access_token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let after = app.store.find_by_id(&session.user_id).await.unwrap().unwrap();
    assert_eq!(after.avatar, before.avatar);
    assert!(app.storage.contains(&before.avatar.storage_id));
    assert_eq!(app.storage.delete_calls(), 0);
}

#[tokio::test]
async fn test_avatar_cleanup_failure_still_succeeds() {
    let app = create_test_app();
    let session = register_and_login(&app, "alice").await;
    app.storage.set_fail_deletes(true);

    let form = MultipartBody::new().file("avatar", "new.png", b"new-avatar");
    let response = send(
        &app,
        authed_multipart(form, "PATCH", &format!("{USERS}/avatar"), &session.access_token),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.state.identity.media().cleanup_failures(), 1);
}

#[tokio::test]
async fn test_avatar_requires_file() {
    let app = create_test_app();
    let session = register_and_login(&app, "alice").await;

    let form = MultipartBody::new().text("note", "no file here");
    let response = send(
        &app,
        authed_multipart(form, "PATCH", &format!("{USERS}/avatar"), &session.access_token),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.storage.upload_calls(), 1); // registration only
}

#[tokio::test]
async fn test_cover_image_set_then_replaced() {
    let app = create_test_app();
    let session = register_and_login(&app, "alice").await;
    let uri = format!("{USERS}/cover-image");

    let first = send(
        &app,
        authed_multipart(
            MultipartBody::new().file("coverImage", "c1.png", b"cover-1"),
            "PATCH",
            &uri,
            &session.access_token,
        ),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_cover = app
        .store
        .find_by_id(&session.user_id)
        .await
        .unwrap()
        .unwrap()
        .cover_image
        .unwrap();

    let second = send(
        &app,
        authed_multipart(
            MultipartBody::new().file("coverImage", "c2.png", b"cover-2"),
            "PATCH",
            &uri,
            &session.access_token,
        ),
    )
    .await;
    assert_eq!(second.status(), StatusCode::OK);

    assert!(!app.storage.contains(&first_cover.storage_id));
    // Avatar plus current cover.
    assert_eq!(app.storage.object_count(), 2);
}

// ─── Read Views ──────────────────────────────────────────────

#[tokio::test]
async fn test_channel_profile() {
    let app = create_test_app();
    let alice = register_and_login(&app, "alice").await;
    let bob = register_and_login(&app, "bob").await;
    app.store.add_subscription(&bob.user_id, &alice.user_id);
    app.store.add_subscription(&alice.user_id, &bob.user_id);

    let response = send(
        &app,
        common::bearer_request("GET", &format!("{USERS}/c/Alice"), &bob.access_token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["username"], "alice");
    assert_eq!(json["data"]["subscribersCount"], 1);
    assert_eq!(json["data"]["channelsSubscribedToCount"], 1);
    assert_eq!(json["data"]["isSubscribed"], true);

    let missing = send(
        &app,
        common::bearer_request("GET", &format!("{USERS}/c/nobody"), &bob.access_token),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_watch_history() {
    let app = create_test_app();
    let alice = register_and_login(&app, "alice").await;
    let bob = register_and_login(&app, "bob").await;

    app.store.add_video(Video {
        id: "vid-1".to_string(),
        title: "Cats".to_string(),
        thumbnail: "memory://thumb/1".to_string(),
        duration: 61.0,
        owner: alice.user_id.clone(),
    });
    app.store.push_watch_history(&bob.user_id, "vid-1").await.unwrap();

    let response = send(
        &app,
        common::bearer_request("GET", &format!("{USERS}/history"), &bob.access_token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let history = json["data"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["title"], "Cats");
    assert_eq!(history[0]["owner"]["username"], "alice");
}
