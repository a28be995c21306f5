//! Authentication Tests
//!
//! Covers sign-up, login, token rotation, logout and profile endpoints.

mod common;

use axum::http::StatusCode;
use common::{app, closed_app, DEFAULT_PASSWORD};
use serde_json::json;

// ===========================================================================
// Sign-up
// ===========================================================================

#[tokio::test]
async fn signup_creates_profile() {
    let app = app().await;

    let resp = app
        .post_json(
            "/auth/signup",
            json!({
                "username": "nova",
                "email": "Nova@Example.com",
                "password": "long-enough-pw"
            }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED);
    let body = resp.json();
    assert_eq!(body["username"], "nova");
    assert_eq!(body["display_name"], "nova");
    assert!(body.get("email").is_none());

    let login = app
        .post_json(
            "/auth/login",
            json!({ "identifier": "nova@example.com", "password": "long-enough-pw" }),
            None,
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
async fn signup_closed_early_access() {
    let app = closed_app().await;

    let resp = app
        .post_json(
            "/auth/signup",
            json!({ "username": "late", "email": "late@example.com", "password": "long-enough-pw" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.error_message(), "early access is closed");
}

#[tokio::test]
async fn signup_duplicate_username() {
    let app = app().await;
    let existing = app.create_user("dup").await;

    let resp = app
        .post_json(
            "/auth/signup",
            json!({
                "username": existing.username,
                "email": "someone-else@example.com",
                "password": "long-enough-pw"
            }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(resp.error_message(), "username already taken");
}

#[tokio::test]
async fn signup_short_password() {
    let app = app().await;

    let resp = app
        .post_json(
            "/auth/signup",
            json!({ "username": "shorty", "email": "s@example.com", "password": "short" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

// ===========================================================================
// Login
// ===========================================================================

#[tokio::test]
async fn login_valid_credentials() {
    let app = app().await;
    let user = app.create_user("login_valid").await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "identifier": user.email, "password": DEFAULT_PASSWORD }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert!(body["access_expires_at"].is_string());
    assert!(body["refresh_expires_at"].is_string());
}

#[tokio::test]
async fn login_invalid_password() {
    let app = app().await;
    let user = app.create_user("login_badpw").await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "identifier": user.username, "password": "wrong_password" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "invalid credentials");
}

#[tokio::test]
async fn login_missing_fields() {
    let app = app().await;

    let resp = app
        .post_json("/auth/login", json!({ "identifier": "", "password": "" }), None)
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

// ===========================================================================
// Token lifecycle
// ===========================================================================

#[tokio::test]
async fn refresh_rotates_and_old_token_is_rejected() {
    let app = app().await;
    let user = app.create_user("refresh").await;

    let first = app
        .post_json(
            "/auth/refresh",
            json!({ "refresh_token": user.refresh_token }),
            None,
        )
        .await;
    assert_eq!(first.status, StatusCode::OK);
    assert_ne!(first.json()["refresh_token"], user.refresh_token.as_str());

    let replay = app
        .post_json(
            "/auth/refresh",
            json!({ "refresh_token": user.refresh_token }),
            None,
        )
        .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay.error_message(), "invalid refresh token");
}

#[tokio::test]
async fn logout_revokes_refresh_token() {
    let app = app().await;
    let user = app.create_user("logout").await;

    let resp = app
        .post_json(
            "/auth/logout",
            json!({ "refresh_token": user.refresh_token }),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = app
        .post_json(
            "/auth/refresh",
            json!({ "refresh_token": user.refresh_token }),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

// ===========================================================================
// Protected routes
// ===========================================================================

#[tokio::test]
async fn me_requires_token() {
    let app = app().await;

    let resp = app.get("/auth/me", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "missing Authorization header");

    let resp = app.get("/auth/me", Some("not-a-token")).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "invalid token");
}

#[tokio::test]
async fn refresh_token_cannot_authorize_requests() {
    let app = app().await;
    let user = app.create_user("wrong_type").await;

    let resp = app.get("/auth/me", Some(&user.refresh_token)).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn update_me_is_sparse() {
    let app = app().await;
    let user = app.create_user("me_update").await;

    let resp = app
        .patch_json(
            "/auth/me",
            json!({ "bio": "making noise", "avatar_key": "avatars/me.png", "interests": ["#Music", "art"] }),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["bio"], "making noise");
    assert_eq!(body["display_name"], "Test User me_update");
    assert_eq!(body["avatar_url"], "https://cdn.test/media/avatars/me.png");
    assert_eq!(body["interests"], json!(["art", "music"]));

    let resp = app.get("/auth/me", Some(&user.access_token)).await;
    assert_eq!(resp.json()["bio"], "making noise");
}
