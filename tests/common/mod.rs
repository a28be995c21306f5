#![allow(dead_code)]

use std::sync::OnceLock;

use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use unmute::config::decode_key_32;
use unmute::config::tuning::{FeedLimits, RewardRules};
use unmute::domain::post::{NewPost, Post};
use unmute::domain::user::NewUser;
use unmute::infra::storage::MediaUrls;
use unmute::store::{IdentityStore, MemoryStore};
use unmute::{AppState, Stores};

// 32 bytes base64-encoded, test-only keys.
// "0123456789abcdef0123456789abcdef"
const TEST_PASETO_ACCESS_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";
// "fedcba9876543210fedcba9876543210"
const TEST_PASETO_REFRESH_KEY: &str = "ZmVkY2JhOTg3NjU0MzIxMGZlZGNiYTk4NzY1NDMyMTA=";
const TEST_ADMIN_TOKEN: &str = "test-admin-token-12345";
pub const DEFAULT_PASSWORD: &str = "testpassword123";

/// Argon2 is slow in debug builds; hash the shared password once per binary.
fn default_password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| {
        let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
        Argon2::default()
            .hash_password(DEFAULT_PASSWORD.as_bytes(), &salt)
            .expect("password hash failed")
            .to_string()
    })
}

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: MemoryStore,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// A fresh app over its own in-memory store.
pub async fn app() -> TestApp {
    TestApp::setup(true)
}

/// An app whose sign-ups are closed.
pub async fn closed_app() -> TestApp {
    TestApp::setup(false)
}

impl TestApp {
    fn setup(early_access_open: bool) -> Self {
        let store = MemoryStore::new();
        let state = AppState {
            stores: Stores::memory(store.clone()),
            db: None,
            cache: None,
            media: MediaUrls::new("https://cdn.test/media/").expect("media base url"),
            admin_token: Some(TEST_ADMIN_TOKEN.to_string()),
            early_access_open,
            paseto_access_key: decode_key_32("PASETO_ACCESS_KEY", TEST_PASETO_ACCESS_KEY)
                .expect("access key"),
            paseto_refresh_key: decode_key_32("PASETO_REFRESH_KEY", TEST_PASETO_REFRESH_KEY)
                .expect("refresh key"),
            access_ttl_minutes: 15,
            refresh_ttl_days: 30,
            feed_limits: FeedLimits::default(),
            reward_rules: RewardRules::default(),
        };

        let router = unmute::http::router(state.clone());
        TestApp {
            router,
            state,
            store,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::GET, path, None, &headers).await
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::POST, path, Some(body), &headers).await
    }

    pub async fn patch_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::PATCH, path, Some(body), &headers).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::DELETE, path, None, &headers).await
    }

    /// POST with an admin token in the x-admin-token header.
    pub async fn post_admin(&self, path: &str, admin_token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        if let Some(t) = admin_token {
            headers.push(("x-admin-token", t));
        }
        self.request(Method::POST, path, None, &headers).await
    }

    /// Creates a user directly in the store and issues tokens for it.
    pub async fn create_user(&self, suffix: &str) -> TestUser {
        let username = format!("testuser_{}", suffix);
        let email = format!("test_{}@example.com", suffix);

        let user = self
            .store
            .create_user(NewUser {
                username: username.clone(),
                email: email.clone(),
                display_name: format!("Test User {}", suffix),
                password_hash: default_password_hash().to_string(),
            })
            .await
            .expect("insert test user failed");

        let tokens = self
            .state
            .auth_service()
            .issue_token_pair(user.id)
            .await
            .expect("issue_token_pair failed");

        TestUser {
            id: user.id,
            username,
            email,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }
    }

    /// Inserts a post with an explicit creation time, bypassing the API.
    pub fn create_post_at(&self, author_id: Uuid, post: NewPost, created_at: OffsetDateTime) -> Post {
        self.store.insert_post_at(author_id, post, created_at)
    }

    /// Serves the router on an ephemeral local port and returns its base URL.
    pub async fn serve(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("test server failed");
        });
        format!("http://{}/", addr)
    }

    pub fn admin_token(&self) -> &str {
        TEST_ADMIN_TOKEN
    }
}
