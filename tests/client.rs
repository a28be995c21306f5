//! Client Tests
//!
//! Drives `ApiClient` against the real router served over TCP.

mod common;

use common::{app, closed_app, DEFAULT_PASSWORD};
use time::{Duration, OffsetDateTime};
use unmute::app::feed::FeedMode;
use unmute::client::feed_session::{FeedQuery, FeedSession, FeedSource, FeedState};
use unmute::client::http::ApiClient;
use unmute::client::session::{AuthBackend, SessionProvider, SignUpRequest};
use unmute::client::{ClientError, RetryPolicy};
use unmute::domain::post::{NewPost, PostContent, TextContent};

fn text(body: &str) -> NewPost {
    NewPost::new(PostContent::Text(TextContent {
        body: body.to_string(),
        title: None,
        mood: None,
    }))
}

#[tokio::test]
async fn trending_feed_round_trips() {
    let app = app().await;
    let author = app.create_user("author").await;
    let now = OffsetDateTime::now_utc();
    let older = app.create_post_at(author.id, text("older"), now - Duration::minutes(5));
    let newer = app.create_post_at(author.id, text("newer"), now - Duration::minutes(1));

    let client = ApiClient::new(&app.serve().await).unwrap();
    let page = client
        .fetch_feed(&FeedQuery::first_page(FeedMode::Trending, 10))
        .await
        .unwrap();

    assert_eq!(page.mode, FeedMode::Trending);
    assert_eq!(page.offset, 0);
    let ids: Vec<_> = page.items.iter().map(|post| post.id).collect();
    assert!(ids.contains(&older.id));
    assert!(ids.contains(&newer.id));
    assert!(page.items.iter().all(|post| post.author.id == author.id));
}

#[tokio::test]
async fn following_feed_uses_the_bearer_token() {
    let app = app().await;
    let viewer = app.create_user("viewer").await;
    let base = app.serve().await;

    let anonymous = ApiClient::new(&base).unwrap();
    let err = anonymous
        .fetch_feed(&FeedQuery::first_page(FeedMode::Following, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));

    let signed_in = ApiClient::new(&base)
        .unwrap()
        .with_access_token(viewer.access_token.clone());
    let page = signed_in
        .fetch_feed(&FeedQuery::first_page(FeedMode::Following, 10))
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.next_offset, None);
}

#[tokio::test]
async fn bad_access_token_maps_to_unauthorized() {
    let app = app().await;
    let client = ApiClient::new(&app.serve().await).unwrap();

    let err = client.fetch_profile("not-a-token").await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));
}

#[tokio::test]
async fn wrong_password_maps_to_unauthorized() {
    let app = app().await;
    let user = app.create_user("wrongpass").await;
    let client = ApiClient::new(&app.serve().await).unwrap();

    let err = client
        .sign_in(&user.username, "definitely-wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));
}

#[tokio::test]
async fn closed_signups_map_to_early_access_closed() {
    let app = closed_app().await;
    let client = ApiClient::new(&app.serve().await).unwrap();

    let err = client
        .sign_up(&SignUpRequest {
            username: "latecomer".to_string(),
            email: "latecomer@example.com".to_string(),
            display_name: None,
            password: DEFAULT_PASSWORD.to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::EarlyAccessClosed));
}

#[tokio::test]
async fn validation_errors_keep_status_and_message() {
    let app = app().await;
    let client = ApiClient::new(&app.serve().await).unwrap();

    let err = client
        .fetch_feed(&FeedQuery {
            limit: 0,
            ..FeedQuery::first_page(FeedMode::Trending, 10)
        })
        .await
        .unwrap_err();
    match err {
        ClientError::Status { status, message } => {
            assert_eq!(status, 400);
            assert!(!message.is_empty());
        }
        other => panic!("expected a status error, got {:?}", other),
    }
}

#[tokio::test]
async fn session_provider_signs_in_through_the_api() {
    let app = app().await;
    let user = app.create_user("session").await;
    let client = ApiClient::new(&app.serve().await).unwrap();

    let provider = SessionProvider::new(client);
    let context = provider
        .sign_in(&user.username, DEFAULT_PASSWORD)
        .await
        .unwrap();
    assert!(context.is_signed_in());
    assert_eq!(
        context.profile.map(|profile| profile.username),
        Some(user.username.clone())
    );

    provider.sign_out().await.unwrap();
    assert!(!provider.context().is_signed_in());
}

#[tokio::test]
async fn feed_session_pages_through_the_api() {
    let app = app().await;
    let author = app.create_user("pager").await;
    let now = OffsetDateTime::now_utc();
    for i in 0..5 {
        app.create_post_at(
            author.id,
            text(&format!("post {}", i)),
            now - Duration::minutes(i),
        );
    }

    let client = ApiClient::new(&app.serve().await).unwrap();
    let session = FeedSession::new(client, RetryPolicy::default());
    let first = session.load(FeedQuery::first_page(FeedMode::Trending, 3)).await.unwrap();
    assert_eq!(first.items.len(), 3);
    assert_eq!(first.next_offset, Some(3));
    assert!(matches!(session.state(), FeedState::Ready(_)));
}
