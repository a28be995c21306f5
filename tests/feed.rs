//! Feed Tests
//!
//! Exercises every feed mode through the HTTP surface against the in-memory store.

mod common;

use axum::http::StatusCode;
use common::{app, TestApp, TestUser};
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};
use unmute::domain::post::{
    ImageContent, NewPost, PostContent, ReelContent, TextContent,
};

fn text(body: &str) -> NewPost {
    NewPost::new(PostContent::Text(TextContent {
        body: body.to_string(),
        title: None,
        mood: None,
    }))
}

fn image(url: &str) -> NewPost {
    NewPost::new(PostContent::Image(ImageContent {
        image_urls: vec![url.to_string()],
        caption: None,
    }))
}

fn reel(video: &str, audio: Option<&str>) -> NewPost {
    NewPost::new(PostContent::Reel(ReelContent {
        video_url: video.to_string(),
        thumbnail_url: None,
        audio_url: audio.map(str::to_string),
        audio_type: None,
        duration_seconds: None,
        original_volume: None,
        audio_volume: None,
        allow_comments: true,
        allow_duets: true,
        vibe: None,
    }))
}

async fn follow(app: &TestApp, follower: &TestUser, target: &TestUser) {
    let resp = app
        .post_json(
            &format!("/users/{}/follow", target.id),
            json!({}),
            Some(&follower.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
}

fn kinds(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["kind"].as_str().unwrap().to_string())
        .collect()
}

// ===========================================================================
// Following
// ===========================================================================

#[tokio::test]
async fn following_merges_kinds_newest_first() {
    let app = app().await;
    let a = app.create_user("feed_a").await;
    let b = app.create_user("feed_b").await;
    let c = app.create_user("feed_c").await;
    let stranger = app.create_user("feed_stranger").await;
    follow(&app, &a, &b).await;
    follow(&app, &a, &c).await;

    let now = OffsetDateTime::now_utc();
    app.create_post_at(b.id, text("oldest"), now - Duration::minutes(30));
    app.create_post_at(c.id, image("pic.jpg"), now - Duration::minutes(20));
    app.create_post_at(b.id, text("newest"), now - Duration::minutes(10));
    app.create_post_at(stranger.id, text("not followed"), now);

    let resp = app.get("/feed/following", Some(&a.access_token)).await;
    assert_eq!(resp.status, StatusCode::OK);
    let page = resp.json();
    assert_eq!(page["mode"], "following");
    assert_eq!(page["ordering"], "recency");
    assert_eq!(kinds(&page), vec!["text", "image", "text"]);
    assert_eq!(page["items"][0]["body"], "newest");
    assert_eq!(page["items"][2]["body"], "oldest");
    assert!(page["next_offset"].is_null());
}

#[tokio::test]
async fn following_with_nobody_followed_is_empty() {
    let app = app().await;
    let loner = app.create_user("feed_loner").await;
    let other = app.create_user("feed_other").await;
    app.create_post_at(other.id, text("hi"), OffsetDateTime::now_utc());

    let resp = app.get("/feed/following", Some(&loner.access_token)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["items"], json!([]));
}

#[tokio::test]
async fn following_requires_sign_in() {
    let app = app().await;

    let resp = app.get("/feed/following", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "sign in to view this feed");
}

#[tokio::test]
async fn following_paginates() {
    let app = app().await;
    let reader = app.create_user("feed_reader").await;
    let writer = app.create_user("feed_writer").await;
    follow(&app, &reader, &writer).await;

    let now = OffsetDateTime::now_utc();
    for i in 0..25 {
        app.create_post_at(
            writer.id,
            text(&format!("post {}", i)),
            now - Duration::minutes(i),
        );
    }

    let first = app
        .get("/feed/following?limit=10", Some(&reader.access_token))
        .await
        .json();
    assert_eq!(first["items"].as_array().unwrap().len(), 10);
    assert_eq!(first["items"][0]["body"], "post 0");
    assert_eq!(first["next_offset"], 10);

    let last = app
        .get("/feed/following?offset=20&limit=10", Some(&reader.access_token))
        .await
        .json();
    assert_eq!(last["items"].as_array().unwrap().len(), 5);
    assert_eq!(last["items"][4]["body"], "post 24");
    assert!(last["next_offset"].is_null());
}

// ===========================================================================
// Request validation
// ===========================================================================

#[tokio::test]
async fn unknown_mode_rejected() {
    let app = app().await;

    let resp = app.get("/feed/sideways", None).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "unknown feed mode: sideways");
}

#[tokio::test]
async fn limit_bounds() {
    let app = app().await;

    assert_eq!(
        app.get("/feed/trending?limit=0", None).await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        app.get("/feed/trending?limit=101", None).await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        app.get("/feed/trending?limit=100", None).await.status,
        StatusCode::OK
    );
    assert_eq!(
        app.get("/feed/trending?offset=-1", None).await.status,
        StatusCode::BAD_REQUEST
    );
}

// ===========================================================================
// Trending / discovery
// ===========================================================================

#[tokio::test]
async fn trending_falls_back_to_recency() {
    let app = app().await;
    let author = app.create_user("feed_trend").await;
    let now = OffsetDateTime::now_utc();
    app.create_post_at(author.id, text("older"), now - Duration::hours(1));
    app.create_post_at(author.id, text("newer"), now);

    let page = app.get("/feed/trending", None).await.json();
    assert_eq!(page["ordering"], "recency");
    assert_eq!(page["items"][0]["body"], "newer");
}

#[tokio::test]
async fn music_only_returns_reels_with_audio() {
    let app = app().await;
    let author = app.create_user("feed_music").await;
    let now = OffsetDateTime::now_utc();
    app.create_post_at(author.id, reel("silent.mp4", None), now);
    app.create_post_at(author.id, reel("song.mp4", Some("song.mp3")), now);
    app.create_post_at(author.id, text("no audio here"), now);

    let page = app.get("/feed/music", None).await.json();
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["video_url"], "song.mp4");
}

#[tokio::test]
async fn personalized_uses_explicit_interests() {
    let app = app().await;
    let author = app.create_user("feed_tags").await;
    let now = OffsetDateTime::now_utc();

    let mut tagged = text("guitar solo");
    tagged.tags = ["music".to_string()].into_iter().collect();
    app.create_post_at(author.id, tagged, now - Duration::minutes(5));
    app.create_post_at(author.id, text("untagged"), now);

    let page = app
        .get("/feed/for_you?interests=%23Music&limit=1", None)
        .await
        .json();
    assert_eq!(page["mode"], "personalized");
    assert_eq!(page["items"][0]["body"], "guitar solo");
}

#[tokio::test]
async fn personalized_never_repeats_a_post() {
    let app = app().await;
    let reader = app.create_user("feed_dedupe_r").await;
    let writer = app.create_user("feed_dedupe_w").await;
    follow(&app, &reader, &writer).await;

    let now = OffsetDateTime::now_utc();
    for i in 0..4 {
        app.create_post_at(writer.id, text(&format!("p{}", i)), now - Duration::minutes(i));
    }

    let page = app
        .get("/feed/personalized", Some(&reader.access_token))
        .await
        .json();
    let mut ids: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap())
        .collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
    assert_eq!(total, 4);
}

#[tokio::test]
async fn refresh_feed() {
    let app = app().await;
    let user = app.create_user("feed_refresh").await;

    let resp = app
        .post_json("/feed/refresh", json!({}), Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = app.post_json("/feed/refresh", json!({}), None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}
