use axum::{routing::get, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(handlers::signup))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh_token))
        .route("/auth/logout", post(handlers::logout))
        .route(
            "/auth/me",
            get(handlers::get_current_user).patch(handlers::update_current_user),
        )
}

pub fn users() -> Router<AppState> {
    Router::new()
        .route("/users/:id", get(handlers::get_user))
        .route("/users/:id/follow", post(handlers::follow_user))
        .route("/users/:id/unfollow", post(handlers::unfollow_user))
        .route("/users/:id/following", get(handlers::list_following))
        .route("/users/:id/followers", get(handlers::list_followers))
}

pub fn posts() -> Router<AppState> {
    Router::new()
        .route("/posts", post(handlers::create_post))
        .route(
            "/posts/:id",
            get(handlers::get_post)
                .patch(handlers::update_post)
                .delete(handlers::delete_post),
        )
}

pub fn moderation() -> Router<AppState> {
    Router::new().route(
        "/moderation/posts/:id/takedown",
        post(handlers::takedown_post),
    )
}

pub fn feed() -> Router<AppState> {
    Router::new()
        .route("/feed/refresh", post(handlers::refresh_feed))
        .route("/feed/:mode", get(handlers::get_feed))
}

pub fn rewards() -> Router<AppState> {
    Router::new()
        .route("/rewards", get(handlers::reward_status))
        .route("/rewards/claim", post(handlers::claim_reward))
}
