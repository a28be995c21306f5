//! Storage seams for posts, the follow graph, identities and the reward ledger.
//!
//! Every service talks to these traits; `postgres` backs them with sqlx and
//! `memory` keeps everything in process for tests and local runs.

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::post::{FeedPost, NewPost, Post, PostKind};
use crate::domain::reward::RewardState;
use crate::domain::user::{NewUser, ProfilePatch, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient failure reaching the backend; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The deployment lacks an optional table or function.
    #[error("unsupported by this deployment: {0}")]
    Unsupported(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid data: {0}")]
    Invalid(String),
    #[error("query failed: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => Self::Unavailable(err.to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // undefined_function, undefined_table
                Some("42883") | Some("42P01") => Self::Unsupported(db_err.message().to_string()),
                Some("23505") => Self::Conflict(
                    db_err
                        .constraint()
                        .unwrap_or("unique constraint")
                        .to_string(),
                ),
                Some("23503") | Some("23514") => Self::Invalid(db_err.message().to_string()),
                _ => Self::Query(err.to_string()),
            },
            _ => Self::Query(err.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Row filter applied across every requested post kind.
#[derive(Debug, Clone, PartialEq)]
pub enum PostFilter {
    Authors(Vec<Uuid>),
    Everyone,
    TagsOverlap(BTreeSet<String>),
    WithAudio,
    Keyword(String),
}

/// Which visibility levels a query may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityScope {
    PublicOnly,
    /// Public and followers-only posts, for a viewer who follows the authors.
    Followed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostQuery {
    pub kinds: Vec<PostKind>,
    pub filter: PostFilter,
    pub scope: VisibilityScope,
    pub offset: i64,
    pub limit: i64,
}

impl PostQuery {
    pub fn all_kinds(filter: PostFilter, scope: VisibilityScope, offset: i64, limit: i64) -> Self {
        Self {
            kinds: PostKind::ALL.to_vec(),
            filter,
            scope,
            offset,
            limit,
        }
    }
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert_post(&self, author_id: Uuid, post: NewPost) -> StoreResult<Post>;

    /// Loads a post of any kind, including soft-deleted ones.
    async fn load_post(&self, post_id: Uuid) -> StoreResult<Option<Post>>;

    /// Loads a live post joined with its author's public profile.
    async fn get_feed_post(&self, post_id: Uuid) -> StoreResult<Option<FeedPost>>;

    /// Persists every mutable field of `post`. Returns false when the row is gone.
    async fn save_post(&self, post: &Post) -> StoreResult<bool>;

    /// Newest first, `(created_at, id)` descending, across all requested kinds.
    async fn query_posts(&self, query: &PostQuery) -> StoreResult<Vec<FeedPost>>;

    /// Public posts ordered by engagement score through the optional ranking function.
    async fn engagement_ranked(
        &self,
        kinds: &[PostKind],
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<FeedPost>>;

    /// Posts referenced by the optional `collabs` collection, newest first.
    async fn collab_posts(&self, offset: i64, limit: i64) -> StoreResult<Vec<FeedPost>>;
}

#[async_trait]
pub trait SocialGraphStore: Send + Sync {
    async fn following_ids(&self, follower_id: Uuid) -> StoreResult<Vec<Uuid>>;
    async fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> StoreResult<bool>;
    async fn follow(&self, follower_id: Uuid, following_id: Uuid) -> StoreResult<bool>;
    async fn unfollow(&self, follower_id: Uuid, following_id: Uuid) -> StoreResult<bool>;
    async fn list_following(&self, user_id: Uuid, offset: i64, limit: i64) -> StoreResult<Vec<User>>;
    async fn list_followers(&self, user_id: Uuid, offset: i64, limit: i64) -> StoreResult<Vec<User>>;
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: Uuid,
    pub password_hash: String,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>>;
    /// Looks a user up by email or username.
    async fn find_credentials(&self, identifier: &str) -> StoreResult<Option<Credentials>>;
    async fn update_profile(&self, user_id: Uuid, patch: ProfilePatch) -> StoreResult<Option<User>>;

    async fn insert_refresh_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<()>;
    /// Marks a live token revoked, recording its successor. False when no live token matched.
    async fn revoke_refresh_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        token_hash: &str,
        replaced_by: Option<Uuid>,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait RewardStore: Send + Sync {
    async fn get_state(&self, user_id: Uuid) -> StoreResult<Option<RewardState>>;

    /// Writes `next` only if the stored `last_claimed_at` still equals `expected`.
    async fn compare_and_set(
        &self,
        expected: Option<OffsetDateTime>,
        next: &RewardState,
    ) -> StoreResult<bool>;
}
