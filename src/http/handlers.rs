use std::collections::BTreeSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::auth::SignUp;
use crate::app::feed::{FeedMode, FeedPage, FeedRequest};
use crate::domain::post::{
    normalize_tags, ContentPatch, FeedPost, NewPost, PostContent, PostPatch, PostVisibility,
};
use crate::domain::reward::{ClaimOutcome, RewardStatus};
use crate::domain::session::TokenPair;
use crate::domain::user::{Profile, ProfilePatch};
use crate::http::{AdminToken, AppError, AuthUser};
use crate::AppState;

const MAX_PASSWORD_LEN: usize = 128;
const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 200;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl PaginationQuery {
    fn resolve(&self) -> Result<(i64, i64), AppError> {
        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if offset < 0 {
            return Err(AppError::bad_request("offset must be >= 0"));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(AppError::bad_request("limit must be between 1 and 200"));
        }
        Ok((offset, limit))
    }
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_offset: Option<i64>,
}

impl<T> ListResponse<T> {
    fn page(items: Vec<T>, offset: i64, limit: i64) -> Self {
        let next_offset = (items.len() as i64 == limit).then_some(offset + limit);
        Self { items, next_offset }
    }
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = match &state.db {
        Some(db) => db.ping().await.is_ok(),
        None => true,
    };
    let redis = match &state.cache {
        Some(cache) => cache.ping().await.is_ok(),
        None => true,
    };
    let status = if db && redis { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub password: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<Profile>), AppError> {
    if payload.password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }

    let user = state
        .auth_service()
        .signup(SignUp {
            username: payload.username,
            email: payload.email,
            display_name: payload.display_name.unwrap_or_default(),
            password: payload.password,
        })
        .await
        .map_err(|err| AppError::auth(err, "sign up"))?;

    let avatar_url = state.media.resolve(user.avatar_key.as_deref());
    Ok((
        StatusCode::CREATED,
        Json(Profile::from_user_with_url(user, avatar_url)),
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Email or username.
    pub identifier: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenPair>, AppError> {
    if payload.identifier.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("identifier and password are required"));
    }
    if payload.password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }

    let tokens = state
        .auth_service()
        .login(&payload.identifier, &payload.password)
        .await
        .map_err(|err| AppError::auth(err, "login"))?;

    Ok(Json(tokens))
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let tokens = state
        .auth_service()
        .refresh(&payload.refresh_token)
        .await
        .map_err(|err| AppError::auth(err, "refresh token"))?;

    Ok(Json(tokens))
}

pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    state
        .auth_service()
        .revoke_refresh_token(&payload.refresh_token)
        .await
        .map_err(|err| AppError::auth(err, "logout"))?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_current_user(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Profile>, AppError> {
    let profile = state
        .user_service()
        .get_profile(auth.user_id)
        .await
        .map_err(|err| AppError::user(err, "fetch current user"))?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    Ok(Json(profile))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_key: Option<String>,
    pub interests: Option<Vec<String>>,
}

pub async fn update_current_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    if let Some(bio) = &payload.bio {
        if bio.chars().count() > 500 {
            return Err(AppError::bad_request("bio must be at most 500 characters"));
        }
    }
    if let Some(display_name) = &payload.display_name {
        if display_name.chars().count() > 50 {
            return Err(AppError::bad_request("display_name must be at most 50 characters"));
        }
    }

    let patch = ProfilePatch {
        display_name: payload.display_name,
        bio: payload.bio,
        avatar_key: payload.avatar_key,
        interests: payload
            .interests
            .map(|interests| interests.into_iter().collect::<BTreeSet<_>>()),
    };

    let profile = state
        .user_service()
        .update_profile(auth.user_id, patch)
        .await
        .map_err(|err| AppError::user(err, "update profile"))?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    let feed = state.feed_service();
    if let Err(err) = feed.refresh(auth.user_id).await {
        tracing::warn!(error = ?err, user_id = %auth.user_id, "failed to clear feed cache");
    }

    Ok(Json(profile))
}

pub async fn get_user(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Profile>, AppError> {
    let profile = state
        .user_service()
        .get_profile(id)
        .await
        .map_err(|err| AppError::user(err, "fetch user"))?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    Ok(Json(profile))
}

#[derive(Serialize)]
pub struct FollowResponse {
    pub followed: bool,
}

pub async fn follow_user(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<FollowResponse>, AppError> {
    if auth.user_id == id {
        return Err(AppError::bad_request("cannot follow yourself"));
    }

    let followed = state
        .social_service()
        .follow(auth.user_id, id)
        .await
        .map_err(|err| AppError::store(err, "follow user"))?;

    if followed {
        if let Err(err) = state.feed_service().refresh(auth.user_id).await {
            tracing::warn!(error = ?err, user_id = %auth.user_id, "failed to clear feed cache");
        }
    }

    Ok(Json(FollowResponse { followed }))
}

#[derive(Serialize)]
pub struct UnfollowResponse {
    pub unfollowed: bool,
}

pub async fn unfollow_user(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UnfollowResponse>, AppError> {
    let unfollowed = state
        .social_service()
        .unfollow(auth.user_id, id)
        .await
        .map_err(|err| AppError::store(err, "unfollow user"))?;

    if unfollowed {
        if let Err(err) = state.feed_service().refresh(auth.user_id).await {
            tracing::warn!(error = ?err, user_id = %auth.user_id, "failed to clear feed cache");
        }
    }

    Ok(Json(UnfollowResponse { unfollowed }))
}

pub async fn list_following(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Profile>>, AppError> {
    let (offset, limit) = query.resolve()?;
    let items = state
        .social_service()
        .list_following(id, offset, limit)
        .await
        .map_err(|err| AppError::store(err, "list following"))?;

    Ok(Json(ListResponse::page(items, offset, limit)))
}

pub async fn list_followers(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Profile>>, AppError> {
    let (offset, limit) = query.resolve()?;
    let items = state
        .social_service()
        .list_followers(id, offset, limit)
        .await
        .map_err(|err| AppError::store(err, "list followers"))?;

    Ok(Json(ListResponse::page(items, offset, limit)))
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub visibility: Option<PostVisibility>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub content: PostContent,
}

pub async fn create_post(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<FeedPost>), AppError> {
    let post = NewPost {
        visibility: payload.visibility.unwrap_or_default(),
        tags: normalize_tags(payload.tags),
        content: payload.content,
    };

    let created = state
        .post_service()
        .create_post(auth.user_id, post)
        .await
        .map_err(|err| AppError::post(err, "create post"))?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_post(
    Path(id): Path<Uuid>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<FeedPost>, AppError> {
    let viewer_id = auth.map(|auth| auth.user_id);
    let post = state
        .post_service()
        .get_post(id, viewer_id)
        .await
        .map_err(|err| AppError::post(err, "fetch post"))?
        .ok_or_else(|| AppError::not_found("post not found"))?;

    Ok(Json(post))
}

#[derive(Deserialize)]
pub struct UpdatePostRequest {
    pub visibility: Option<PostVisibility>,
    pub tags: Option<Vec<String>>,
    pub content: Option<ContentPatch>,
}

pub async fn update_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<FeedPost>, AppError> {
    let patch = PostPatch {
        visibility: payload.visibility,
        tags: payload.tags.map(normalize_tags),
        content: payload.content,
    };

    let post = state
        .post_service()
        .update_post(id, auth.user_id, patch)
        .await
        .map_err(|err| AppError::post(err, "update post"))?
        .ok_or_else(|| AppError::not_found("post not found"))?;

    Ok(Json(post))
}

pub async fn delete_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .post_service()
        .delete_post(id, auth.user_id)
        .await
        .map_err(|err| AppError::post(err, "delete post"))?;

    if !deleted {
        return Err(AppError::not_found("post not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn takedown_post(
    Path(id): Path<Uuid>,
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let removed = state
        .post_service()
        .takedown_post(id)
        .await
        .map_err(|err| AppError::post(err, "take down post"))?;

    if !removed {
        return Err(AppError::not_found("post not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct FeedQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    /// Comma separated interest tags.
    pub interests: Option<String>,
}

pub async fn get_feed(
    Path(mode): Path<String>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedPage>, AppError> {
    let mode: FeedMode = mode.parse()?;
    let feed = state.feed_service();
    let viewer_id = auth.map(|auth| auth.user_id);

    let request = FeedRequest {
        mode,
        viewer_id,
        interests: query
            .interests
            .as_deref()
            .map(|raw| normalize_tags(raw.split(',')))
            .filter(|interests| !interests.is_empty()),
        offset: query.offset.unwrap_or(0),
        limit: query.limit.unwrap_or(feed.limits().default_limit),
    };

    let page = feed.get_feed(request).await?;

    Ok(Json(page))
}

pub async fn refresh_feed(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    state
        .feed_service()
        .refresh(auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to refresh feed");
            AppError::internal("failed to refresh feed")
        })?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn reward_status(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<RewardStatus>, AppError> {
    let status = state
        .reward_ledger()
        .status(auth.user_id, OffsetDateTime::now_utc())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to load rewards");
            AppError::internal("failed to load rewards")
        })?;

    Ok(Json(status))
}

pub async fn claim_reward(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ClaimOutcome>, AppError> {
    let outcome = state
        .reward_ledger()
        .claim(auth.user_id, OffsetDateTime::now_utc())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to claim reward");
            AppError::internal("failed to claim reward")
        })?;

    Ok(Json(outcome))
}
