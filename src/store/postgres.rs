use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::post::{
    AuthorSnapshot, Engagement, FeedPost, ImageContent, MemeContent, NewPost, Post, PostContent,
    PostKind, PostVisibility, ReelContent, TextContent,
};
use crate::domain::reward::RewardState;
use crate::domain::user::{NewUser, ProfilePatch, User};
use crate::infra::db::Db;
use crate::store::{
    Credentials, IdentityStore, PostFilter, PostQuery, PostStore, RewardStore, SocialGraphStore,
    StoreError, StoreResult, VisibilityScope,
};

const FEED_COLUMNS: &str = "f.kind, f.id, f.author_id, f.visibility, f.tags, f.like_count, \
     f.comment_count, f.share_count, f.is_deleted, f.created_at, f.updated_at, f.body, f.title, \
     f.mood, f.image_urls, f.caption, f.video_url, f.thumbnail_url, f.audio_url, f.audio_type, \
     f.duration_seconds, f.original_volume, f.audio_volume, f.allow_comments, f.allow_duets, \
     f.vibe, f.image_url";

const AUTHOR_COLUMNS: &str = "u.username AS author_username, \
     u.display_name AS author_display_name, u.avatar_key AS author_avatar_key";

const USER_COLUMNS: &str =
    "u.id, u.username, u.email, u.display_name, u.bio, u.avatar_key, u.interests, u.created_at";

/// sqlx-backed implementation of every store trait.
#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn row_to_post(row: &PgRow) -> StoreResult<Post> {
    let kind: String = row.try_get("kind")?;
    let kind = PostKind::from_db(&kind)
        .ok_or_else(|| StoreError::Invalid(format!("unknown post kind: {}", kind)))?;
    let visibility: String = row.try_get("visibility")?;
    let visibility = PostVisibility::from_db(&visibility)
        .ok_or_else(|| StoreError::Invalid(format!("unknown post visibility: {}", visibility)))?;

    let content = match kind {
        PostKind::Text => PostContent::Text(TextContent {
            body: row.try_get("body")?,
            title: row.try_get("title")?,
            mood: row.try_get("mood")?,
        }),
        PostKind::Image => PostContent::Image(ImageContent {
            image_urls: row.try_get("image_urls")?,
            caption: row.try_get("caption")?,
        }),
        PostKind::Reel => PostContent::Reel(ReelContent {
            video_url: row.try_get("video_url")?,
            thumbnail_url: row.try_get("thumbnail_url")?,
            audio_url: row.try_get("audio_url")?,
            audio_type: row.try_get("audio_type")?,
            duration_seconds: row.try_get("duration_seconds")?,
            original_volume: row.try_get("original_volume")?,
            audio_volume: row.try_get("audio_volume")?,
            allow_comments: row.try_get::<Option<bool>, _>("allow_comments")?.unwrap_or(true),
            allow_duets: row.try_get::<Option<bool>, _>("allow_duets")?.unwrap_or(true),
            vibe: row.try_get("vibe")?,
        }),
        PostKind::Meme => PostContent::Meme(MemeContent {
            image_url: row.try_get("image_url")?,
            caption: row.try_get("caption")?,
        }),
    };

    let tags: Vec<String> = row.try_get("tags")?;
    Ok(Post {
        id: row.try_get("id")?,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        visibility,
        tags: tags.into_iter().collect(),
        engagement: Engagement {
            likes: row.try_get("like_count")?,
            comments: row.try_get("comment_count")?,
            shares: row.try_get("share_count")?,
        },
        is_deleted: row.try_get("is_deleted")?,
        content,
    })
}

fn row_to_feed_post(row: &PgRow) -> StoreResult<FeedPost> {
    let post = row_to_post(row)?;
    let author = AuthorSnapshot {
        id: post.author_id,
        username: row.try_get("author_username")?,
        display_name: row.try_get("author_display_name")?,
        avatar_url: row.try_get("author_avatar_key")?,
    };
    Ok(FeedPost::from_post(post, author))
}

fn row_to_user(row: &PgRow) -> StoreResult<User> {
    let interests: Vec<String> = row.try_get("interests")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        bio: row.try_get("bio")?,
        avatar_key: row.try_get("avatar_key")?,
        interests: interests.into_iter().collect(),
        created_at: row.try_get("created_at")?,
    })
}

fn rows_to_feed_posts(rows: Vec<PgRow>) -> StoreResult<Vec<FeedPost>> {
    rows.iter().map(row_to_feed_post).collect()
}

fn kind_names(kinds: &[PostKind]) -> Vec<String> {
    kinds.iter().map(|kind| kind.as_db().to_string()).collect()
}

fn escape_like_pattern(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl PostStore for PgStore {
    async fn insert_post(&self, author_id: Uuid, post: NewPost) -> StoreResult<Post> {
        let tags: Vec<String> = post.tags.into_iter().collect();
        let visibility = post.visibility.as_db();

        let id: Uuid = match post.content {
            PostContent::Text(text) => {
                sqlx::query_scalar(
                    "INSERT INTO text_posts (author_id, visibility, tags, body, title, mood) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
                )
                .bind(author_id)
                .bind(visibility)
                .bind(&tags)
                .bind(text.body)
                .bind(text.title)
                .bind(text.mood)
                .fetch_one(self.db.pool())
                .await?
            }
            PostContent::Image(image) => {
                sqlx::query_scalar(
                    "INSERT INTO image_posts (author_id, visibility, tags, image_urls, caption) \
                     VALUES ($1, $2, $3, $4, $5) RETURNING id",
                )
                .bind(author_id)
                .bind(visibility)
                .bind(&tags)
                .bind(image.image_urls)
                .bind(image.caption)
                .fetch_one(self.db.pool())
                .await?
            }
            PostContent::Reel(reel) => {
                sqlx::query_scalar(
                    "INSERT INTO reel_posts (author_id, visibility, tags, video_url, thumbnail_url, \
                         audio_url, audio_type, duration_seconds, original_volume, audio_volume, \
                         allow_comments, allow_duets, vibe) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING id",
                )
                .bind(author_id)
                .bind(visibility)
                .bind(&tags)
                .bind(reel.video_url)
                .bind(reel.thumbnail_url)
                .bind(reel.audio_url)
                .bind(reel.audio_type)
                .bind(reel.duration_seconds)
                .bind(reel.original_volume)
                .bind(reel.audio_volume)
                .bind(reel.allow_comments)
                .bind(reel.allow_duets)
                .bind(reel.vibe)
                .fetch_one(self.db.pool())
                .await?
            }
            PostContent::Meme(meme) => {
                sqlx::query_scalar(
                    "INSERT INTO meme_posts (author_id, visibility, tags, image_url, caption) \
                     VALUES ($1, $2, $3, $4, $5) RETURNING id",
                )
                .bind(author_id)
                .bind(visibility)
                .bind(&tags)
                .bind(meme.image_url)
                .bind(meme.caption)
                .fetch_one(self.db.pool())
                .await?
            }
        };

        self.load_post(id)
            .await?
            .ok_or_else(|| StoreError::Query(format!("inserted post {} not found", id)))
    }

    async fn load_post(&self, post_id: Uuid) -> StoreResult<Option<Post>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM feed_items f WHERE f.id = $1 LIMIT 1",
            FEED_COLUMNS
        ))
        .bind(post_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(row_to_post).transpose()
    }

    async fn get_feed_post(&self, post_id: Uuid) -> StoreResult<Option<FeedPost>> {
        let row = sqlx::query(&format!(
            "SELECT {}, {} FROM feed_items f \
             JOIN users u ON u.id = f.author_id \
             WHERE f.id = $1 AND NOT f.is_deleted \
             LIMIT 1",
            FEED_COLUMNS, AUTHOR_COLUMNS
        ))
        .bind(post_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(row_to_feed_post).transpose()
    }

    async fn save_post(&self, post: &Post) -> StoreResult<bool> {
        let tags: Vec<String> = post.tags.iter().cloned().collect();
        let visibility = post.visibility.as_db();

        let result = match &post.content {
            PostContent::Text(text) => {
                sqlx::query(
                    "UPDATE text_posts \
                     SET visibility = $2, tags = $3, is_deleted = $4, updated_at = now(), \
                         body = $5, title = $6, mood = $7 \
                     WHERE id = $1",
                )
                .bind(post.id)
                .bind(visibility)
                .bind(&tags)
                .bind(post.is_deleted)
                .bind(&text.body)
                .bind(&text.title)
                .bind(&text.mood)
                .execute(self.db.pool())
                .await?
            }
            PostContent::Image(image) => {
                sqlx::query(
                    "UPDATE image_posts \
                     SET visibility = $2, tags = $3, is_deleted = $4, updated_at = now(), \
                         image_urls = $5, caption = $6 \
                     WHERE id = $1",
                )
                .bind(post.id)
                .bind(visibility)
                .bind(&tags)
                .bind(post.is_deleted)
                .bind(&image.image_urls)
                .bind(&image.caption)
                .execute(self.db.pool())
                .await?
            }
            PostContent::Reel(reel) => {
                sqlx::query(
                    "UPDATE reel_posts \
                     SET visibility = $2, tags = $3, is_deleted = $4, updated_at = now(), \
                         thumbnail_url = $5, audio_url = $6, audio_type = $7, \
                         original_volume = $8, audio_volume = $9, allow_comments = $10, \
                         allow_duets = $11, vibe = $12 \
                     WHERE id = $1",
                )
                .bind(post.id)
                .bind(visibility)
                .bind(&tags)
                .bind(post.is_deleted)
                .bind(&reel.thumbnail_url)
                .bind(&reel.audio_url)
                .bind(&reel.audio_type)
                .bind(reel.original_volume)
                .bind(reel.audio_volume)
                .bind(reel.allow_comments)
                .bind(reel.allow_duets)
                .bind(&reel.vibe)
                .execute(self.db.pool())
                .await?
            }
            PostContent::Meme(meme) => {
                sqlx::query(
                    "UPDATE meme_posts \
                     SET visibility = $2, tags = $3, is_deleted = $4, updated_at = now(), \
                         caption = $5 \
                     WHERE id = $1",
                )
                .bind(post.id)
                .bind(visibility)
                .bind(&tags)
                .bind(post.is_deleted)
                .bind(&meme.caption)
                .execute(self.db.pool())
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }

    async fn query_posts(&self, query: &PostQuery) -> StoreResult<Vec<FeedPost>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {}, {} FROM feed_items f \
             JOIN users u ON u.id = f.author_id \
             WHERE NOT f.is_deleted AND f.kind = ANY(",
            FEED_COLUMNS, AUTHOR_COLUMNS
        ));
        builder.push_bind(kind_names(&query.kinds));
        builder.push(")");

        match query.scope {
            VisibilityScope::PublicOnly => {
                builder.push(" AND f.visibility = 'public'");
            }
            VisibilityScope::Followed => {
                builder.push(" AND f.visibility IN ('public', 'followers')");
            }
        }

        match &query.filter {
            PostFilter::Authors(ids) => {
                builder.push(" AND f.author_id = ANY(");
                builder.push_bind(ids.clone());
                builder.push(")");
            }
            PostFilter::Everyone => {}
            PostFilter::TagsOverlap(tags) => {
                builder.push(" AND f.tags && ");
                builder.push_bind(tags.iter().cloned().collect::<Vec<String>>());
            }
            PostFilter::WithAudio => {
                builder.push(" AND f.kind = 'reel' AND f.audio_url IS NOT NULL");
            }
            PostFilter::Keyword(keyword) => {
                let pattern = format!("%{}%", escape_like_pattern(keyword));
                builder.push(" AND (");
                builder.push_bind(keyword.to_lowercase());
                builder.push(" = ANY(f.tags)");
                for column in ["f.body", "f.title", "f.caption", "f.vibe"] {
                    builder.push(format!(" OR {} ILIKE ", column));
                    builder.push_bind(pattern.clone());
                    builder.push(" ESCAPE '\\'");
                }
                builder.push(")");
            }
        }

        builder.push(" ORDER BY f.created_at DESC, f.id DESC OFFSET ");
        builder.push_bind(query.offset);
        builder.push(" LIMIT ");
        builder.push_bind(query.limit);

        let rows = builder.build().fetch_all(self.db.pool()).await?;
        rows_to_feed_posts(rows)
    }

    async fn engagement_ranked(
        &self,
        kinds: &[PostKind],
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<FeedPost>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, {} FROM trending_feed($1, $2, $3) f \
             JOIN users u ON u.id = f.author_id \
             ORDER BY f.like_count + f.comment_count DESC, f.created_at DESC, f.id DESC",
            FEED_COLUMNS, AUTHOR_COLUMNS
        ))
        .bind(kind_names(kinds))
        .bind(offset)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows_to_feed_posts(rows)
    }

    async fn collab_posts(&self, offset: i64, limit: i64) -> StoreResult<Vec<FeedPost>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, {} FROM collabs c \
             JOIN feed_items f ON f.kind = c.post_kind AND f.id = c.post_id \
             JOIN users u ON u.id = f.author_id \
             WHERE NOT f.is_deleted AND f.visibility = 'public' \
             ORDER BY f.created_at DESC, f.id DESC \
             OFFSET $1 LIMIT $2",
            FEED_COLUMNS, AUTHOR_COLUMNS
        ))
        .bind(offset)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows_to_feed_posts(rows)
    }
}

#[async_trait]
impl SocialGraphStore for PgStore {
    async fn following_ids(&self, follower_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar("SELECT following_id FROM follows WHERE follower_id = $1")
            .bind(follower_id)
            .fetch_all(self.db.pool())
            .await?;
        Ok(ids)
    }

    async fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> StoreResult<bool> {
        let exists = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = $1 AND following_id = $2)",
        )
        .bind(follower_id)
        .bind(following_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(exists)
    }

    async fn follow(&self, follower_id: Uuid, following_id: Uuid) -> StoreResult<bool> {
        if follower_id == following_id {
            return Err(StoreError::Invalid("cannot follow yourself".into()));
        }
        let result = sqlx::query(
            "INSERT INTO follows (follower_id, following_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(follower_id)
        .bind(following_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn unfollow(&self, follower_id: Uuid, following_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND following_id = $2")
            .bind(follower_id)
            .bind(following_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_following(&self, user_id: Uuid, offset: i64, limit: i64) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM follows f JOIN users u ON u.id = f.following_id \
             WHERE f.follower_id = $1 \
             ORDER BY f.created_at DESC, u.id DESC \
             OFFSET $2 LIMIT $3",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_user).collect()
    }

    async fn list_followers(&self, user_id: Uuid, offset: i64, limit: i64) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM follows f JOIN users u ON u.id = f.follower_id \
             WHERE f.following_id = $1 \
             ORDER BY f.created_at DESC, u.id DESC \
             OFFSET $2 LIMIT $3",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_user).collect()
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let row = sqlx::query(&format!(
            "INSERT INTO users AS u (username, email, display_name, password_hash) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user.username)
        .bind(user.email)
        .bind(user.display_name)
        .bind(user.password_hash)
        .fetch_one(self.db.pool())
        .await?;

        row_to_user(&row)
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users u WHERE u.id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_credentials(&self, identifier: &str) -> StoreResult<Option<Credentials>> {
        let row = sqlx::query(
            "SELECT id, password_hash FROM users \
             WHERE lower(email) = lower($1) OR lower(username) = lower($1)",
        )
        .bind(identifier)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(Credentials {
                user_id: row.try_get("id")?,
                password_hash: row.try_get("password_hash")?,
            })),
            None => Ok(None),
        }
    }

    async fn update_profile(&self, user_id: Uuid, patch: ProfilePatch) -> StoreResult<Option<User>> {
        let interests: Option<Vec<String>> =
            patch.interests.map(|tags| tags.into_iter().collect());
        let row = sqlx::query(&format!(
            "UPDATE users AS u \
             SET display_name = COALESCE($2, u.display_name), \
                 bio = COALESCE($3, u.bio), \
                 avatar_key = COALESCE($4, u.avatar_key), \
                 interests = COALESCE($5, u.interests) \
             WHERE u.id = $1 \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(patch.display_name)
        .bind(patch.bio)
        .bind(patch.avatar_key)
        .bind(interests)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn insert_refresh_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(token_id)
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn revoke_refresh_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        token_hash: &str,
        replaced_by: Option<Uuid>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens \
             SET revoked_at = now(), replaced_by = $4 \
             WHERE id = $1 AND user_id = $2 AND token_hash = $3 \
               AND revoked_at IS NULL AND expires_at > now()",
        )
        .bind(token_id)
        .bind(user_id)
        .bind(token_hash)
        .bind(replaced_by)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RewardStore for PgStore {
    async fn get_state(&self, user_id: Uuid) -> StoreResult<Option<RewardState>> {
        let row = sqlx::query(
            "SELECT user_id, last_claimed_at, streak, total_claimed, points \
             FROM reward_ledger WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(RewardState {
                user_id: row.try_get("user_id")?,
                last_claimed_at: row.try_get("last_claimed_at")?,
                streak: row.try_get("streak")?,
                total_claimed: row.try_get("total_claimed")?,
                points: row.try_get("points")?,
            })),
            None => Ok(None),
        }
    }

    async fn compare_and_set(
        &self,
        expected: Option<OffsetDateTime>,
        next: &RewardState,
    ) -> StoreResult<bool> {
        let result = match expected {
            Some(expected) => {
                sqlx::query(
                    "UPDATE reward_ledger \
                     SET last_claimed_at = $2, streak = $3, total_claimed = $4, points = $5 \
                     WHERE user_id = $1 AND last_claimed_at = $6",
                )
                .bind(next.user_id)
                .bind(next.last_claimed_at)
                .bind(next.streak)
                .bind(next.total_claimed)
                .bind(next.points)
                .bind(expected)
                .execute(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "INSERT INTO reward_ledger (user_id, last_claimed_at, streak, total_claimed, points) \
                     VALUES ($1, $2, $3, $4, $5) \
                     ON CONFLICT (user_id) DO UPDATE \
                     SET last_claimed_at = EXCLUDED.last_claimed_at, streak = EXCLUDED.streak, \
                         total_claimed = EXCLUDED.total_claimed, points = EXCLUDED.points \
                     WHERE reward_ledger.last_claimed_at IS NULL",
                )
                .bind(next.user_id)
                .bind(next.last_claimed_at)
                .bind(next.streak)
                .bind(next.total_claimed)
                .bind(next.points)
                .execute(self.db.pool())
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }
}
