use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::post::{Engagement, FeedPost, NewPost, Post, PostKind, PostVisibility};
use crate::domain::reward::RewardState;
use crate::domain::user::{NewUser, ProfilePatch, User};
use crate::store::{
    Credentials, IdentityStore, PostFilter, PostQuery, PostStore, RewardStore, SocialGraphStore,
    StoreError, StoreResult, VisibilityScope,
};

struct StoredUser {
    user: User,
    password_hash: String,
}

struct RefreshToken {
    user_id: Uuid,
    token_hash: String,
    expires_at: OffsetDateTime,
    revoked: bool,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, StoredUser>,
    posts: HashMap<Uuid, Post>,
    follows: HashMap<(Uuid, Uuid), OffsetDateTime>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    rewards: HashMap<Uuid, RewardState>,
    collabs: Option<Vec<Uuid>>,
    engagement_ranking: bool,
    unavailable: bool,
}

/// In-process implementation of every store trait.
///
/// The engagement ranking function and the collabs collection start out
/// missing, matching a deployment that has not run the optional migrations.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_engagement_ranking(&self, available: bool) {
        self.inner.write().engagement_ranking = available;
    }

    /// Simulates a backend outage: every read and write fails as transient.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().unavailable = unavailable;
    }

    pub fn enable_collabs(&self) {
        let mut inner = self.inner.write();
        if inner.collabs.is_none() {
            inner.collabs = Some(Vec::new());
        }
    }

    pub fn add_collab(&self, post_id: Uuid) {
        self.inner
            .write()
            .collabs
            .get_or_insert_with(Vec::new)
            .push(post_id);
    }

    pub fn set_engagement(&self, post_id: Uuid, engagement: Engagement) {
        if let Some(post) = self.inner.write().posts.get_mut(&post_id) {
            post.engagement = engagement;
        }
    }

    /// Inserts a post with an explicit creation time.
    pub fn insert_post_at(&self, author_id: Uuid, post: NewPost, created_at: OffsetDateTime) -> Post {
        let post = Post {
            id: Uuid::new_v4(),
            author_id,
            created_at,
            updated_at: created_at,
            visibility: post.visibility,
            tags: post.tags,
            engagement: Engagement::default(),
            is_deleted: false,
            content: post.content,
        };
        self.inner.write().posts.insert(post.id, post.clone());
        post
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.inner.read().unavailable {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }
}

fn project(inner: &Inner, post: &Post) -> Option<FeedPost> {
    let author = inner.users.get(&post.author_id)?;
    let snapshot = author.user.author_snapshot(author.user.avatar_key.clone());
    Some(FeedPost::from_post(post.clone(), snapshot))
}

fn in_scope(scope: VisibilityScope, visibility: PostVisibility) -> bool {
    match scope {
        VisibilityScope::PublicOnly => visibility == PostVisibility::Public,
        VisibilityScope::Followed => {
            matches!(visibility, PostVisibility::Public | PostVisibility::Followers)
        }
    }
}

fn matches_filter(filter: &PostFilter, post: &Post) -> bool {
    match filter {
        PostFilter::Authors(ids) => ids.contains(&post.author_id),
        PostFilter::Everyone => true,
        PostFilter::TagsOverlap(tags) => !post.tags.is_disjoint(tags),
        PostFilter::WithAudio => post.content.has_audio(),
        PostFilter::Keyword(keyword) => {
            let keyword = keyword.to_lowercase();
            post.tags.contains(&keyword)
                || post
                    .content
                    .searchable_text()
                    .iter()
                    .any(|text| text.to_lowercase().contains(&keyword))
        }
    }
}

fn page<T>(items: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

fn newest_first(posts: &mut [FeedPost]) {
    posts.sort_by_key(|post| Reverse((post.created_at, post.id)));
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn insert_post(&self, author_id: Uuid, post: NewPost) -> StoreResult<Post> {
        self.check_available()?;
        if !self.inner.read().users.contains_key(&author_id) {
            return Err(StoreError::Invalid("author does not exist".into()));
        }
        Ok(self.insert_post_at(author_id, post, OffsetDateTime::now_utc()))
    }

    async fn load_post(&self, post_id: Uuid) -> StoreResult<Option<Post>> {
        self.check_available()?;
        Ok(self.inner.read().posts.get(&post_id).cloned())
    }

    async fn get_feed_post(&self, post_id: Uuid) -> StoreResult<Option<FeedPost>> {
        self.check_available()?;
        let inner = self.inner.read();
        Ok(inner
            .posts
            .get(&post_id)
            .filter(|post| !post.is_deleted)
            .and_then(|post| project(&inner, post)))
    }

    async fn save_post(&self, post: &Post) -> StoreResult<bool> {
        self.check_available()?;
        let mut inner = self.inner.write();
        match inner.posts.get_mut(&post.id) {
            Some(stored) if stored.kind() == post.kind() => {
                *stored = post.clone();
                Ok(true)
            }
            Some(_) => Err(StoreError::Invalid("post kind cannot change".into())),
            None => Ok(false),
        }
    }

    async fn query_posts(&self, query: &PostQuery) -> StoreResult<Vec<FeedPost>> {
        self.check_available()?;
        let inner = self.inner.read();
        let mut posts: Vec<FeedPost> = inner
            .posts
            .values()
            .filter(|post| !post.is_deleted)
            .filter(|post| query.kinds.contains(&post.kind()))
            .filter(|post| in_scope(query.scope, post.visibility))
            .filter(|post| matches_filter(&query.filter, post))
            .filter_map(|post| project(&inner, post))
            .collect();
        newest_first(&mut posts);
        Ok(page(posts, query.offset, query.limit))
    }

    async fn engagement_ranked(
        &self,
        kinds: &[PostKind],
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<FeedPost>> {
        self.check_available()?;
        let inner = self.inner.read();
        if !inner.engagement_ranking {
            return Err(StoreError::Unsupported("function trending_feed does not exist".into()));
        }
        let mut posts: Vec<FeedPost> = inner
            .posts
            .values()
            .filter(|post| !post.is_deleted && post.visibility == PostVisibility::Public)
            .filter(|post| kinds.contains(&post.kind()))
            .filter_map(|post| project(&inner, post))
            .collect();
        posts.sort_by_key(|post| Reverse((post.engagement.score(), post.created_at, post.id)));
        Ok(page(posts, offset, limit))
    }

    async fn collab_posts(&self, offset: i64, limit: i64) -> StoreResult<Vec<FeedPost>> {
        self.check_available()?;
        let inner = self.inner.read();
        let collabs = inner
            .collabs
            .as_ref()
            .ok_or_else(|| StoreError::Unsupported("relation collabs does not exist".into()))?;
        let mut posts: Vec<FeedPost> = collabs
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|id| inner.posts.get(id))
            .filter(|post| !post.is_deleted && post.visibility == PostVisibility::Public)
            .filter_map(|post| project(&inner, post))
            .collect();
        newest_first(&mut posts);
        Ok(page(posts, offset, limit))
    }
}

#[async_trait]
impl SocialGraphStore for MemoryStore {
    async fn following_ids(&self, follower_id: Uuid) -> StoreResult<Vec<Uuid>> {
        self.check_available()?;
        Ok(self
            .inner
            .read()
            .follows
            .keys()
            .filter(|(follower, _)| *follower == follower_id)
            .map(|(_, following)| *following)
            .collect())
    }

    async fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self
            .inner
            .read()
            .follows
            .contains_key(&(follower_id, following_id)))
    }

    async fn follow(&self, follower_id: Uuid, following_id: Uuid) -> StoreResult<bool> {
        self.check_available()?;
        if follower_id == following_id {
            return Err(StoreError::Invalid("cannot follow yourself".into()));
        }
        let mut inner = self.inner.write();
        if !inner.users.contains_key(&following_id) {
            return Err(StoreError::Invalid("user does not exist".into()));
        }
        if inner.follows.contains_key(&(follower_id, following_id)) {
            return Ok(false);
        }
        inner
            .follows
            .insert((follower_id, following_id), OffsetDateTime::now_utc());
        Ok(true)
    }

    async fn unfollow(&self, follower_id: Uuid, following_id: Uuid) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self
            .inner
            .write()
            .follows
            .remove(&(follower_id, following_id))
            .is_some())
    }

    async fn list_following(&self, user_id: Uuid, offset: i64, limit: i64) -> StoreResult<Vec<User>> {
        self.check_available()?;
        let inner = self.inner.read();
        let mut edges: Vec<(OffsetDateTime, &User)> = inner
            .follows
            .iter()
            .filter(|((follower, _), _)| *follower == user_id)
            .filter_map(|((_, following), at)| inner.users.get(following).map(|u| (*at, &u.user)))
            .collect();
        edges.sort_by_key(|(at, user)| Reverse((*at, user.id)));
        Ok(page(edges, offset, limit)
            .into_iter()
            .map(|(_, user)| user.clone())
            .collect())
    }

    async fn list_followers(&self, user_id: Uuid, offset: i64, limit: i64) -> StoreResult<Vec<User>> {
        self.check_available()?;
        let inner = self.inner.read();
        let mut edges: Vec<(OffsetDateTime, &User)> = inner
            .follows
            .iter()
            .filter(|((_, following), _)| *following == user_id)
            .filter_map(|((follower, _), at)| inner.users.get(follower).map(|u| (*at, &u.user)))
            .collect();
        edges.sort_by_key(|(at, user)| Reverse((*at, user.id)));
        Ok(page(edges, offset, limit)
            .into_iter()
            .map(|(_, user)| user.clone())
            .collect())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        self.check_available()?;
        let mut inner = self.inner.write();
        for stored in inner.users.values() {
            if stored.user.username.eq_ignore_ascii_case(&user.username) {
                return Err(StoreError::Conflict("users_username_key".into()));
            }
            if stored.user.email.eq_ignore_ascii_case(&user.email) {
                return Err(StoreError::Conflict("users_email_key".into()));
            }
        }
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            bio: None,
            avatar_key: None,
            interests: BTreeSet::new(),
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.insert(
            created.id,
            StoredUser {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(created)
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        self.check_available()?;
        Ok(self
            .inner
            .read()
            .users
            .get(&user_id)
            .map(|stored| stored.user.clone()))
    }

    async fn find_credentials(&self, identifier: &str) -> StoreResult<Option<Credentials>> {
        self.check_available()?;
        Ok(self
            .inner
            .read()
            .users
            .values()
            .find(|stored| {
                stored.user.email.eq_ignore_ascii_case(identifier)
                    || stored.user.username.eq_ignore_ascii_case(identifier)
            })
            .map(|stored| Credentials {
                user_id: stored.user.id,
                password_hash: stored.password_hash.clone(),
            }))
    }

    async fn update_profile(&self, user_id: Uuid, patch: ProfilePatch) -> StoreResult<Option<User>> {
        self.check_available()?;
        let mut inner = self.inner.write();
        let Some(stored) = inner.users.get_mut(&user_id) else {
            return Ok(None);
        };
        let user = &mut stored.user;
        if let Some(display_name) = patch.display_name {
            user.display_name = display_name;
        }
        if let Some(bio) = patch.bio {
            user.bio = Some(bio);
        }
        if let Some(avatar_key) = patch.avatar_key {
            user.avatar_key = Some(avatar_key);
        }
        if let Some(interests) = patch.interests {
            user.interests = interests;
        }
        Ok(Some(user.clone()))
    }

    async fn insert_refresh_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<()> {
        self.check_available()?;
        self.inner.write().refresh_tokens.insert(
            token_id,
            RefreshToken {
                user_id,
                token_hash: token_hash.to_string(),
                expires_at,
                revoked: false,
            },
        );
        Ok(())
    }

    async fn revoke_refresh_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        token_hash: &str,
        _replaced_by: Option<Uuid>,
    ) -> StoreResult<bool> {
        self.check_available()?;
        let mut inner = self.inner.write();
        let Some(token) = inner.refresh_tokens.get_mut(&token_id) else {
            return Ok(false);
        };
        let live = !token.revoked && token.expires_at > OffsetDateTime::now_utc();
        if !live || token.user_id != user_id || token.token_hash != token_hash {
            return Ok(false);
        }
        token.revoked = true;
        Ok(true)
    }
}

#[async_trait]
impl RewardStore for MemoryStore {
    async fn get_state(&self, user_id: Uuid) -> StoreResult<Option<RewardState>> {
        self.check_available()?;
        Ok(self.inner.read().rewards.get(&user_id).cloned())
    }

    async fn compare_and_set(
        &self,
        expected: Option<OffsetDateTime>,
        next: &RewardState,
    ) -> StoreResult<bool> {
        self.check_available()?;
        let mut inner = self.inner.write();
        let current = inner
            .rewards
            .get(&next.user_id)
            .and_then(|state| state.last_claimed_at);
        if current != expected {
            return Ok(false);
        }
        inner.rewards.insert(next.user_id, next.clone());
        Ok(true)
    }
}
