use std::sync::Arc;

use uuid::Uuid;

use crate::domain::user::Profile;
use crate::infra::storage::MediaUrls;
use crate::store::{SocialGraphStore, StoreResult};

#[derive(Clone)]
pub struct SocialService {
    graph: Arc<dyn SocialGraphStore>,
    media: MediaUrls,
}

impl SocialService {
    pub fn new(graph: Arc<dyn SocialGraphStore>, media: MediaUrls) -> Self {
        Self { graph, media }
    }

    /// True when a new edge was created; following twice is a no-op.
    pub async fn follow(&self, follower_id: Uuid, following_id: Uuid) -> StoreResult<bool> {
        let created = self.graph.follow(follower_id, following_id).await?;
        if created {
            tracing::debug!(follower_id = %follower_id, following_id = %following_id, "followed");
        }
        Ok(created)
    }

    pub async fn unfollow(&self, follower_id: Uuid, following_id: Uuid) -> StoreResult<bool> {
        self.graph.unfollow(follower_id, following_id).await
    }

    pub async fn list_following(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<Profile>> {
        let users = self.graph.list_following(user_id, offset, limit).await?;
        Ok(users
            .into_iter()
            .map(|user| {
                let avatar_url = self.media.resolve(user.avatar_key.as_deref());
                Profile::from_user_with_url(user, avatar_url)
            })
            .collect())
    }

    pub async fn list_followers(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<Profile>> {
        let users = self.graph.list_followers(user_id, offset, limit).await?;
        Ok(users
            .into_iter()
            .map(|user| {
                let avatar_url = self.media.resolve(user.avatar_key.as_deref());
                Profile::from_user_with_url(user, avatar_url)
            })
            .collect())
    }
}
