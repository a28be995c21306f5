use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::with_public_avatar;
use crate::domain::post::{FeedPost, NewPost, Post, PostPatch, PostVisibility, ValidationError};
use crate::infra::storage::MediaUrls;
use crate::store::{PostStore, SocialGraphStore, StoreError};

#[derive(Debug, Error)]
pub enum PostError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostStore>,
    graph: Arc<dyn SocialGraphStore>,
    media: MediaUrls,
}

impl PostService {
    pub fn new(posts: Arc<dyn PostStore>, graph: Arc<dyn SocialGraphStore>, media: MediaUrls) -> Self {
        Self { posts, graph, media }
    }

    pub async fn create_post(&self, author_id: Uuid, post: NewPost) -> Result<FeedPost, PostError> {
        post.validate()?;
        let kind = post.content.kind();
        let created = self.posts.insert_post(author_id, post).await?;
        tracing::info!(post_id = %created.id, author_id = %author_id, kind = kind.as_db(), "post created");

        let feed_post = self
            .posts
            .get_feed_post(created.id)
            .await?
            .ok_or_else(|| StoreError::Query("created post vanished".to_string()))?;
        Ok(with_public_avatar(&self.media, feed_post))
    }

    /// Returns the post when `viewer_id` may see it under its visibility level.
    pub async fn get_post(
        &self,
        post_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> Result<Option<FeedPost>, PostError> {
        let Some(post) = self.posts.get_feed_post(post_id).await? else {
            return Ok(None);
        };

        let author_id = post.author.id;
        let visible = match post.visibility {
            PostVisibility::Public => true,
            PostVisibility::Private => viewer_id == Some(author_id),
            PostVisibility::Followers => match viewer_id {
                Some(viewer) if viewer == author_id => true,
                Some(viewer) => self.graph.is_following(viewer, author_id).await?,
                None => false,
            },
        };

        Ok(visible.then(|| with_public_avatar(&self.media, post)))
    }

    /// Applies a sparse update. `None` when the post is missing, deleted or not owned by `author_id`.
    pub async fn update_post(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        patch: PostPatch,
    ) -> Result<Option<FeedPost>, PostError> {
        let Some(post) = self.posts.load_post(post_id).await? else {
            return Ok(None);
        };
        if post.is_deleted || post.author_id != author_id {
            return Ok(None);
        }
        if patch.is_empty() {
            return self.get_post(post_id, Some(author_id)).await;
        }

        let mut updated = patch.apply_to(&post)?;
        updated.updated_at = OffsetDateTime::now_utc();
        if !self.posts.save_post(&updated).await? {
            return Ok(None);
        }

        self.get_post(post_id, Some(author_id)).await
    }

    pub async fn delete_post(&self, post_id: Uuid, author_id: Uuid) -> Result<bool, PostError> {
        match self.posts.load_post(post_id).await? {
            Some(post) if post.author_id == author_id => self.soft_delete(post).await,
            _ => Ok(false),
        }
    }

    /// Removes a post regardless of author.
    pub async fn takedown_post(&self, post_id: Uuid) -> Result<bool, PostError> {
        match self.posts.load_post(post_id).await? {
            Some(post) => {
                let removed = self.soft_delete(post).await?;
                if removed {
                    tracing::warn!(post_id = %post_id, "post taken down");
                }
                Ok(removed)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete(&self, mut post: Post) -> Result<bool, PostError> {
        if post.is_deleted {
            return Ok(false);
        }
        post.is_deleted = true;
        post.updated_at = OffsetDateTime::now_utc();
        Ok(self.posts.save_post(&post).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::post::{ContentPatch, ImageContent, PostContent, TextContent, TextPatch};
    use crate::domain::user::NewUser;
    use crate::store::{IdentityStore, MemoryStore};

    async fn seed_user(store: &MemoryStore, username: &str) -> Uuid {
        store
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                display_name: username.to_string(),
                password_hash: String::new(),
            })
            .await
            .unwrap()
            .id
    }

    fn service(store: &MemoryStore) -> PostService {
        PostService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            MediaUrls::new("https://cdn.example.com/media/").unwrap(),
        )
    }

    fn text(body: &str) -> NewPost {
        NewPost::new(PostContent::Text(TextContent {
            body: body.to_string(),
            title: None,
            mood: None,
        }))
    }

    #[tokio::test]
    async fn rejects_invalid_content() {
        let store = MemoryStore::new();
        let author = seed_user(&store, "ava").await;
        let err = service(&store)
            .create_post(author, text("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, PostError::Validation(_)));
    }

    #[tokio::test]
    async fn followers_only_posts_require_a_follow() {
        let store = MemoryStore::new();
        let author = seed_user(&store, "ava").await;
        let fan = seed_user(&store, "fan").await;
        let stranger = seed_user(&store, "stranger").await;
        store.follow(fan, author).await.unwrap();

        let posts = service(&store);
        let mut new_post = text("just for you");
        new_post.visibility = PostVisibility::Followers;
        let post = posts.create_post(author, new_post).await.unwrap();

        assert!(posts.get_post(post.id, Some(fan)).await.unwrap().is_some());
        assert!(posts.get_post(post.id, Some(author)).await.unwrap().is_some());
        assert!(posts.get_post(post.id, Some(stranger)).await.unwrap().is_none());
        assert!(posts.get_post(post.id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn only_the_author_can_edit() {
        let store = MemoryStore::new();
        let author = seed_user(&store, "ava").await;
        let other = seed_user(&store, "ben").await;
        let posts = service(&store);
        let post = posts.create_post(author, text("first")).await.unwrap();

        let patch = PostPatch {
            content: Some(ContentPatch::Text(TextPatch {
                body: Some("second".to_string()),
                ..TextPatch::default()
            })),
            ..PostPatch::default()
        };
        assert!(posts
            .update_post(post.id, other, patch.clone())
            .await
            .unwrap()
            .is_none());

        let updated = posts.update_post(post.id, author, patch).await.unwrap().unwrap();
        match updated.content {
            PostContent::Text(content) => assert_eq!(content.body, "second"),
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[tokio::test]
    async fn patch_of_another_kind_is_rejected() {
        let store = MemoryStore::new();
        let author = seed_user(&store, "ava").await;
        let posts = service(&store);
        let post = posts
            .create_post(
                author,
                NewPost::new(PostContent::Image(ImageContent {
                    image_urls: vec!["a.jpg".to_string()],
                    caption: None,
                })),
            )
            .await
            .unwrap();

        let patch = PostPatch {
            content: Some(ContentPatch::Text(TextPatch::default())),
            ..PostPatch::default()
        };
        let err = posts.update_post(post.id, author, patch).await.unwrap_err();
        assert!(matches!(
            err,
            PostError::Validation(ValidationError::KindMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn deleted_posts_disappear() {
        let store = MemoryStore::new();
        let author = seed_user(&store, "ava").await;
        let posts = service(&store);
        let post = posts.create_post(author, text("gone soon")).await.unwrap();

        assert!(posts.delete_post(post.id, author).await.unwrap());
        assert!(!posts.delete_post(post.id, author).await.unwrap());
        assert!(posts.get_post(post.id, Some(author)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn takedown_ignores_authorship() {
        let store = MemoryStore::new();
        let author = seed_user(&store, "ava").await;
        let posts = service(&store);
        let post = posts.create_post(author, text("spam")).await.unwrap();
        assert!(posts.takedown_post(post.id).await.unwrap());
        assert!(posts.get_post(post.id, None).await.unwrap().is_none());
    }
}
