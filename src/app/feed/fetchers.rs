//! Per-source feed reads. Every fetcher fails soft: store errors are logged
//! and turn into an empty (or fallback) result so one broken source never
//! blanks the whole feed.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::app::feed::{merge, FeedOrdering};
use crate::domain::post::{FeedPost, PostKind};
use crate::store::{PostFilter, PostQuery, PostStore, SocialGraphStore, VisibilityScope};

const COLLAB_KEYWORD: &str = "collab";

/// Posts plus the ordering the source actually applied.
#[derive(Debug, Clone)]
pub struct Ranked {
    pub posts: Vec<FeedPost>,
    pub ordering: FeedOrdering,
}

#[derive(Clone)]
pub struct FeedFetchers {
    posts: Arc<dyn PostStore>,
    graph: Arc<dyn SocialGraphStore>,
}

impl FeedFetchers {
    pub fn new(posts: Arc<dyn PostStore>, graph: Arc<dyn SocialGraphStore>) -> Self {
        Self { posts, graph }
    }

    /// Posts by accounts the viewer follows. Following nobody yields nothing.
    pub async fn following(&self, viewer_id: Uuid, offset: i64, limit: i64) -> Vec<FeedPost> {
        let following = match self.graph.following_ids(viewer_id).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = ?err, viewer_id = %viewer_id, "failed to load follow set");
                return Vec::new();
            }
        };
        if following.is_empty() {
            return Vec::new();
        }

        let query = PostQuery::all_kinds(
            PostFilter::Authors(following),
            VisibilityScope::Followed,
            offset,
            limit,
        );
        self.run(&query, "following").await
    }

    /// Engagement-ranked public posts, or newest public posts when ranking is unavailable.
    pub async fn trending(&self, offset: i64, limit: i64) -> Ranked {
        match self
            .posts
            .engagement_ranked(&PostKind::ALL, offset, limit)
            .await
        {
            Ok(posts) => Ranked {
                posts,
                ordering: FeedOrdering::Engagement,
            },
            Err(err) => {
                warn!(error = %err, "engagement ranking unavailable, using recency");
                let query = PostQuery::all_kinds(
                    PostFilter::Everyone,
                    VisibilityScope::PublicOnly,
                    offset,
                    limit,
                );
                Ranked {
                    posts: self.run(&query, "trending").await,
                    ordering: FeedOrdering::Recency,
                }
            }
        }
    }

    /// Interest-matched posts topped up from following and trending, or the
    /// two sources in alternating turns when there are no interests.
    ///
    /// The page is cut from one merged sequence that is rebuilt from the top
    /// for every request, so consecutive offsets never overlap.
    pub async fn personalized(
        &self,
        viewer_id: Option<Uuid>,
        interests: &BTreeSet<String>,
        offset: i64,
        limit: i64,
    ) -> Vec<FeedPost> {
        let window = offset.saturating_add(limit);
        let window_size = window.max(0) as usize;

        let matched = if interests.is_empty() {
            Vec::new()
        } else {
            let query = PostQuery::all_kinds(
                PostFilter::TagsOverlap(interests.clone()),
                VisibilityScope::PublicOnly,
                0,
                window,
            );
            self.run(&query, "personalized").await
        };

        let sequence = if matched.len() >= window_size {
            matched
        } else {
            let (following, trending) = tokio::join!(
                self.following_for(viewer_id, 0, window),
                self.trending(0, window),
            );
            merge::interleave(matched, following, trending.posts, window_size)
        };

        sequence
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect()
    }

    /// Public reels that carry an audio track.
    pub async fn music(&self, offset: i64, limit: i64) -> Vec<FeedPost> {
        let query = PostQuery {
            kinds: vec![PostKind::Reel],
            filter: PostFilter::WithAudio,
            scope: VisibilityScope::PublicOnly,
            offset,
            limit,
        };
        self.run(&query, "music").await
    }

    /// Curated collaboration posts, or a keyword search when the collection is missing.
    pub async fn collabs(&self, offset: i64, limit: i64) -> Vec<FeedPost> {
        match self.posts.collab_posts(offset, limit).await {
            Ok(posts) => posts,
            Err(err) => {
                warn!(error = %err, "collabs collection unavailable, searching by keyword");
                let query = PostQuery::all_kinds(
                    PostFilter::Keyword(COLLAB_KEYWORD.to_string()),
                    VisibilityScope::PublicOnly,
                    offset,
                    limit,
                );
                self.run(&query, "collabs").await
            }
        }
    }

    async fn following_for(&self, viewer_id: Option<Uuid>, offset: i64, limit: i64) -> Vec<FeedPost> {
        match viewer_id {
            Some(viewer_id) => self.following(viewer_id, offset, limit).await,
            None => Vec::new(),
        }
    }

    async fn run(&self, query: &PostQuery, source: &'static str) -> Vec<FeedPost> {
        match self.posts.query_posts(query).await {
            Ok(posts) => posts,
            Err(err) => {
                warn!(error = ?err, source, "feed query failed");
                Vec::new()
            }
        }
    }
}
