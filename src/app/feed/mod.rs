//! Feed aggregation: picks the fetchers for a mode, merges and deduplicates
//! their output, and caches finished pages per viewer.

pub mod fetchers;
pub mod merge;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::app::feed::fetchers::FeedFetchers;
use crate::app::with_public_avatar;
use crate::config::tuning::FeedLimits;
use crate::domain::post::FeedPost;
use crate::infra::cache::RedisCache;
use crate::infra::storage::MediaUrls;
use crate::store::IdentityStore;
use crate::Stores;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    Following,
    Trending,
    Personalized,
    Music,
    Collabs,
}

impl FeedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Following => "following",
            Self::Trending => "trending",
            Self::Personalized => "personalized",
            Self::Music => "music",
            Self::Collabs => "collabs",
        }
    }
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedMode {
    type Err = FeedError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "following" => Ok(Self::Following),
            "trending" => Ok(Self::Trending),
            "personalized" | "for_you" => Ok(Self::Personalized),
            "music" => Ok(Self::Music),
            "collabs" => Ok(Self::Collabs),
            other => Err(FeedError::UnknownMode(other.to_string())),
        }
    }
}

/// How the items of a page are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedOrdering {
    /// `created_at` descending.
    Recency,
    /// Engagement score descending.
    Engagement,
}

#[derive(Debug, Error, PartialEq)]
pub enum FeedError {
    #[error("unknown feed mode: {0}")]
    UnknownMode(String),
    #[error("sign in to view this feed")]
    ViewerRequired,
    #[error("{0}")]
    InvalidPage(String),
}

#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub mode: FeedMode,
    pub viewer_id: Option<Uuid>,
    /// Explicit interests; falls back to the viewer's profile when absent.
    pub interests: Option<BTreeSet<String>>,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPage {
    pub items: Vec<FeedPost>,
    pub mode: FeedMode,
    pub ordering: FeedOrdering,
    pub offset: i64,
    pub next_offset: Option<i64>,
}

#[derive(Clone)]
pub struct FeedService {
    fetchers: FeedFetchers,
    identity: Arc<dyn IdentityStore>,
    cache: Option<RedisCache>,
    media: MediaUrls,
    limits: FeedLimits,
}

impl FeedService {
    pub fn new(stores: Stores, cache: Option<RedisCache>, media: MediaUrls, limits: FeedLimits) -> Self {
        Self {
            fetchers: FeedFetchers::new(stores.posts, stores.graph),
            identity: stores.identity,
            cache,
            media,
            limits,
        }
    }

    pub fn limits(&self) -> FeedLimits {
        self.limits
    }

    pub async fn get_feed(&self, request: FeedRequest) -> Result<FeedPage, FeedError> {
        if request.limit < 1 || request.limit > self.limits.max_limit {
            return Err(FeedError::InvalidPage(format!(
                "limit must be between 1 and {}",
                self.limits.max_limit
            )));
        }
        if request.offset < 0 {
            return Err(FeedError::InvalidPage("offset must be >= 0".to_string()));
        }
        if request.mode == FeedMode::Following && request.viewer_id.is_none() {
            return Err(FeedError::ViewerRequired);
        }

        let interests = match (request.mode, &request.interests) {
            (FeedMode::Personalized, Some(interests)) => interests.clone(),
            (FeedMode::Personalized, None) => self.profile_interests(request.viewer_id).await,
            _ => BTreeSet::new(),
        };

        let cache_key = cache_key(&request, &interests);
        if let Some(cache) = &self.cache {
            if let Some(page) = cache.get_json::<FeedPage>(&cache_key).await {
                return Ok(page);
            }
        }

        let FeedRequest {
            mode,
            viewer_id,
            offset,
            limit,
            ..
        } = request;

        let (items, ordering) = match mode {
            FeedMode::Following => {
                let viewer_id = viewer_id.ok_or(FeedError::ViewerRequired)?;
                (
                    self.fetchers.following(viewer_id, offset, limit).await,
                    FeedOrdering::Recency,
                )
            }
            FeedMode::Trending => {
                let ranked = self.fetchers.trending(offset, limit).await;
                (ranked.posts, ranked.ordering)
            }
            FeedMode::Personalized => (
                self.fetchers
                    .personalized(viewer_id, &interests, offset, limit)
                    .await,
                FeedOrdering::Recency,
            ),
            FeedMode::Music => (self.fetchers.music(offset, limit).await, FeedOrdering::Recency),
            FeedMode::Collabs => (
                self.fetchers.collabs(offset, limit).await,
                FeedOrdering::Recency,
            ),
        };

        let mut items = merge::dedupe(items);
        if ordering == FeedOrdering::Recency {
            merge::newest_first(&mut items);
        }
        items.truncate(limit as usize);
        let items: Vec<FeedPost> = items
            .into_iter()
            .map(|post| with_public_avatar(&self.media, post))
            .collect();

        let next_offset = (items.len() as i64 == limit).then_some(offset + limit);
        let page = FeedPage {
            items,
            mode,
            ordering,
            offset,
            next_offset,
        };

        if let Some(cache) = &self.cache {
            cache
                .set_json(&cache_key, &page, self.limits.cache_ttl_seconds)
                .await;
        }

        Ok(page)
    }

    /// Drops every cached page for the viewer so the next read hits the stores.
    pub async fn refresh(&self, viewer_id: Uuid) -> anyhow::Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let removed = cache
            .delete_matching(&format!("feed:{}:*", viewer_id))
            .await?;
        tracing::debug!(viewer_id = %viewer_id, removed, "feed cache cleared");
        Ok(removed)
    }

    async fn profile_interests(&self, viewer_id: Option<Uuid>) -> BTreeSet<String> {
        let Some(viewer_id) = viewer_id else {
            return BTreeSet::new();
        };
        match self.identity.get_user(viewer_id).await {
            Ok(Some(user)) => user.interests,
            Ok(None) => BTreeSet::new(),
            Err(err) => {
                warn!(error = ?err, viewer_id = %viewer_id, "failed to load interests");
                BTreeSet::new()
            }
        }
    }
}

fn cache_key(request: &FeedRequest, interests: &BTreeSet<String>) -> String {
    let viewer = request
        .viewer_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "anon".to_string());
    let interests = interests.iter().cloned().collect::<Vec<_>>().join(",");
    format!(
        "feed:{}:{}:{}:{}:{}",
        viewer, request.mode, request.offset, request.limit, interests
    )
}
