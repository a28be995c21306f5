pub mod app;
pub mod client;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod store;

use std::sync::Arc;

use crate::app::auth::AuthService;
use crate::app::feed::FeedService;
use crate::app::posts::PostService;
use crate::app::rewards::RewardLedger;
use crate::app::social::SocialService;
use crate::app::users::UserService;
use crate::config::tuning::{FeedLimits, RewardRules};
use crate::infra::{cache::RedisCache, db::Db, storage::MediaUrls};
use crate::store::{
    IdentityStore, MemoryStore, PgStore, PostStore, RewardStore, SocialGraphStore,
};

/// Handles to every storage seam, shared by all services.
#[derive(Clone)]
pub struct Stores {
    pub posts: Arc<dyn PostStore>,
    pub graph: Arc<dyn SocialGraphStore>,
    pub identity: Arc<dyn IdentityStore>,
    pub rewards: Arc<dyn RewardStore>,
}

impl Stores {
    pub fn postgres(db: Db) -> Self {
        let store = Arc::new(PgStore::new(db));
        Self {
            posts: store.clone(),
            graph: store.clone(),
            identity: store.clone(),
            rewards: store,
        }
    }

    pub fn memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            posts: store.clone(),
            graph: store.clone(),
            identity: store.clone(),
            rewards: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub db: Option<Db>,
    pub cache: Option<RedisCache>,
    pub media: MediaUrls,
    pub admin_token: Option<String>,
    pub early_access_open: bool,
    pub paseto_access_key: [u8; 32],
    pub paseto_refresh_key: [u8; 32],
    pub access_ttl_minutes: u64,
    pub refresh_ttl_days: u64,
    pub feed_limits: FeedLimits,
    pub reward_rules: RewardRules,
}

impl AppState {
    pub fn auth_service(&self) -> AuthService {
        AuthService::new(
            self.stores.identity.clone(),
            self.paseto_access_key,
            self.paseto_refresh_key,
            self.access_ttl_minutes,
            self.refresh_ttl_days,
            self.early_access_open,
        )
    }

    pub fn user_service(&self) -> UserService {
        UserService::new(self.stores.identity.clone(), self.media.clone())
    }

    pub fn post_service(&self) -> PostService {
        PostService::new(
            self.stores.posts.clone(),
            self.stores.graph.clone(),
            self.media.clone(),
        )
    }

    pub fn social_service(&self) -> SocialService {
        SocialService::new(self.stores.graph.clone(), self.media.clone())
    }

    pub fn feed_service(&self) -> FeedService {
        FeedService::new(
            self.stores.clone(),
            self.cache.clone(),
            self.media.clone(),
            self.feed_limits,
        )
    }

    pub fn reward_ledger(&self) -> RewardLedger {
        RewardLedger::new(self.stores.rewards.clone(), self.reward_rules)
    }
}
