//! Retrying feed loader with last-request-wins semantics.
//!
//! Every `load`/`refresh` takes a new generation number. Results and state
//! transitions belonging to an older generation are dropped, so a slow
//! response can never overwrite a newer one.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use crate::app::feed::{FeedError, FeedMode, FeedPage, FeedRequest, FeedService};
use crate::client::{ClientError, RetryPolicy};

#[derive(Debug, Clone, PartialEq)]
pub struct FeedQuery {
    pub mode: FeedMode,
    pub offset: i64,
    pub limit: i64,
    pub interests: BTreeSet<String>,
}

impl FeedQuery {
    pub fn first_page(mode: FeedMode, limit: i64) -> Self {
        Self {
            mode,
            offset: 0,
            limit,
            interests: BTreeSet::new(),
        }
    }
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed(&self, query: &FeedQuery) -> Result<FeedPage, ClientError>;
}

/// Serves feeds straight from an in-process `FeedService`.
#[derive(Clone)]
pub struct LocalFeedSource {
    service: FeedService,
    viewer_id: Option<Uuid>,
}

impl LocalFeedSource {
    pub fn new(service: FeedService, viewer_id: Option<Uuid>) -> Self {
        Self { service, viewer_id }
    }
}

#[async_trait]
impl FeedSource for LocalFeedSource {
    async fn fetch_feed(&self, query: &FeedQuery) -> Result<FeedPage, ClientError> {
        let request = FeedRequest {
            mode: query.mode,
            viewer_id: self.viewer_id,
            interests: (!query.interests.is_empty()).then(|| query.interests.clone()),
            offset: query.offset,
            limit: query.limit,
        };
        self.service.get_feed(request).await.map_err(|err| match err {
            FeedError::ViewerRequired => ClientError::Unauthorized(err.to_string()),
            other => ClientError::Status {
                status: 400,
                message: other.to_string(),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedState {
    Idle,
    Loading { attempt: u32 },
    Ready(FeedPage),
    RetryWait { attempt: u32, delay: Duration },
    /// Retries exhausted; automatic loads pause until the cooldown ends.
    NetworkError { message: String },
    /// Non-retryable failure; only `refresh` leaves this state.
    Failed { message: String },
}

#[derive(Default)]
struct Control {
    generation: u64,
    cooldown_until: Option<Instant>,
    failed: Option<ClientError>,
}

pub struct FeedSession<S> {
    source: Arc<S>,
    policy: RetryPolicy,
    control: Mutex<Control>,
    state: watch::Sender<FeedState>,
}

impl<S: FeedSource> FeedSession<S> {
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(FeedState::Idle);
        Self {
            source: Arc::new(source),
            policy,
            control: Mutex::new(Control::default()),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> FeedState {
        self.state.borrow().clone()
    }

    /// Loads a page unless the session is cooling down or failed.
    pub async fn load(&self, query: FeedQuery) -> Result<FeedPage, ClientError> {
        {
            let mut control = self.control.lock();
            if let Some(err) = &control.failed {
                return Err(err.clone());
            }
            match control.cooldown_until {
                Some(until) if Instant::now() < until => return Err(ClientError::CoolingDown),
                Some(_) => control.cooldown_until = None,
                None => {}
            }
        }
        self.run(query).await
    }

    /// User-initiated reload: clears cooldown and failure.
    pub async fn refresh(&self, query: FeedQuery) -> Result<FeedPage, ClientError> {
        {
            let mut control = self.control.lock();
            control.cooldown_until = None;
            control.failed = None;
        }
        self.run(query).await
    }

    async fn run(&self, query: FeedQuery) -> Result<FeedPage, ClientError> {
        let generation = {
            let mut control = self.control.lock();
            control.generation += 1;
            control.generation
        };
        // Attempts belong to this generation only; a superseding request starts over.
        let mut failed: u32 = 0;

        loop {
            self.publish(generation, FeedState::Loading { attempt: failed + 1 });

            let result = self.source.fetch_feed(&query).await;

            let delay = {
                let mut control = self.control.lock();
                if control.generation != generation {
                    return Err(ClientError::Superseded);
                }

                match result {
                    Ok(page) => {
                        self.state.send_replace(FeedState::Ready(page.clone()));
                        return Ok(page);
                    }
                    Err(err) if err.is_transient() => {
                        failed += 1;
                        if !self.policy.should_retry(failed) {
                            control.cooldown_until = Some(Instant::now() + self.policy.cooldown);
                            tracing::warn!(error = %err, attempts = failed, "feed retries exhausted");
                            self.state.send_replace(FeedState::NetworkError {
                                message: err.to_string(),
                            });
                            return Err(err);
                        }

                        let delay = self.policy.backoff(failed);
                        self.state.send_replace(FeedState::RetryWait {
                            attempt: failed,
                            delay,
                        });
                        delay
                    }
                    Err(err) => {
                        control.failed = Some(err.clone());
                        self.state.send_replace(FeedState::Failed {
                            message: err.to_string(),
                        });
                        return Err(err);
                    }
                }
            };

            tokio::time::sleep(delay).await;
            if self.control.lock().generation != generation {
                return Err(ClientError::Superseded);
            }
        }
    }

    fn publish(&self, generation: u64, state: FeedState) {
        let control = self.control.lock();
        if control.generation == generation {
            self.state.send_replace(state);
        }
    }
}
