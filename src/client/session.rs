//! Client-side session and identity state.
//!
//! `SessionProvider` is the only writer of [`SessionState`]. Readers take
//! [`SessionContext`] snapshots or watch the channel for changes. Auth
//! events are broadcast to subscribers and handled in one place, which
//! re-hydrates or clears the cached profile.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::client::retry::{with_retry, RetryPolicy};
use crate::client::ClientError;
use crate::domain::session::TokenPair;
use crate::domain::user::{Profile, ProfilePatch};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub password: String,
}

/// Remote identity operations the provider relies on.
#[async_trait]
pub trait AuthBackend: Send + Sync + 'static {
    async fn sign_up(&self, request: &SignUpRequest) -> Result<Profile, ClientError>;
    async fn sign_in(&self, identifier: &str, password: &str) -> Result<TokenPair, ClientError>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError>;
    async fn sign_out(&self, refresh_token: &str) -> Result<(), ClientError>;
    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, ClientError>;
    async fn update_profile(
        &self,
        access_token: &str,
        patch: &ProfilePatch,
    ) -> Result<Profile, ClientError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated(Profile),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub session: Option<TokenPair>,
    pub profile: Option<Profile>,
}

/// Immutable view handed to readers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    pub session: Option<TokenPair>,
    pub profile: Option<Profile>,
}

impl SessionContext {
    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.session
            .as_ref()
            .map(|session| session.access_token.as_str())
    }
}

struct Inner<B> {
    backend: B,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<AuthEvent>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    /// Bumped by every sign-out. Tokens obtained under an older epoch are dropped.
    epoch: Mutex<u64>,
    refresh_margin: Duration,
    retry: RetryPolicy,
}

pub struct SessionProvider<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for SessionProvider<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: AuthBackend> SessionProvider<B> {
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, Duration::from_secs(60), RetryPolicy::default())
    }

    /// `refresh_margin` is how long before access-token expiry the refresh fires.
    pub fn with_options(backend: B, refresh_margin: Duration, retry: RetryPolicy) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                backend,
                state,
                events,
                refresh_task: Mutex::new(None),
                epoch: Mutex::new(0),
                refresh_margin,
                retry,
            }),
        }
    }

    pub fn context(&self) -> SessionContext {
        let state = self.inner.state.borrow();
        SessionContext {
            session: state.session.clone(),
            profile: state.profile.clone(),
        }
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    pub async fn sign_in(&self, identifier: &str, password: &str) -> Result<SessionContext, ClientError> {
        let epoch = self.epoch();
        let tokens = self.inner.backend.sign_in(identifier, password).await?;
        self.establish(epoch, tokens, AuthEvent::SignedIn).await;
        Ok(self.context())
    }

    /// Creates the account, then signs in with the same credentials.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<SessionContext, ClientError> {
        self.inner.backend.sign_up(&request).await?;
        self.sign_in(&request.username, &request.password).await
    }

    pub async fn sign_out(&self) -> Result<(), ClientError> {
        *self.inner.epoch.lock() += 1;
        self.cancel_refresh();
        let session = self.inner.state.borrow().session.clone();
        if let Some(session) = session {
            if let Err(err) = self.inner.backend.sign_out(&session.refresh_token).await {
                tracing::warn!(error = %err, "remote sign-out failed; clearing local session");
            }
        }
        self.dispatch(AuthEvent::SignedOut).await;
        Ok(())
    }

    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<Profile, ClientError> {
        let access_token = self.access_token()?;
        let profile = self
            .inner
            .backend
            .update_profile(&access_token, &patch)
            .await?;
        self.dispatch(AuthEvent::UserUpdated(profile.clone())).await;
        Ok(profile)
    }

    pub async fn refresh_profile(&self) -> Result<Profile, ClientError> {
        let access_token = self.access_token()?;
        let profile = self.inner.backend.fetch_profile(&access_token).await?;
        self.inner.state.send_modify(|state| {
            if state.session.is_some() {
                state.profile = Some(profile.clone());
            }
        });
        Ok(profile)
    }

    /// Rotates tokens now. An invalid refresh token signs the user out.
    pub async fn refresh_session(&self) -> Result<(), ClientError> {
        let refresh_token = match &self.inner.state.borrow().session {
            Some(session) => session.refresh_token.clone(),
            None => return Err(ClientError::Unauthorized("not signed in".into())),
        };

        let epoch = self.epoch();
        let backend = &self.inner.backend;
        let result = with_retry(&self.inner.retry, || backend.refresh(&refresh_token)).await;
        if self.epoch() != epoch {
            tracing::debug!("signed out while refreshing, discarding result");
            return Ok(());
        }
        match result {
            Ok(tokens) => {
                self.establish(epoch, tokens, AuthEvent::TokenRefreshed).await;
                Ok(())
            }
            Err(err @ ClientError::Unauthorized(_)) => {
                tracing::info!("refresh token rejected, signing out");
                self.cancel_refresh();
                self.dispatch(AuthEvent::SignedOut).await;
                Err(err)
            }
            Err(err) => {
                tracing::warn!(error = %err, "session refresh failed");
                Err(err)
            }
        }
    }

    fn access_token(&self) -> Result<String, ClientError> {
        self.inner
            .state
            .borrow()
            .session
            .as_ref()
            .map(|session| session.access_token.clone())
            .ok_or_else(|| ClientError::Unauthorized("not signed in".into()))
    }

    fn epoch(&self) -> u64 {
        *self.inner.epoch.lock()
    }

    /// Stores the tokens unless a sign-out happened since `epoch` was read.
    async fn establish(&self, epoch: u64, tokens: TokenPair, event: AuthEvent) {
        {
            let current = self.inner.epoch.lock();
            if *current != epoch {
                return;
            }
            self.schedule_refresh(tokens.access_expires_at);
            self.inner.state.send_modify(|state| state.session = Some(tokens));
        }
        self.dispatch(event).await;
    }

    /// Applies the event's effect on the cached profile, then broadcasts it.
    async fn dispatch(&self, event: AuthEvent) {
        match &event {
            AuthEvent::SignedIn | AuthEvent::TokenRefreshed => {
                if let Err(err) = self.refresh_profile().await {
                    tracing::warn!(error = %err, "failed to hydrate profile");
                }
            }
            AuthEvent::UserUpdated(profile) => {
                self.inner.state.send_modify(|state| {
                    if state.session.is_some() {
                        state.profile = Some(profile.clone());
                    }
                });
            }
            AuthEvent::SignedOut => {
                self.inner.state.send_replace(SessionState::default());
            }
        }
        let _ = self.inner.events.send(event);
    }

    fn schedule_refresh(&self, access_expires_at: OffsetDateTime) {
        let remaining = access_expires_at - OffsetDateTime::now_utc();
        let delay = Duration::try_from(remaining)
            .unwrap_or(Duration::ZERO)
            .saturating_sub(self.inner.refresh_margin);

        let weak: Weak<Inner<B>> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let provider = SessionProvider { inner };
            // The replacement timer is scheduled by the refresh itself.
            provider.inner.refresh_task.lock().take();
            if let Err(err) = provider.refresh_session().await {
                tracing::warn!(error = %err, "scheduled token refresh failed");
            }
        });

        if let Some(previous) = self.inner.refresh_task.lock().replace(task) {
            previous.abort();
        }
    }

    fn cancel_refresh(&self) {
        if let Some(task) = self.inner.refresh_task.lock().take() {
            task.abort();
        }
    }
}
