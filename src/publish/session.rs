// src/publish/session.rs
//! Process-wide authenticated session.
//!
//! State machine: `Unauthenticated → Authenticating → Authenticated`, and back to
//! `Unauthenticated` when login fails or the backend rejects the token. Logins are
//! serialized by a gate, so concurrent `ensure_authenticated` calls log in once.

use metrics::counter;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BackendError, PostHandle, PostLog, PublishBackend, SessionToken, Sleeper};
use crate::compose::ComposedPost;
use crate::config::PublishConfig;
use crate::error::{AuthError, PublishError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub identity_handle: String,
    pub state: AuthState,
    pub authenticated: bool,
    /// Rate-limit retries used by the latest login.
    pub retry_count: u32,
    /// Latest backoff slept, in seconds.
    pub backoff_seconds: u64,
}

/// Login retry budget: `initial_backoff`, doubled per retry, at most `max_retries` retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(10),
            max_retries: 5,
        }
    }
}

impl From<&PublishConfig> for RetryPolicy {
    fn from(cfg: &PublishConfig) -> Self {
        Self {
            initial_backoff: Duration::from_secs(cfg.initial_backoff_secs),
            max_retries: cfg.max_retries,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }
}

#[derive(Debug)]
struct Inner {
    status: SessionStatus,
    token: Option<SessionToken>,
}

/// Read-only view of the session for the status endpoint.
#[derive(Debug, Clone)]
pub struct SessionStatusHandle(Arc<Mutex<Inner>>);

impl SessionStatusHandle {
    pub fn snapshot(&self) -> SessionStatus {
        self.0.lock().expect("session mutex poisoned").status.clone()
    }
}

pub struct PublishSession {
    backend: Arc<dyn PublishBackend>,
    sleeper: Arc<dyn Sleeper>,
    identifier: String,
    password: String,
    policy: RetryPolicy,
    post_log: Option<PostLog>,
    login_gate: tokio::sync::Mutex<()>,
    inner: Arc<Mutex<Inner>>,
}

impl PublishSession {
    pub fn new(
        backend: Arc<dyn PublishBackend>,
        sleeper: Arc<dyn Sleeper>,
        identifier: impl Into<String>,
        password: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        let identifier = identifier.into();
        let status = SessionStatus {
            identity_handle: identifier.clone(),
            state: AuthState::Unauthenticated,
            authenticated: false,
            retry_count: 0,
            backoff_seconds: 0,
        };
        Self {
            backend,
            sleeper,
            identifier,
            password: password.into(),
            policy,
            post_log: None,
            login_gate: tokio::sync::Mutex::new(()),
            inner: Arc::new(Mutex::new(Inner {
                status,
                token: None,
            })),
        }
    }

    /// Append every published post to `log`.
    pub fn with_post_log(mut self, log: PostLog) -> Self {
        self.post_log = Some(log);
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status.clone()
    }

    pub fn status_handle(&self) -> SessionStatusHandle {
        SessionStatusHandle(Arc::clone(&self.inner))
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().token.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("session mutex poisoned")
    }

    fn update(&self, f: impl FnOnce(&mut Inner)) {
        let mut inner = self.lock();
        f(&mut inner);
        inner.status.authenticated = inner.token.is_some();
    }

    /// Log in unless already authenticated. Idempotent; safe to call concurrently.
    pub async fn ensure_authenticated(&self) -> Result<(), AuthError> {
        let _gate = self.login_gate.lock().await;
        if self.is_authenticated() {
            return Ok(());
        }

        self.update(|i| {
            i.status.state = AuthState::Authenticating;
            i.status.retry_count = 0;
            i.status.backoff_seconds = 0;
        });

        let mut retries: u32 = 0;
        loop {
            counter!("grid_bot_login_attempts_total").increment(1);
            let err = match self.backend.login(&self.identifier, &self.password).await {
                Ok(token) => {
                    tracing::info!(
                        handle = %token.handle,
                        did = %token.did,
                        retries,
                        "logged in to {}",
                        self.backend.name()
                    );
                    self.update(|i| {
                        i.token = Some(token);
                        i.status.state = AuthState::Authenticated;
                    });
                    return Ok(());
                }
                Err(e) => e,
            };

            match err {
                BackendError::RateLimited { .. } if retries < self.policy.max_retries => {
                    retries += 1;
                    let delay = self.policy.delay_for(retries);
                    self.update(|i| {
                        i.status.retry_count = retries;
                        i.status.backoff_seconds = delay.as_secs();
                    });
                    tracing::warn!(
                        attempt = retries,
                        max_retries = self.policy.max_retries,
                        delay_secs = delay.as_secs(),
                        "login rate limited, backing off"
                    );
                    counter!("grid_bot_login_backoffs_total").increment(1);
                    self.sleeper.sleep(delay).await;
                }
                BackendError::RateLimited { .. } => {
                    self.reset_to_unauthenticated();
                    return Err(AuthError::RetriesExhausted { retries });
                }
                BackendError::Unauthorized(m) | BackendError::Rejected(m) => {
                    self.reset_to_unauthenticated();
                    return Err(AuthError::Rejected(m));
                }
                BackendError::Transport(m) => {
                    self.reset_to_unauthenticated();
                    return Err(AuthError::Protocol(m));
                }
            }
        }
    }

    fn reset_to_unauthenticated(&self) {
        self.update(|i| {
            i.token = None;
            i.status.state = AuthState::Unauthenticated;
        });
    }

    /// Drop `failed` if it is still the current token; a newer login is kept.
    fn invalidate(&self, failed: &SessionToken) {
        self.update(|i| {
            if i.token.as_ref() == Some(failed) {
                i.token = None;
                i.status.state = AuthState::Unauthenticated;
            }
        });
    }

    /// Send one post with the current session. Never retries.
    pub async fn publish(&self, post: &ComposedPost) -> Result<PostHandle, PublishError> {
        let token = self.lock().token.clone().ok_or(PublishError::NotAuthenticated)?;

        match self.backend.send(&token, post).await {
            Ok(handle) => {
                tracing::info!(uri = %handle.uri, chars = post.char_len(), "post published");
                if let Some(log) = &self.post_log {
                    log.record(&post.text).await;
                }
                Ok(handle)
            }
            Err(BackendError::Unauthorized(m)) => {
                self.invalidate(&token);
                Err(PublishError::SessionExpired(m))
            }
            Err(BackendError::RateLimited { .. }) => {
                Err(PublishError::Transport("rate limited".to_string()))
            }
            Err(BackendError::Rejected(m)) => Err(PublishError::Rejected(m)),
            Err(BackendError::Transport(m)) => Err(PublishError::Transport(m)),
        }
    }

    /// Authenticate, publish, and on an expired session re-authenticate and
    /// publish exactly once more.
    pub async fn publish_with_reauth(
        &self,
        post: &ComposedPost,
    ) -> Result<PostHandle, PublishError> {
        self.ensure_authenticated().await?;
        match self.publish(post).await {
            Err(PublishError::SessionExpired(reason)) => {
                tracing::warn!(%reason, "session expired mid-publish, re-authenticating once");
                self.ensure_authenticated().await?;
                self.publish(post).await
            }
            other => other,
        }
    }

    /// Forget the session token (process teardown).
    pub fn logout(&self) {
        self.reset_to_unauthenticated();
    }
}
