// src/publish/mod.rs
//! Social backend seam, the authenticated session on top of it, and the post log.

pub mod bluesky;
pub mod post_log;
pub mod session;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::compose::ComposedPost;
pub use bluesky::BlueskyClient;
pub use post_log::PostLog;
pub use session::{AuthState, PublishSession, RetryPolicy, SessionStatus, SessionStatusHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostHandle {
    pub uri: String,
    pub cid: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub access_jwt: String,
    pub did: String,
    pub handle: String,
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("access_jwt", &"<redacted>")
            .field("did", &self.did)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Raw backend failure, before the session decides what it means.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("transport: {0}")]
    Transport(String),
}

#[async_trait]
pub trait PublishBackend: Send + Sync {
    async fn login(&self, identifier: &str, password: &str) -> Result<SessionToken, BackendError>;

    /// Submit one post. Must either create exactly one record or none.
    async fn send(
        &self,
        token: &SessionToken,
        post: &ComposedPost,
    ) -> Result<PostHandle, BackendError>;

    fn name(&self) -> &'static str;
}

/// Injectable delay so backoff is testable without real time.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}
