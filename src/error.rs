//! Error taxonomy for one posting cycle.
//!
//! Every variant here is fatal to the cycle (or to one division within it), never
//! to the process. Startup/config failures use `anyhow` instead.

use thiserror::Error;

/// Upstream zone data was missing, malformed or could not be fetched.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    #[error("zone {zone}: missing field `{field}`")]
    MissingField { zone: String, field: &'static str },

    #[error("zone {zone}: invalid field `{field}`: {reason}")]
    InvalidField {
        zone: String,
        field: &'static str,
        reason: String,
    },

    #[error("zone {zone}: fetch failed: {reason}")]
    Fetch { zone: String, reason: String },
}

impl DataError {
    pub fn zone(&self) -> &str {
        match self {
            Self::MissingField { zone, .. }
            | Self::InvalidField { zone, .. }
            | Self::Fetch { zone, .. } => zone,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("scope `{scope}` has {available} eligible zone(s), need at least 2")]
    InsufficientZones { scope: String, available: usize },

    #[error("anchor zone `{anchor}` is not eligible in scope `{scope}`")]
    AnchorNotEligible { anchor: String, scope: String },

    #[error("unknown division `{0}`")]
    UnknownDivision(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompositionError {
    #[error("max post length {0} is too small (need at least 4)")]
    InvalidMaxLength(usize),

    #[error("attribution {0} anchor is empty")]
    EmptyAnchor(&'static str),
}

/// Authentication failures. `RetriesExhausted` is retryable on the next cycle;
/// the rest need operator attention.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("login rejected: {0}")]
    Rejected(String),

    #[error("login protocol error: {0}")]
    Protocol(String),

    #[error("login still rate limited after {retries} retries")]
    RetriesExhausted { retries: u32 },
}

impl AuthError {
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("publish attempted without an authenticated session")]
    NotAuthenticated,

    #[error("post rejected by backend: {0}")]
    Rejected(String),

    #[error("publish transport failure: {0}")]
    Transport(String),

    /// Backend refused the session token; the session is now unauthenticated.
    #[error("session expired during publish: {0}")]
    SessionExpired(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Wraps every stage error of a cycle so the loop can log one thing.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl CycleError {
    /// Stage label used in logs and the failure counter.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Data(_) => "fetch",
            Self::Selection(_) => "select",
            Self::Composition(_) => "compose",
            Self::Auth(e) if e.is_retries_exhausted() => "auth_retries",
            Self::Auth(_) => "auth",
            Self::Publish(PublishError::Auth(e)) if e.is_retries_exhausted() => "auth_retries",
            Self::Publish(PublishError::Auth(_)) => "auth",
            Self::Publish(_) => "publish",
        }
    }
}
