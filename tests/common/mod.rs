// tests/common/mod.rs
//
// In-memory fakes for the provider, publish backend and sleeper seams.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use grid_carbon_bot::compose::ComposedPost;
use grid_carbon_bot::error::DataError;
use grid_carbon_bot::publish::{
    BackendError, PostHandle, PublishBackend, SessionToken, Sleeper,
};
use grid_carbon_bot::zone::{
    normalize, RawBreakdown, RawIntensity, ZoneMetrics, ZoneMetricsProvider,
};

pub const TS: &str = "2024-05-01T13:00:00.000Z";

pub fn fr_raw() -> (RawIntensity, RawBreakdown) {
    (
        RawIntensity::new(42.0, TS),
        RawBreakdown::from_pairs([
            ("nuclear", 400.0),
            ("gas", 50.0),
            ("wind", 30.0),
            ("unknown", 20.0),
        ]),
    )
}

pub fn pl_raw() -> (RawIntensity, RawBreakdown) {
    (
        RawIntensity::new(650.0, TS),
        RawBreakdown::from_pairs([("coal", 800.0), ("wind", 100.0), ("unknown", 50.0)]),
    )
}

/// Serves normalized fixtures; zones listed in `failing` return a fetch error.
#[derive(Default)]
pub struct FakeProvider {
    zones: HashMap<String, (RawIntensity, RawBreakdown)>,
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zone(mut self, zone: &str, raw: (RawIntensity, RawBreakdown)) -> Self {
        self.zones.insert(zone.to_string(), raw);
        self
    }

    pub fn failing(mut self, zone: &str) -> Self {
        self.failing.push(zone.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ZoneMetricsProvider for FakeProvider {
    async fn fetch_zone_metrics(&self, zone_id: &str) -> Result<ZoneMetrics, DataError> {
        self.calls.lock().unwrap().push(zone_id.to_string());
        if self.failing.iter().any(|z| z == zone_id) {
            return Err(DataError::Fetch {
                zone: zone_id.to_string(),
                reason: "HTTP 503".into(),
            });
        }
        let (i, b) = self.zones.get(zone_id).ok_or_else(|| DataError::Fetch {
            zone: zone_id.to_string(),
            reason: "unknown zone".into(),
        })?;
        normalize(zone_id, i, b)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Scripted backend: each login/send pops the next scripted result; an empty
/// script means success.
#[derive(Default)]
pub struct FakeBackend {
    logins: Mutex<VecDeque<BackendError>>,
    sends: Mutex<VecDeque<BackendError>>,
    pub login_calls: Mutex<u32>,
    pub sent: Mutex<Vec<(String, ComposedPost)>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login_fails(self, errs: impl IntoIterator<Item = BackendError>) -> Self {
        self.logins.lock().unwrap().extend(errs);
        self
    }

    pub fn send_fails(self, errs: impl IntoIterator<Item = BackendError>) -> Self {
        self.sends.lock().unwrap().extend(errs);
        self
    }

    pub fn login_count(&self) -> u32 {
        *self.login_calls.lock().unwrap()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, p)| p.text.clone()).collect()
    }
}

#[async_trait]
impl PublishBackend for FakeBackend {
    async fn login(&self, identifier: &str, _password: &str) -> Result<SessionToken, BackendError> {
        let n = {
            let mut c = self.login_calls.lock().unwrap();
            *c += 1;
            *c
        };
        if let Some(e) = self.logins.lock().unwrap().pop_front() {
            return Err(e);
        }
        Ok(SessionToken {
            access_jwt: format!("jwt-{n}"),
            did: "did:plc:test".into(),
            handle: identifier.to_string(),
        })
    }

    async fn send(
        &self,
        token: &SessionToken,
        post: &ComposedPost,
    ) -> Result<PostHandle, BackendError> {
        if let Some(e) = self.sends.lock().unwrap().pop_front() {
            return Err(e);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((token.access_jwt.clone(), post.clone()));
        Ok(PostHandle {
            uri: format!("at://did:plc:test/app.bsky.feed.post/{}", sent.len()),
            cid: format!("cid{}", sent.len()),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Records requested delays instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    pub slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn secs(&self) -> Vec<u64> {
        self.slept.lock().unwrap().iter().map(Duration::as_secs).collect()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, d: Duration) {
        self.slept.lock().unwrap().push(d);
    }
}

pub fn rate_limited() -> BackendError {
    BackendError::RateLimited {
        retry_after_secs: None,
    }
}

pub fn arc<T>(v: T) -> Arc<T> {
    Arc::new(v)
}
