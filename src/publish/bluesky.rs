// src/publish/bluesky.rs
//! AT Protocol XRPC backend: `createSession`, `resolveHandle` and `createRecord`.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{BackendError, PostHandle, PublishBackend, SessionToken};
use crate::compose::{Annotation, ComposedPost};
use crate::config::PublishConfig;

const POST_COLLECTION: &str = "app.bsky.feed.post";

#[derive(Clone)]
pub struct BlueskyClient {
    http: Client,
    service_url: String,
    langs: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRsp {
    access_jwt: String,
    did: String,
    handle: String,
}

#[derive(Deserialize)]
struct CreateRecordRsp {
    uri: String,
    cid: String,
}

#[derive(Deserialize)]
struct ResolveHandleRsp {
    did: String,
}

impl BlueskyClient {
    pub fn new(cfg: &PublishConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("grid-carbon-bot/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("building Bluesky http client")?;
        Ok(Self {
            http,
            service_url: cfg.service_url.trim_end_matches('/').to_string(),
            langs: cfg.langs.clone(),
        })
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{method}", self.service_url)
    }

    /// Decode a success body, or classify the failure.
    async fn read<T: for<'de> Deserialize<'de>>(
        method: &str,
        rsp: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, BackendError> {
        let rsp = rsp.map_err(|e| BackendError::Transport(format!("{method}: {e}")))?;
        let status = rsp.status();
        if status.is_success() {
            return rsp
                .json::<T>()
                .await
                .map_err(|e| BackendError::Transport(format!("{method}: invalid response: {e}")));
        }
        let retry_after = rsp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body: Value = rsp.json().await.unwrap_or(Value::Null);
        Err(classify(method, status, &body, retry_after))
    }

    async fn resolve_handle(
        &self,
        token: &SessionToken,
        handle: &str,
    ) -> Result<String, BackendError> {
        let method = "com.atproto.identity.resolveHandle";
        let rsp = self
            .http
            .get(self.xrpc(method))
            .bearer_auth(&token.access_jwt)
            .query(&[("handle", handle)])
            .send()
            .await;
        Self::read::<ResolveHandleRsp>(method, rsp).await.map(|r| r.did)
    }

    /// Facet JSON for every annotation that can be resolved. Mentions whose handle
    /// does not resolve are dropped; an auth failure aborts the send.
    async fn facets_json(
        &self,
        token: &SessionToken,
        post: &ComposedPost,
    ) -> Result<Vec<Value>, BackendError> {
        let mut out = Vec::with_capacity(post.facets.len());
        for facet in &post.facets {
            let feature = match &facet.annotation {
                Annotation::Mention { handle } => match self.resolve_handle(token, handle).await {
                    Ok(did) => json!({"$type": "app.bsky.richtext.facet#mention", "did": did}),
                    Err(e @ BackendError::Unauthorized(_)) => return Err(e),
                    Err(e) => {
                        tracing::warn!(
                            %handle,
                            error = %e,
                            "mention handle did not resolve, posting without facet"
                        );
                        continue;
                    }
                },
                Annotation::Link { uri } => {
                    json!({"$type": "app.bsky.richtext.facet#link", "uri": uri})
                }
            };
            out.push(json!({
                "index": {"byteStart": facet.byte_start, "byteEnd": facet.byte_end},
                "features": [feature],
            }));
        }
        Ok(out)
    }
}

/// `app.bsky.feed.post` record body.
pub fn record_json(text: &str, facets: Vec<Value>, langs: &[String], created_at: &str) -> Value {
    let mut record = json!({
        "$type": POST_COLLECTION,
        "text": text,
        "createdAt": created_at,
    });
    if !facets.is_empty() {
        record["facets"] = Value::Array(facets);
    }
    if !langs.is_empty() {
        record["langs"] = json!(langs);
    }
    record
}

/// Map an XRPC failure onto the session's error vocabulary.
pub fn classify(
    method: &str,
    status: StatusCode,
    body: &Value,
    retry_after_secs: Option<u64>,
) -> BackendError {
    let code = body.get("error").and_then(Value::as_str).unwrap_or_default();
    let message = body.get("message").and_then(Value::as_str).unwrap_or_default();
    let detail = match (code.is_empty(), message.is_empty()) {
        (true, true) => format!("{method}: HTTP {status}"),
        (false, true) => format!("{method}: {code}"),
        (true, false) => format!("{method}: {message}"),
        (false, false) => format!("{method}: {code}: {message}"),
    };

    if status == StatusCode::TOO_MANY_REQUESTS || code == "RateLimitExceeded" {
        return BackendError::RateLimited { retry_after_secs };
    }
    let auth_code = matches!(
        code,
        "ExpiredToken"
            | "InvalidToken"
            | "AuthenticationRequired"
            | "AccountTakedown"
            | "AuthFactorTokenRequired"
    );
    if status == StatusCode::UNAUTHORIZED || auth_code {
        return BackendError::Unauthorized(detail);
    }
    if status.is_client_error() {
        return BackendError::Rejected(detail);
    }
    BackendError::Transport(detail)
}

#[async_trait]
impl PublishBackend for BlueskyClient {
    async fn login(&self, identifier: &str, password: &str) -> Result<SessionToken, BackendError> {
        let method = "com.atproto.server.createSession";
        let rsp = self
            .http
            .post(self.xrpc(method))
            .json(&json!({"identifier": identifier, "password": password}))
            .send()
            .await;
        let s = Self::read::<CreateSessionRsp>(method, rsp).await?;
        Ok(SessionToken {
            access_jwt: s.access_jwt,
            did: s.did,
            handle: s.handle,
        })
    }

    async fn send(
        &self,
        token: &SessionToken,
        post: &ComposedPost,
    ) -> Result<PostHandle, BackendError> {
        let facets = self.facets_json(token, post).await?;
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let record = record_json(&post.text, facets, &self.langs, &created_at);

        let method = "com.atproto.repo.createRecord";
        let rsp = self
            .http
            .post(self.xrpc(method))
            .bearer_auth(&token.access_jwt)
            .json(&json!({
                "repo": token.did,
                "collection": POST_COLLECTION,
                "record": record,
            }))
            .send()
            .await;
        let r = Self::read::<CreateRecordRsp>(method, rsp).await?;
        Ok(PostHandle { uri: r.uri, cid: r.cid })
    }

    fn name(&self) -> &'static str {
        "bluesky"
    }
}
