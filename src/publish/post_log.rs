// src/publish/post_log.rs
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Append-only record of published posts: `[<rfc3339>] <text>` plus a blank line.
#[derive(Debug, Clone)]
pub struct PostLog {
    path: PathBuf,
}

impl PostLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, ts: DateTime<Utc>, text: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let entry = format!(
            "[{}] {text}\n\n",
            ts.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        f.write_all(entry.as_bytes()).await?;
        f.flush().await
    }

    /// Fire-and-forget variant: failures are logged, never returned.
    pub async fn record(&self, text: &str) {
        if let Err(e) = self.append(Utc::now(), text).await {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to save post");
        }
    }
}
