// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod bot;
pub mod compose;
pub mod config;
pub mod error;
pub mod matchup;
pub mod publish;
pub mod telemetry;
pub mod zone;

// ---- Re-exports for stable public API ----
pub use crate::bot::{CycleReport, GridBot, ScopeOutcome, ScopeResult};
pub use crate::compose::{compose, ComposedPost};
pub use crate::config::{BotConfig, Credentials};
pub use crate::error::CycleError;
pub use crate::matchup::{select, Matchup};
pub use crate::publish::{PublishBackend, PublishSession};
pub use crate::zone::{normalize, ZoneMetrics, ZoneMetricsProvider};
