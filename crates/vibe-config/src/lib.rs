#![allow(clippy::must_use_candidate)]

pub mod cache;
pub mod compression;
pub mod cost;
pub mod decision;
mod duration;
pub mod handlers;
mod loader;
pub mod patterns;
pub mod telemetry;

use serde::Deserialize;

pub use cache::*;
pub use compression::*;
pub use cost::*;
pub use decision::*;
pub use handlers::*;
pub use patterns::*;
pub use telemetry::{ExportProtocol, ExporterConfig, LogFormat, TelemetryConfig};

/// Top-level vibe router configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optimization cache sizing and expiry
    #[serde(default)]
    pub cache: CacheConfig,
    /// Context compression limits
    #[serde(default)]
    pub compression: CompressionConfig,
    /// Heuristic cost model weights
    #[serde(default)]
    pub cost: CostConfig,
    /// Handler selection criteria
    #[serde(default)]
    pub decision: DecisionConfig,
    /// Where domain patterns are loaded from
    #[serde(default)]
    pub patterns: PatternSourceConfig,
    /// Registered handlers
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
    /// Logging and metrics export
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
