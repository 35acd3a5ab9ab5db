use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Log line format
    #[serde(default)]
    pub log_format: LogFormat,
    /// Service name attached to exported metrics
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Extra resource attributes, e.g. `deployment.environment`
    #[serde(default)]
    pub resource_attributes: BTreeMap<String, String>,
    /// OTLP metrics exporter; metrics are no-ops when unset
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            log_format: LogFormat::default(),
            service_name: default_service_name(),
            resource_attributes: BTreeMap::new(),
            exporter: None,
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// OTLP exporter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    /// OTLP endpoint URL
    pub endpoint: Url,
    /// Export protocol
    #[serde(default)]
    pub protocol: ExportProtocol,
    /// Export interval (e.g. "30s")
    #[serde(default = "default_export_interval", deserialize_with = "crate::duration::deserialize")]
    pub interval: Duration,
}

/// OTLP export protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportProtocol {
    /// gRPC (default)
    #[default]
    Grpc,
    /// HTTP/protobuf
    HttpProto,
}

fn default_log_filter() -> String {
    "info".to_owned()
}

fn default_service_name() -> String {
    "vibe".to_owned()
}

#[allow(clippy::missing_const_for_fn)]
fn default_export_interval() -> Duration {
    Duration::from_secs(30)
}
