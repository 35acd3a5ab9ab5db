use std::path::PathBuf;

use serde::Deserialize;

/// Domain pattern source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternSourceConfig {
    /// TOML pattern file; the built-in library is used when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}
