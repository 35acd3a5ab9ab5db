use serde::Deserialize;

/// Limits applied when reducing a requirement set to its essentials
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressionConfig {
    /// Explicit requirements kept (floored at 1)
    #[serde(default = "default_max_explicit")]
    pub max_essential_explicit: usize,
    /// Implicit requirements kept (floored at 1)
    #[serde(default = "default_max_implicit")]
    pub max_essential_implicit: usize,
    /// Compression records retained for statistics
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_essential_explicit: default_max_explicit(),
            max_essential_implicit: default_max_implicit(),
            history_limit: default_history_limit(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_explicit() -> usize {
    5
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_implicit() -> usize {
    8
}

#[allow(clippy::missing_const_for_fn)]
fn default_history_limit() -> usize {
    1000
}
