use serde::Deserialize;

/// A registered specialist handler
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerConfig {
    /// Unique handler identifier
    pub id: String,
    /// Pattern ids this handler specializes in
    #[serde(default)]
    pub domains: Vec<String>,
    /// Free-form capability tags matched against requirements
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// How economical the handler is with tokens (0.0 to 1.0)
    #[serde(default = "default_token_efficiency")]
    pub token_efficiency: f64,
    /// Hand the full requirement set instead of the essential subset
    #[serde(default)]
    pub requires_full_requirements: bool,
}

#[allow(clippy::missing_const_for_fn)]
fn default_token_efficiency() -> f64 {
    0.5
}
