use serde::Deserialize;

/// Handler selection criteria and tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DecisionConfig {
    /// Handler that receives fallback decisions
    pub default_handler: String,
    /// Best score below this triggers a low-confidence fallback
    pub low_confidence_floor: f64,
    /// Options scoring below this are dropped before selection
    pub min_confidence: Option<f64>,
    /// Boost handlers by token efficiency
    pub optimize_for_tokens: bool,
    /// Apply per-user handler preference weights
    pub respect_user_preferences: bool,
    /// Drop handlers marked unavailable
    pub check_handler_availability: bool,
    /// Maximum share of the remaining headroom a fully efficient handler gains
    pub token_boost_weight: f64,
    /// Weight of observed success rate when blending history into scores
    pub history_weight: f64,
    /// Outcomes needed before history affects scores
    pub min_history_samples: u64,
    /// Decisions retained for statistics and outcome lookup
    pub decision_log_size: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            default_handler: "general".to_owned(),
            low_confidence_floor: 0.5,
            min_confidence: None,
            optimize_for_tokens: true,
            respect_user_preferences: true,
            check_handler_availability: false,
            token_boost_weight: 0.15,
            history_weight: 0.2,
            min_history_samples: 3,
            decision_log_size: 1000,
        }
    }
}
