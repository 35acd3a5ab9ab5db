//! Per-user handler preference weights
//!
//! Outcomes nudge a user's weight for the handler that served them.
//! Weights multiply composite scores, so 1.0 is neutral.

use std::collections::BTreeMap;

use dashmap::DashMap;

/// Lowest weight an outcome stream can push a handler to
pub const MIN_PREFERENCE: f64 = 0.5;

/// Highest weight an outcome stream can push a handler to
pub const MAX_PREFERENCE: f64 = 1.5;

const SUCCESS_STEP: f64 = 0.05;
const FAILURE_STEP: f64 = -0.1;
const SATISFACTION_WEIGHT: f64 = 0.1;

/// A change to one handler weight
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceUpdate {
    pub handler_id: String,
    pub delta: f64,
}

impl PreferenceUpdate {
    /// Derive the weight change from an outcome
    ///
    /// Satisfaction is centred on 0.5 and clamped to `[0, 1]`.
    pub fn from_outcome(handler_id: impl Into<String>, success: bool, satisfaction: Option<f64>) -> Self {
        let mut delta = if success { SUCCESS_STEP } else { FAILURE_STEP };
        if let Some(satisfaction) = satisfaction.filter(|s| s.is_finite()) {
            delta += (satisfaction.clamp(0.0, 1.0) - 0.5) * SATISFACTION_WEIGHT;
        }

        Self {
            handler_id: handler_id.into(),
            delta,
        }
    }
}

/// Where learned preference weights live
pub trait PreferenceStore: Send + Sync {
    /// Handler weights learned for a user
    fn preferences(&self, user_id: &str) -> BTreeMap<String, f64>;

    /// Apply an update, returning the new weight
    fn apply(&self, user_id: &str, update: &PreferenceUpdate) -> f64;
}

/// Process-local preference store
#[derive(Debug, Default)]
pub struct InMemoryPreferenceStore {
    users: DashMap<String, BTreeMap<String, f64>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for InMemoryPreferenceStore {
    fn preferences(&self, user_id: &str) -> BTreeMap<String, f64> {
        self.users.get(user_id).map(|p| p.clone()).unwrap_or_default()
    }

    fn apply(&self, user_id: &str, update: &PreferenceUpdate) -> f64 {
        let mut prefs = self.users.entry(user_id.to_owned()).or_default();
        let weight = prefs.entry(update.handler_id.clone()).or_insert(1.0);
        *weight = (*weight + update.delta).clamp(MIN_PREFERENCE, MAX_PREFERENCE);
        let weight = *weight;
        drop(prefs);

        tracing::debug!(user = %user_id, handler = %update.handler_id, weight, "preference updated");
        weight
    }
}
