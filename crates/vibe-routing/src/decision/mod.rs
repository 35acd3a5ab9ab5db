//! Multi-criteria handler selection
//!
//! Candidates pass through a fixed pipeline: availability, user
//! preference weighting, token-efficiency boosting, history blending,
//! confidence filtering, then selection. When nothing survives, or the
//! best survivor is too weak, the decision falls back to the default
//! handler with the trigger recorded.

mod ledger;

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;
use vibe_config::DecisionConfig;
use vibe_core::{OptimizationPlan, TokenSavings};

pub use ledger::{HandlerPerformance, PerformanceLedger};

/// Preference multipliers within this of 1 go unreported
const PREFERENCE_EPSILON: f64 = 1e-9;

/// Alternatives reported alongside a decision
const MAX_ALTERNATIVES: usize = 3;

/// How economical a handler is with tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenEfficiency {
    /// Static efficiency of the handler in `[0, 1]`
    pub efficiency: f64,
    /// Efficiency realized for this request in `[0, 1]`
    pub score: f64,
}

/// Observed performance attached to a candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceHistory {
    pub success_rate: Option<f64>,
    pub average_cost: Option<f64>,
    pub samples: u64,
}

/// A handler candidate with its running score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredOption {
    pub handler_id: String,
    /// Fit of the handler for the task in `[0, 1]`
    pub confidence: f64,
    /// Criteria-adjusted ranking value in `[0, 1]`
    pub composite_score: f64,
    pub token_efficiency: TokenEfficiency,
    #[serde(default)]
    pub performance_history: PerformanceHistory,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub token_optimized: bool,
    /// Preference weight applied, if preferences were respected
    #[serde(default)]
    pub preference_multiplier: Option<f64>,
}

impl ScoredOption {
    pub fn new(handler_id: impl Into<String>, confidence: f64, composite_score: f64) -> Self {
        Self {
            handler_id: handler_id.into(),
            confidence,
            composite_score,
            token_efficiency: TokenEfficiency::default(),
            performance_history: PerformanceHistory::default(),
            reasoning: String::new(),
            token_optimized: false,
            preference_multiplier: None,
        }
    }

    #[must_use]
    pub const fn with_token_efficiency(mut self, efficiency: f64, score: f64) -> Self {
        self.token_efficiency = TokenEfficiency { efficiency, score };
        self
    }
}

/// Criteria steering one selection; absent criteria skip their stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionCriteria {
    pub min_confidence: Option<f64>,
    pub optimize_for_tokens: bool,
    pub respect_user_preferences: bool,
    /// Handler id to preference weight; 1.0 is neutral
    pub user_preferences: BTreeMap<String, f64>,
    pub check_handler_availability: bool,
    /// User the decision is made for, kept in the decision log
    pub user_id: Option<String>,
}

impl DecisionCriteria {
    /// Criteria as configured, without user-specific data
    pub fn from_config(config: &DecisionConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            optimize_for_tokens: config.optimize_for_tokens,
            respect_user_preferences: config.respect_user_preferences,
            user_preferences: BTreeMap::new(),
            check_handler_availability: config.check_handler_availability,
            user_id: None,
        }
    }

    fn flags(&self) -> CriteriaFlags {
        CriteriaFlags {
            min_confidence: self.min_confidence.is_some(),
            optimize_for_tokens: self.optimize_for_tokens,
            respect_user_preferences: self.respect_user_preferences,
            check_handler_availability: self.check_handler_availability,
        }
    }
}

/// Why a decision fell back to the default handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FallbackTrigger {
    /// No candidate was offered or available
    NoOptions,
    /// Candidates existed but none scored high enough
    LowConfidence,
}

/// A candidate that lost, with its final score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeOption {
    pub handler_id: String,
    pub composite_score: f64,
}

/// How a decision was reached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    /// Candidates offered to the engine
    pub options_considered: usize,
    /// Candidates left after availability and confidence filtering
    pub options_eligible: usize,
    pub fallback_trigger: Option<FallbackTrigger>,
    /// Pipeline stages that ran
    pub criteria_applied: Vec<String>,
    /// Preference weight applied to the winner
    pub preference_multiplier: Option<f64>,
    /// Performance history of the winner
    pub performance_history: Option<PerformanceHistory>,
}

/// The terminal routing artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub decision_id: Uuid,
    pub handler_id: String,
    pub composite_score: f64,
    pub confidence: f64,
    pub selection_reason: String,
    pub fallback: bool,
    pub decision_metadata: DecisionMetadata,
    pub token_optimized: bool,
    /// Savings of the plan the decision was made with, if any
    pub token_savings: Option<TokenSavings>,
    /// Best losing candidates, best first
    pub alternatives: Vec<AlternativeOption>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
struct CriteriaFlags {
    min_confidence: bool,
    optimize_for_tokens: bool,
    respect_user_preferences: bool,
    check_handler_availability: bool,
}

/// Summary of a decision kept in the rolling log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionLogEntry {
    pub decision_id: Uuid,
    pub handler_id: String,
    pub confidence: f64,
    pub fallback: bool,
    pub user_id: Option<String>,
    criteria: CriteriaFlags,
}

/// How often each criterion was requested across the retained log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CriteriaUsage {
    pub min_confidence: u64,
    pub optimize_for_tokens: u64,
    pub respect_user_preferences: u64,
    pub check_handler_availability: u64,
}

/// Aggregate decision statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecisionStats {
    /// Decisions made since startup
    pub total_decisions: u64,
    /// Fallback decisions made since startup
    pub total_fallbacks: u64,
    /// Decisions currently retained in the log
    pub retained: usize,
    /// Share of retained decisions that fell back
    pub fallback_rate: f64,
    /// Mean confidence of retained decisions
    pub average_confidence: f64,
    /// Retained decisions per handler
    pub handler_distribution: BTreeMap<String, u64>,
    pub criteria_usage: CriteriaUsage,
}

/// Selects handlers and keeps the feedback state that informs selection
#[derive(Debug)]
pub struct RoutingDecisionEngine {
    default_handler: String,
    low_confidence_floor: f64,
    token_boost_weight: f64,
    history_weight: f64,
    min_history_samples: u64,
    log_capacity: usize,
    ledger: PerformanceLedger,
    availability: DashMap<String, bool>,
    log: Mutex<VecDeque<DecisionLogEntry>>,
    total_decisions: AtomicU64,
    total_fallbacks: AtomicU64,
}

impl RoutingDecisionEngine {
    pub fn new(config: &DecisionConfig) -> Self {
        Self {
            default_handler: config.default_handler.clone(),
            low_confidence_floor: config.low_confidence_floor,
            token_boost_weight: unit(config.token_boost_weight),
            history_weight: unit(config.history_weight),
            min_history_samples: config.min_history_samples,
            log_capacity: config.decision_log_size.max(1),
            ledger: PerformanceLedger::new(),
            availability: DashMap::new(),
            log: Mutex::new(VecDeque::new()),
            total_decisions: AtomicU64::new(0),
            total_fallbacks: AtomicU64::new(0),
        }
    }

    pub fn default_handler(&self) -> &str {
        &self.default_handler
    }

    /// Pick the best candidate or synthesize a fallback
    ///
    /// Every decision, fallback or not, is appended to the decision log.
    pub fn select_optimal_route(
        &self,
        options: Vec<ScoredOption>,
        criteria: &DecisionCriteria,
        plan: Option<&OptimizationPlan>,
    ) -> RoutingDecision {
        let options_considered = options.len();
        let mut applied = Vec::new();

        let mut options: Vec<ScoredOption> = options
            .into_iter()
            .map(|mut o| {
                o.confidence = unit(o.confidence);
                o.composite_score = unit(o.composite_score);
                o
            })
            .collect();

        if criteria.check_handler_availability {
            applied.push("handler_availability".to_owned());
            options.retain(|o| {
                let available = self.is_available(&o.handler_id);
                if !available {
                    tracing::debug!(handler = %o.handler_id, "skipping unavailable handler");
                }
                available
            });
        }
        let available = options.len();

        if criteria.respect_user_preferences {
            applied.push("user_preferences".to_owned());
            for option in &mut options {
                let multiplier = criteria
                    .user_preferences
                    .get(&option.handler_id)
                    .copied()
                    .filter(|m| m.is_finite() && *m >= 0.0)
                    .unwrap_or(1.0);
                option.composite_score = unit(option.composite_score * multiplier);
                option.preference_multiplier = Some(multiplier);
            }
        }

        if criteria.optimize_for_tokens {
            applied.push("token_optimization".to_owned());
            for option in &mut options {
                let efficiency = unit(option.token_efficiency.efficiency);
                let headroom = 1.0 - option.composite_score;
                option.composite_score = unit((headroom * self.token_boost_weight).mul_add(efficiency, option.composite_score));
                option.token_optimized = true;
            }
        }

        let mut history_applied = false;
        for option in &mut options {
            let performance = self.ledger.snapshot(&option.handler_id);
            option.performance_history = PerformanceHistory {
                success_rate: performance.success_rate,
                average_cost: performance.average_cost,
                samples: performance.total_requests,
            };

            if performance.total_requests >= self.min_history_samples
                && let Some(rate) = performance.success_rate
            {
                history_applied = true;
                option.composite_score =
                    unit(option.composite_score.mul_add(1.0 - self.history_weight, self.history_weight * rate));
            }
        }
        if history_applied {
            applied.push("performance_history".to_owned());
        }

        let evaluated = ranked_alternatives(&options, None);

        if let Some(min) = criteria.min_confidence {
            applied.push("min_confidence".to_owned());
            options.retain(|o| o.composite_score >= min);
        }

        let metadata = DecisionMetadata {
            options_considered,
            options_eligible: options.len(),
            criteria_applied: applied,
            ..DecisionMetadata::default()
        };
        let token_savings = plan.and_then(|p| p.token_savings);

        let decision = match best_option(&options) {
            None if available == 0 => {
                let reason = if options_considered == 0 {
                    "no handler candidates were offered".to_owned()
                } else {
                    format!("none of the {options_considered} handler candidates is available")
                };
                self.fallback(FallbackTrigger::NoOptions, reason, metadata, token_savings, evaluated)
            }
            None => {
                let min = criteria.min_confidence.unwrap_or_default();
                let reason = format!("no handler reached the minimum confidence of {min:.2}");
                self.fallback(FallbackTrigger::LowConfidence, reason, metadata, token_savings, evaluated)
            }
            Some(best) if best.composite_score < self.low_confidence_floor => {
                let reason = format!(
                    "best handler '{}' scored {:.2}, below the confidence floor of {:.2}",
                    best.handler_id, best.composite_score, self.low_confidence_floor
                );
                self.fallback(FallbackTrigger::LowConfidence, reason, metadata, token_savings, evaluated)
            }
            Some(best) => self.winner(best, metadata, token_savings, &options),
        };

        self.log_decision(&decision, criteria);
        decision
    }

    fn winner(
        &self,
        best: &ScoredOption,
        mut metadata: DecisionMetadata,
        token_savings: Option<TokenSavings>,
        options: &[ScoredOption],
    ) -> RoutingDecision {
        metadata.preference_multiplier = best.preference_multiplier;
        metadata.performance_history = Some(best.performance_history);

        let decision = RoutingDecision {
            decision_id: Uuid::new_v4(),
            handler_id: best.handler_id.clone(),
            composite_score: best.composite_score,
            confidence: best.confidence,
            selection_reason: selection_reason(best, &metadata),
            fallback: false,
            decision_metadata: metadata,
            token_optimized: best.token_optimized,
            token_savings,
            alternatives: ranked_alternatives(options, Some(&best.handler_id)),
        };

        tracing::info!(
            decision_id = %decision.decision_id,
            handler = %decision.handler_id,
            score = decision.composite_score,
            confidence = decision.confidence,
            alternatives = decision.alternatives.len(),
            "handler selected"
        );

        decision
    }

    fn fallback(
        &self,
        trigger: FallbackTrigger,
        reason: String,
        mut metadata: DecisionMetadata,
        token_savings: Option<TokenSavings>,
        alternatives: Vec<AlternativeOption>,
    ) -> RoutingDecision {
        metadata.fallback_trigger = Some(trigger);

        let decision = RoutingDecision {
            decision_id: Uuid::new_v4(),
            handler_id: self.default_handler.clone(),
            composite_score: 0.0,
            confidence: 0.0,
            selection_reason: format!("{reason}; routed to default handler '{}'", self.default_handler),
            fallback: true,
            decision_metadata: metadata,
            token_optimized: false,
            token_savings,
            alternatives,
        };

        tracing::warn!(
            decision_id = %decision.decision_id,
            handler = %decision.handler_id,
            trigger = %trigger,
            "falling back to default handler"
        );

        decision
    }

    fn log_decision(&self, decision: &RoutingDecision, criteria: &DecisionCriteria) {
        self.total_decisions.fetch_add(1, Ordering::Relaxed);
        if decision.fallback {
            self.total_fallbacks.fetch_add(1, Ordering::Relaxed);
        }

        let entry = DecisionLogEntry {
            decision_id: decision.decision_id,
            handler_id: decision.handler_id.clone(),
            confidence: decision.confidence,
            fallback: decision.fallback,
            user_id: criteria.user_id.clone(),
            criteria: criteria.flags(),
        };

        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        if log.len() >= self.log_capacity {
            log.pop_front();
        }
        log.push_back(entry);
    }

    /// Feed an outcome into the performance ledger
    pub fn update_handler_performance(&self, handler_id: &str, success: bool, cost: u64) {
        self.ledger.record(handler_id, success, cost);
        tracing::debug!(handler = %handler_id, success, cost, "handler performance updated");
    }

    pub fn performance(&self, handler_id: &str) -> HandlerPerformance {
        self.ledger.snapshot(handler_id)
    }

    pub const fn ledger(&self) -> &PerformanceLedger {
        &self.ledger
    }

    /// Mark a handler available or unavailable; unknown handlers are available
    pub fn set_handler_availability(&self, handler_id: &str, available: bool) {
        self.availability.insert(handler_id.to_owned(), available);
        tracing::info!(handler = %handler_id, available, "handler availability changed");
    }

    pub fn is_available(&self, handler_id: &str) -> bool {
        self.availability.get(handler_id).is_none_or(|a| *a)
    }

    /// Find a retained decision
    pub fn lookup(&self, decision_id: Uuid) -> Option<DecisionLogEntry> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|e| e.decision_id == decision_id)
            .cloned()
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> DecisionStats {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);

        let mut stats = DecisionStats {
            total_decisions: self.total_decisions.load(Ordering::Relaxed),
            total_fallbacks: self.total_fallbacks.load(Ordering::Relaxed),
            retained: log.len(),
            ..DecisionStats::default()
        };

        if log.is_empty() {
            return stats;
        }

        let mut fallbacks = 0_u64;
        let mut confidence = 0.0;
        for entry in log.iter() {
            if entry.fallback {
                fallbacks += 1;
            }
            confidence += entry.confidence;
            *stats.handler_distribution.entry(entry.handler_id.clone()).or_default() += 1;

            let usage = &mut stats.criteria_usage;
            usage.min_confidence += u64::from(entry.criteria.min_confidence);
            usage.optimize_for_tokens += u64::from(entry.criteria.optimize_for_tokens);
            usage.respect_user_preferences += u64::from(entry.criteria.respect_user_preferences);
            usage.check_handler_availability += u64::from(entry.criteria.check_handler_availability);
        }

        let n = log.len() as f64;
        stats.fallback_rate = fallbacks as f64 / n;
        stats.average_confidence = confidence / n;
        stats
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Highest score wins; exact ties go to the earlier candidate
fn best_option(options: &[ScoredOption]) -> Option<&ScoredOption> {
    options.iter().reduce(|best, option| {
        if option.composite_score.total_cmp(&best.composite_score).is_gt() {
            option
        } else {
            best
        }
    })
}

/// Top candidates by score, excluding `winner`, ties in candidate order
fn ranked_alternatives(options: &[ScoredOption], winner: Option<&str>) -> Vec<AlternativeOption> {
    let mut ranked: Vec<_> = options
        .iter()
        .filter(|o| winner != Some(o.handler_id.as_str()))
        .map(|o| AlternativeOption {
            handler_id: o.handler_id.clone(),
            composite_score: o.composite_score,
        })
        .collect();
    ranked.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
    ranked.truncate(MAX_ALTERNATIVES);
    ranked
}

fn selection_reason(best: &ScoredOption, metadata: &DecisionMetadata) -> String {
    let mut reason = format!(
        "selected '{}' with score {:.2} (confidence {:.2})",
        best.handler_id, best.composite_score, best.confidence
    );

    if let Some(multiplier) = best.preference_multiplier
        && (multiplier - 1.0).abs() > PREFERENCE_EPSILON
    {
        let _ = write!(reason, ", user preference x{multiplier:.2}");
    }
    if best.token_optimized {
        let _ = write!(reason, ", token efficiency {:.2}", best.token_efficiency.efficiency);
    }
    if let Some(rate) = best.performance_history.success_rate {
        let _ = write!(
            reason,
            ", {:.0}% success over {} outcomes",
            rate * 100.0,
            best.performance_history.samples
        );
    }
    if metadata.options_considered > 1 {
        let _ = write!(reason, "; {} candidates considered", metadata.options_considered);
    }
    if !best.reasoning.is_empty() {
        let _ = write!(reason, "; {}", best.reasoning);
    }

    reason
}
