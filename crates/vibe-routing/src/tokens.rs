//! Heuristic token cost model
//!
//! Weighted sums over requirement counts and context richness. The
//! weights live in [`CostConfig`]; anything smarter plugs in through
//! [`CostEstimator`].

use serde::Serialize;
use vibe_config::CostConfig;
use vibe_core::{Requirements, TokenSavings, UserContext};

/// A cost reduction applied to one slice of the baseline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedOptimization {
    pub name: String,
    /// Tokens the slice costs before optimization
    pub original_tokens: u64,
    /// Share of the slice saved; capped at 100, may be negative
    pub savings_percentage: f64,
}

/// A context blob handed over in compressed form
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompressedContextCost {
    pub original_tokens: u64,
    /// Achieved compression ratio, clamped to `[0, 1]`
    pub compression_ratio: f64,
}

/// Everything that shapes the optimized cost of a request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizedCostInput {
    pub optimizations: Vec<AppliedOptimization>,
    pub compressed_context: Option<CompressedContextCost>,
}

/// Estimates request cost before and after optimization
pub trait CostEstimator: Send + Sync {
    /// Cost of handing a request over unoptimized
    fn baseline(&self, requirements: &Requirements, context: &UserContext) -> u64;

    /// Cost of handing a request over after optimization
    fn optimized(&self, input: &OptimizedCostInput) -> u64;

    /// Savings of the optimized cost against the baseline
    fn savings(&self, baseline: u64, optimized: u64) -> TokenSavings {
        calculate_savings(baseline, optimized)
    }
}

/// Weighted-sum cost model
#[derive(Debug, Clone, Default)]
pub struct TokenCalculator {
    config: CostConfig,
}

impl TokenCalculator {
    pub const fn new(config: CostConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &CostConfig {
        &self.config
    }

    /// Per-item cost of the requirement lists and maps
    pub fn requirement_tokens(&self, requirements: &Requirements) -> u64 {
        let c = &self.config;
        count(requirements.explicit.len()) * c.explicit_weight
            + count(requirements.implicit.len()) * c.implicit_weight
            + count(requirements.functional.len()) * c.functional_weight
            + count(requirements.non_functional.len()) * c.non_functional_weight
            + count(requirements.technical.len()) * c.technical_weight
    }

    /// Surcharge for how much the user context says about the user
    pub fn context_tokens(&self, context: &UserContext) -> u64 {
        let c = &self.config;
        let mut tokens = count(context.constraints.len()) * c.constraint_weight
            + count(context.goals.len()) * c.goal_weight;

        if context.business_model.is_some() {
            tokens += c.business_context_tokens;
        }
        if context.technical_level.is_some() {
            tokens += c.technical_level_tokens;
        }

        tokens
    }

    /// Fixed base plus requirement and context costs
    pub fn calculate_baseline(&self, requirements: &Requirements, context: &UserContext) -> u64 {
        self.config.base_tokens + self.requirement_tokens(requirements) + self.context_tokens(context)
    }

    /// Optimized base plus every residual, never below the configured floor
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn calculate_optimized(&self, input: &OptimizedCostInput) -> u64 {
        let mut total = self.config.optimized_base_tokens as f64;

        for optimization in &input.optimizations {
            total += residual(optimization);
        }

        if let Some(compressed) = input.compressed_context {
            let ratio = if compressed.compression_ratio.is_nan() {
                0.0
            } else {
                compressed.compression_ratio.clamp(0.0, 1.0)
            };
            total += compressed.original_tokens as f64 * (1.0 - ratio);
        }

        (total.round().max(0.0) as u64).max(self.config.min_optimized_tokens)
    }
}

impl CostEstimator for TokenCalculator {
    fn baseline(&self, requirements: &Requirements, context: &UserContext) -> u64 {
        self.calculate_baseline(requirements, context)
    }

    fn optimized(&self, input: &OptimizedCostInput) -> u64 {
        self.calculate_optimized(input)
    }
}

/// Tokens left of a slice after its optimization
///
/// Savings cap at 100% so a slice never goes negative; a negative
/// percentage grows the slice.
#[allow(clippy::cast_precision_loss)]
fn residual(optimization: &AppliedOptimization) -> f64 {
    let percentage = if optimization.savings_percentage.is_nan() {
        0.0
    } else {
        optimization.savings_percentage.min(100.0)
    };
    optimization.original_tokens as f64 * (1.0 - percentage / 100.0)
}

/// Savings of `optimized` against `baseline`
///
/// `saved` and `percentage` go negative when optimization costs more.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn calculate_savings(baseline: u64, optimized: u64) -> TokenSavings {
    let saved = baseline as i64 - optimized as i64;
    let percentage = if baseline == 0 {
        0.0
    } else {
        saved as f64 / baseline as f64 * 100.0
    };

    TokenSavings {
        baseline,
        optimized,
        saved,
        percentage,
    }
}

fn count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}
