use serde::Deserialize;

/// Weights of the heuristic token cost model
///
/// Defaults reproduce the historical hand-tuned weights. Every value is
/// in tokens (per item, per unit, or flat).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CostConfig {
    /// Flat cost of any unoptimized request
    pub base_tokens: u64,
    pub explicit_weight: u64,
    pub implicit_weight: u64,
    pub functional_weight: u64,
    pub non_functional_weight: u64,
    pub technical_weight: u64,
    /// Surcharge when a business model is known
    pub business_context_tokens: u64,
    /// Surcharge when the technical level is known
    pub technical_level_tokens: u64,
    pub constraint_weight: u64,
    pub goal_weight: u64,
    /// Flat cost of any optimized request
    pub optimized_base_tokens: u64,
    /// Optimized cost never drops below this
    pub min_optimized_tokens: u64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            base_tokens: 200,
            explicit_weight: 50,
            implicit_weight: 30,
            functional_weight: 40,
            non_functional_weight: 35,
            technical_weight: 45,
            business_context_tokens: 100,
            technical_level_tokens: 50,
            constraint_weight: 25,
            goal_weight: 30,
            optimized_base_tokens: 150,
            min_optimized_tokens: 50,
        }
    }
}
