use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Overall complexity of a request
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

/// Broad classification of who is asking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserType {
    #[default]
    General,
    Entrepreneur,
    SmallBusiness,
    Developer,
    Designer,
    Student,
    Enterprise,
    Creator,
}

/// How comfortable the user is with technical detail
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TechnicalLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

/// Expected audience or traffic scale
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Scale {
    Small,
    #[default]
    Medium,
    Large,
}

/// Budget bracket stated or inferred for the work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BudgetLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// How the user intends to make (or not make) money
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BusinessModel {
    Ecommerce,
    Subscription,
    Advertising,
    Services,
    Marketplace,
    Nonprofit,
    Personal,
}

/// Structured requirement set derived from a request by ingestion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    /// Requirements the user stated, order-preserving and unique
    pub explicit: Vec<String>,
    /// Requirements inferred from the request
    pub implicit: Vec<String>,
    /// Functional capabilities requested
    pub functional: Vec<String>,
    /// Non-functional qualities (performance, security, ...)
    pub non_functional: BTreeMap<String, String>,
    /// Technical stack choices keyed by layer
    pub technical: BTreeMap<String, String>,
    /// Domain hint from ingestion, if any
    pub domain: Option<String>,
    pub complexity: Complexity,
}

impl Requirements {
    /// Replace the explicit list, dropping duplicates but keeping first-seen order
    pub fn with_explicit<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.explicit = items.into_iter().map(Into::into).collect();
        self.dedup_explicit();
        self
    }

    /// Remove duplicate explicit requirements in place, keeping the first occurrence
    pub fn dedup_explicit(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.explicit.retain(|item| seen.insert(item.clone()));
    }

    /// Total number of requirement items across every category
    pub fn item_count(&self) -> usize {
        self.explicit.len()
            + self.implicit.len()
            + self.functional.len()
            + self.non_functional.len()
            + self.technical.len()
    }
}

/// A normalized request as handed over by the ingestion layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizedRequest {
    /// Free-text description of the work
    pub description: String,
    /// Keywords extracted during ingestion
    pub keywords: Vec<String>,
    pub requirements: Requirements,
}

impl NormalizedRequest {
    /// Lowercased text used for keyword matching
    pub fn search_text(&self) -> String {
        let mut text = self.description.to_lowercase();
        for part in self
            .keywords
            .iter()
            .chain(&self.requirements.explicit)
            .chain(&self.requirements.functional)
        {
            text.push(' ');
            text.push_str(&part.to_lowercase());
        }
        if let Some(domain) = &self.requirements.domain {
            text.push(' ');
            text.push_str(&domain.to_lowercase());
        }
        text
    }
}

/// A previous interaction recorded by the session store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PastInteraction {
    /// Kind of interaction (e.g. `code_review`, `landing_page`)
    pub interaction_type: String,
    /// Pattern or domain the interaction was routed to
    pub domain: Option<String>,
    /// Technical level observed during the interaction
    pub technical_level: Option<TechnicalLevel>,
}

/// Per-user context owned by the session store
///
/// Every field is optional so partially populated sessions deserialize
/// cleanly; the context analyzer fills the gaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserContext {
    pub user_id: Option<String>,
    pub user_type: Option<UserType>,
    pub technical_level: Option<TechnicalLevel>,
    pub scale: Option<Scale>,
    pub budget: Option<BudgetLevel>,
    pub business_model: Option<BusinessModel>,
    pub goals: Vec<String>,
    pub constraints: Vec<String>,
    /// Handler preference weights (1.0 is neutral)
    pub preferences: BTreeMap<String, f64>,
    pub history: Vec<PastInteraction>,
}

/// Size-bounded subset of a requirement set
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct EssentialRequirements {
    pub explicit: Vec<String>,
    pub implicit: Vec<String>,
    pub domain: Option<String>,
    pub complexity: Complexity,
}

/// Requirement defaults merged from matched patterns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternDefaults {
    pub implicit: Vec<String>,
    pub technical: BTreeMap<String, String>,
}

impl PatternDefaults {
    pub fn is_empty(&self) -> bool {
        self.implicit.is_empty() && self.technical.is_empty()
    }
}

/// Compact projection of a user context
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextSummary {
    pub user_type: UserType,
    pub technical_level: TechnicalLevel,
    pub scale: Scale,
    pub budget: BudgetLevel,
    /// First stated goal, or `general-purpose`
    pub primary_goal: String,
}

/// Baseline versus optimized cost accounting
///
/// `saved` and `percentage` go negative when optimization regresses cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenSavings {
    pub baseline: u64,
    pub optimized: u64,
    pub saved: i64,
    pub percentage: f64,
}

impl TokenSavings {
    /// Whether the optimized cost is strictly below the baseline
    pub fn is_improvement(&self) -> bool {
        self.saved > 0
    }
}

/// Result of compressing and costing a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationPlan {
    pub essential_requirements: EssentialRequirements,
    pub pattern_defaults: PatternDefaults,
    pub context_summary: ContextSummary,
    /// Achieved compression ratio in `[0, 1]`
    pub compression_ratio: f64,
    pub token_savings: Option<TokenSavings>,
    pub recommendations: Vec<String>,
    /// Pattern ids that contributed defaults
    pub patterns_used: Vec<String>,
}

impl OptimizationPlan {
    pub fn savings_percentage(&self) -> Option<f64> {
        self.token_savings.map(|s| s.percentage)
    }
}
