//! Handler descriptors and task-fit assessment

use serde::{Deserialize, Serialize};
use vibe_config::HandlerConfig;
use vibe_core::Requirements;

use crate::analysis::ContextAnalysis;
use crate::patterns::DomainMatch;

const BASE_CONFIDENCE: f64 = 0.3;
const PRIMARY_DOMAIN_BONUS: f64 = 0.5;
const ALTERNATIVE_DOMAIN_BONUS: f64 = 0.2;
const CAPABILITY_WEIGHT: f64 = 0.2;

/// A specialist that can receive routed requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerDescriptor {
    pub id: String,
    /// Pattern ids the handler specializes in
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Static token economy in `[0, 1]`
    #[serde(default = "default_token_efficiency")]
    pub token_efficiency: f64,
    /// Wants the full requirement set rather than the essential subset
    #[serde(default)]
    pub requires_full_requirements: bool,
}

impl HandlerDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            domains: Vec::new(),
            capabilities: Vec::new(),
            token_efficiency: default_token_efficiency(),
            requires_full_requirements: false,
        }
    }

    #[must_use]
    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn with_token_efficiency(mut self, efficiency: f64) -> Self {
        self.token_efficiency = efficiency;
        self
    }

    #[must_use]
    pub const fn requiring_full_requirements(mut self) -> Self {
        self.requires_full_requirements = true;
        self
    }
}

impl From<&HandlerConfig> for HandlerDescriptor {
    fn from(config: &HandlerConfig) -> Self {
        Self {
            id: config.id.clone(),
            domains: config.domains.clone(),
            capabilities: config.capabilities.clone(),
            token_efficiency: config.token_efficiency,
            requires_full_requirements: config.requires_full_requirements,
        }
    }
}

const fn default_token_efficiency() -> f64 {
    0.5
}

/// What a handler is assessed against
#[derive(Debug, Clone, Copy)]
pub struct AssessmentInput<'a> {
    pub domain: &'a DomainMatch,
    pub requirements: &'a Requirements,
    pub analysis: &'a ContextAnalysis,
}

/// A handler's fit for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    /// Fit in `[0, 1]`
    pub confidence: f64,
    pub reasoning: String,
}

/// Judges how well a handler fits a request
pub trait HandlerAssessor: Send + Sync {
    fn assess(&self, handler: &HandlerDescriptor, input: &AssessmentInput<'_>) -> Assessment;
}

/// Scores handlers by domain membership and capability overlap
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainAffinityAssessor;

impl HandlerAssessor for DomainAffinityAssessor {
    fn assess(&self, handler: &HandlerDescriptor, input: &AssessmentInput<'_>) -> Assessment {
        let mut confidence = BASE_CONFIDENCE;
        let mut reasons = Vec::new();

        let serves = |domain: &str| handler.domains.iter().any(|d| d.eq_ignore_ascii_case(domain));

        if !input.domain.fallback && serves(&input.domain.domain) {
            confidence += PRIMARY_DOMAIN_BONUS;
            reasons.push(format!("specializes in {}", input.domain.domain));
        } else if let Some(alt) = input
            .domain
            .alternatives
            .iter()
            .find(|a| a.score > 0.0 && serves(&a.domain))
        {
            confidence += ALTERNATIVE_DOMAIN_BONUS;
            reasons.push(format!("covers related domain {}", alt.domain));
        }

        let overlap = capability_overlap(&handler.capabilities, input.requirements, input.analysis);
        if overlap > 0.0 {
            confidence += CAPABILITY_WEIGHT * overlap;
            reasons.push(format!("{:.0}% capability match", overlap * 100.0));
        }

        Assessment {
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasons.join(", "),
        }
    }
}

/// Share of the handler's capabilities mentioned by the request
#[allow(clippy::cast_precision_loss)]
fn capability_overlap(capabilities: &[String], requirements: &Requirements, analysis: &ContextAnalysis) -> f64 {
    if capabilities.is_empty() {
        return 0.0;
    }

    let haystack: Vec<String> = requirements
        .explicit
        .iter()
        .chain(&requirements.implicit)
        .chain(&requirements.functional)
        .chain(requirements.non_functional.keys())
        .chain(requirements.technical.values())
        .chain(&analysis.tech_preferences)
        .map(|s| s.to_lowercase())
        .collect();

    let matched = capabilities
        .iter()
        .filter(|cap| {
            let cap = cap.to_lowercase();
            haystack.iter().any(|item| item.contains(&cap))
        })
        .count();

    matched as f64 / capabilities.len() as f64
}
