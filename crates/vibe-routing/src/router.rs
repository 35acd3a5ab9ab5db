//! End-to-end routing
//!
//! analyze → detect → cache check → compress and cost → score → decide.
//! Routing never fails: every degraded stage logs and falls back to
//! defaults, and the worst case is a fallback decision with no savings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vibe_cache::{CacheStats, OptimizationCache};
use vibe_config::{Config, DecisionConfig};
use vibe_core::{
    ContextSummary, EssentialRequirements, NormalizedRequest, OptimizationPlan, Requirements, TechnicalLevel,
    TokenSavings, UserContext,
};
use vibe_telemetry::{RouteRecord, RouterMetrics};

use crate::analysis::{ContextAnalysis, ContextAnalyzer};
use crate::compressor::{CompressedContext, CompressionStats, VibeContextCompressor};
use crate::decision::{DecisionCriteria, DecisionStats, RoutingDecision, RoutingDecisionEngine, ScoredOption};
use crate::error::RoutingError;
use crate::handlers::{AssessmentInput, DomainAffinityAssessor, HandlerAssessor, HandlerDescriptor};
use crate::patterns::{DomainMatch, DomainPatternLibrary, Pattern, PatternRepository};
use crate::preferences::{InMemoryPreferenceStore, PreferenceStore, PreferenceUpdate};
use crate::tokens::{AppliedOptimization, CompressedContextCost, CostEstimator, OptimizedCostInput, TokenCalculator};

/// Share of the composite score earned by task fit alone
const FIT_SHARE: f64 = 0.7;
const EFFICIENCY_WEIGHT: f64 = 0.3;

/// What the chosen handler receives
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "form", content = "requirements", rename_all = "snake_case")]
pub enum Handoff {
    /// The bounded essential subset
    Essential(EssentialRequirements),
    /// The full requirement set, for handlers that ask for it
    Full(Requirements),
}

/// Plain-language account of a decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserExplanation {
    pub summary: String,
    pub reasons: Vec<String>,
    pub savings: Option<String>,
}

/// Wall-clock time spent per stage, in microseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouteTimings {
    pub analysis_us: u64,
    pub detection_us: u64,
    pub optimization_us: u64,
    pub decision_us: u64,
    pub total_us: u64,
}

/// Everything a caller needs to dispatch a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingResult {
    pub decision: RoutingDecision,
    pub plan: OptimizationPlan,
    pub token_savings: Option<TokenSavings>,
    pub cache_hit: bool,
    pub domain: DomainMatch,
    pub analysis: ContextAnalysis,
    pub handoff: Handoff,
    pub explanation: UserExplanation,
    pub timings: RouteTimings,
}

/// Result of dispatching a routed request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    /// Tokens the handler actually consumed
    #[serde(default)]
    pub tokens_used: u64,
    /// User satisfaction in `[0, 1]`
    #[serde(default)]
    pub satisfaction: Option<f64>,
}

/// Aggregate statistics of every stateful stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterStats {
    pub pattern_version: String,
    pub cache: CacheStats,
    pub compression: CompressionStats,
    pub decisions: DecisionStats,
}

/// Routes normalized requests to handlers
pub struct Router {
    analyzer: ContextAnalyzer,
    library: DomainPatternLibrary,
    compressor: VibeContextCompressor,
    estimator: Arc<dyn CostEstimator>,
    cache: Arc<OptimizationCache>,
    engine: RoutingDecisionEngine,
    assessor: Arc<dyn HandlerAssessor>,
    preferences: Arc<dyn PreferenceStore>,
    decision_config: DecisionConfig,
    metrics: RouterMetrics,
}

impl Router {
    pub fn new(config: &Config, repository: Arc<dyn PatternRepository>) -> Self {
        Self {
            analyzer: ContextAnalyzer::new(),
            library: DomainPatternLibrary::new(repository),
            compressor: VibeContextCompressor::new(&config.compression),
            estimator: Arc::new(TokenCalculator::new(config.cost.clone())),
            cache: Arc::new(OptimizationCache::new(&config.cache)),
            engine: RoutingDecisionEngine::new(&config.decision),
            assessor: Arc::new(DomainAffinityAssessor),
            preferences: Arc::new(InMemoryPreferenceStore::new()),
            decision_config: config.decision.clone(),
            metrics: RouterMetrics::new(),
        }
    }

    #[must_use]
    pub fn with_cost_estimator(mut self, estimator: Arc<dyn CostEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    #[must_use]
    pub fn with_assessor(mut self, assessor: Arc<dyn HandlerAssessor>) -> Self {
        self.assessor = assessor;
        self
    }

    #[must_use]
    pub fn with_preference_store(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = store;
        self
    }

    /// Share a cache, e.g. one restored from an export
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<OptimizationCache>) -> Self {
        self.cache = cache;
        self
    }

    pub const fn cache(&self) -> &Arc<OptimizationCache> {
        &self.cache
    }

    pub const fn engine(&self) -> &RoutingDecisionEngine {
        &self.engine
    }

    pub const fn library(&self) -> &DomainPatternLibrary {
        &self.library
    }

    pub fn preferences(&self) -> &dyn PreferenceStore {
        self.preferences.as_ref()
    }

    /// Route one request among the candidate handlers
    pub fn route(
        &self,
        request: &NormalizedRequest,
        context: &UserContext,
        handlers: &[HandlerDescriptor],
    ) -> RoutingResult {
        let start = Instant::now();

        let analysis = self.analyzer.analyze(request, context);
        let enriched = analysis.to_user_context(context);
        let analyzed = Instant::now();

        let domain = self.library.detect_domain(request, &enriched);
        let requirements = self.effective_requirements(&request.requirements, &domain);
        let detected = Instant::now();

        let essential = self.compressor.extract_essential(Some(&requirements));
        let summary = self.compressor.summarize_context(&enriched);
        let (plan, cache_hit) = match self.cache.get(&essential, &summary) {
            Some(mut plan) => {
                tracing::debug!(domain = %domain.domain, "optimization plan served from cache");
                // The cache key ignores goals, so the stored summary may belong to another user
                plan.context_summary = summary;
                (plan, true)
            }
            None => (
                self.build_plan(&requirements, &enriched, &analysis, &domain, &essential, &summary),
                false,
            ),
        };
        let optimized = Instant::now();

        let options = self.score_options(handlers, &domain, &requirements, &analysis, &plan);
        let criteria = self.criteria_for(context);
        let decision = self.engine.select_optimal_route(options, &criteria, Some(&plan));
        let decided = Instant::now();

        let handoff = match handlers.iter().find(|h| h.id == decision.handler_id) {
            Some(handler) if handler.requires_full_requirements => Handoff::Full(requirements),
            _ => Handoff::Essential(plan.essential_requirements.clone()),
        };
        let explanation = explain(&decision, &domain, &plan);
        let token_savings = plan.token_savings;

        let timings = RouteTimings {
            analysis_us: micros(analyzed - start),
            detection_us: micros(detected - analyzed),
            optimization_us: micros(optimized - detected),
            decision_us: micros(decided - optimized),
            total_us: micros(start.elapsed()),
        };

        self.metrics.record_route(&RouteRecord {
            handler: &decision.handler_id,
            domain: &domain.domain,
            cache_hit,
            fallback: decision.fallback,
            tokens_saved: token_savings.map_or(0, |s| s.saved),
            start,
        });

        tracing::info!(
            decision_id = %decision.decision_id,
            handler = %decision.handler_id,
            domain = %domain.domain,
            cache_hit,
            fallback = decision.fallback,
            saved = token_savings.map_or(0, |s| s.saved),
            total_us = timings.total_us,
            "request routed"
        );

        RoutingResult {
            decision,
            plan,
            token_savings,
            cache_hit,
            domain,
            analysis,
            handoff,
            explanation,
            timings,
        }
    }

    /// Feed a dispatch outcome back into performance and preferences
    pub fn record_outcome(&self, decision_id: Uuid, outcome: &Outcome) -> Result<(), RoutingError> {
        if let Some(satisfaction) = outcome.satisfaction
            && !(0.0..=1.0).contains(&satisfaction)
        {
            return Err(RoutingError::InvalidOutcome(format!(
                "satisfaction must be between 0 and 1, got {satisfaction}"
            )));
        }

        let entry = self
            .engine
            .lookup(decision_id)
            .ok_or(RoutingError::UnknownDecision(decision_id))?;

        self.engine
            .update_handler_performance(&entry.handler_id, outcome.success, outcome.tokens_used);

        if let Some(user_id) = &entry.user_id {
            let update = PreferenceUpdate::from_outcome(&entry.handler_id, outcome.success, outcome.satisfaction);
            self.preferences.apply(user_id, &update);
        }

        tracing::debug!(%decision_id, handler = %entry.handler_id, success = outcome.success, "outcome recorded");
        Ok(())
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            pattern_version: self.library.repository().version(),
            cache: self.cache.stats(),
            compression: self.compressor.stats(),
            decisions: self.engine.stats(),
        }
    }

    /// Request requirements plus what the detected domain implies
    fn effective_requirements(&self, requirements: &Requirements, domain: &DomainMatch) -> Requirements {
        let mut effective = requirements.clone();

        if effective.domain.is_none() && !domain.fallback {
            effective.domain = Some(domain.domain.clone());
        }

        for hint in self.library.expand_requirements(requirements, domain) {
            if !effective.implicit.contains(&hint) {
                effective.implicit.push(hint);
            }
        }

        effective
    }

    fn build_plan(
        &self,
        requirements: &Requirements,
        context: &UserContext,
        analysis: &ContextAnalysis,
        domain: &DomainMatch,
        essential: &EssentialRequirements,
        summary: &ContextSummary,
    ) -> OptimizationPlan {
        let matched = self.library.matched_patterns(domain);
        let compressed = self.compressor.compress_vibe_context(Some(requirements), &matched, context);

        let baseline = self.estimator.baseline(requirements, context);
        let input = self.optimization_input(requirements, context, &compressed, &matched);
        let optimized = self.estimator.optimized(&input);
        let savings = self.estimator.savings(baseline, optimized);

        if !savings.is_improvement() {
            tracing::warn!(baseline, optimized, "optimization did not reduce cost");
        }

        let recommendations = recommend(requirements, analysis, &compressed, &savings);
        let plan = OptimizationPlan {
            essential_requirements: compressed.essential_requirements,
            pattern_defaults: compressed.pattern_defaults,
            context_summary: compressed.context_summary,
            compression_ratio: compressed.compression_ratio,
            token_savings: Some(savings),
            recommendations,
            patterns_used: matched.into_iter().map(|p| p.id).collect(),
        };

        if !self.cache.set(essential, summary, plan.clone()) {
            tracing::debug!(percentage = savings.percentage, "optimization plan not cached");
        }

        plan
    }

    /// Describe the applied optimizations slice by slice
    ///
    /// Slice costs come from the estimator itself: the baseline of the
    /// slice alone minus the baseline of nothing.
    #[allow(clippy::cast_precision_loss)]
    fn optimization_input(
        &self,
        requirements: &Requirements,
        context: &UserContext,
        compressed: &CompressedContext,
        matched: &[Pattern],
    ) -> OptimizedCostInput {
        let empty_requirements = Requirements::default();
        let empty_context = UserContext::default();
        let floor = self.estimator.baseline(&empty_requirements, &empty_context);
        let essential = &compressed.essential_requirements;
        let mut optimizations = Vec::new();

        let stated = Requirements {
            explicit: requirements.explicit.clone(),
            functional: requirements.functional.clone(),
            non_functional: requirements.non_functional.clone(),
            ..Requirements::default()
        };
        let stated_items = stated.item_count();
        if stated_items > 0 {
            let kept = essential.explicit.len() as f64 / stated_items as f64;
            optimizations.push(AppliedOptimization {
                name: "essential_requirements".to_owned(),
                original_tokens: self.estimator.baseline(&stated, &empty_context).saturating_sub(floor),
                savings_percentage: (1.0 - kept) * 100.0,
            });
        }

        let inferred = Requirements {
            implicit: requirements.implicit.clone(),
            technical: requirements.technical.clone(),
            ..Requirements::default()
        };
        if inferred.item_count() > 0 {
            // The winner comes last and speaks for the pattern slice
            let savings_percentage = matched.last().map_or_else(
                || {
                    if requirements.implicit.is_empty() {
                        0.0
                    } else {
                        (1.0 - essential.implicit.len() as f64 / requirements.implicit.len() as f64) * 100.0
                    }
                },
                |p| f64::from(p.average_token_savings),
            );
            optimizations.push(AppliedOptimization {
                name: "pattern_defaults".to_owned(),
                original_tokens: self.estimator.baseline(&inferred, &empty_context).saturating_sub(floor),
                savings_percentage,
            });
        }

        let context_tokens = self.estimator.baseline(&empty_requirements, context).saturating_sub(floor);
        let compressed_context = (context_tokens > 0).then_some(CompressedContextCost {
            original_tokens: context_tokens,
            compression_ratio: compressed.compression_ratio,
        });

        OptimizedCostInput {
            optimizations,
            compressed_context,
        }
    }

    fn score_options(
        &self,
        handlers: &[HandlerDescriptor],
        domain: &DomainMatch,
        requirements: &Requirements,
        analysis: &ContextAnalysis,
        plan: &OptimizationPlan,
    ) -> Vec<ScoredOption> {
        let input = AssessmentInput {
            domain,
            requirements,
            analysis,
        };
        let savings_fraction = plan
            .savings_percentage()
            .map_or(0.0, |p| (p / 100.0).clamp(0.0, 1.0));

        handlers
            .iter()
            .map(|handler| {
                let assessment = self.assessor.assess(handler, &input);
                let efficiency = handler.token_efficiency.clamp(0.0, 1.0);
                // Full hand-offs forgo the plan's savings
                let realized = if handler.requires_full_requirements {
                    efficiency * (1.0 - savings_fraction)
                } else {
                    efficiency
                };

                // Efficiency scales fit; it never lifts a poor fit on its own
                let composite = assessment.confidence * EFFICIENCY_WEIGHT.mul_add(realized, FIT_SHARE);
                let mut option = ScoredOption::new(handler.id.clone(), assessment.confidence, composite)
                .with_token_efficiency(efficiency, realized);
                option.reasoning = assessment.reasoning;
                option
            })
            .collect()
    }

    fn criteria_for(&self, context: &UserContext) -> DecisionCriteria {
        let mut criteria = DecisionCriteria::from_config(&self.decision_config);
        criteria.user_id.clone_from(&context.user_id);

        if criteria.respect_user_preferences {
            criteria.user_preferences.clone_from(&context.preferences);
            if let Some(user_id) = &context.user_id {
                criteria.user_preferences.extend(self.preferences.preferences(user_id));
            }
        }

        criteria
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("library", &self.library)
            .field("cache", &self.cache)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn recommend(
    requirements: &Requirements,
    analysis: &ContextAnalysis,
    compressed: &CompressedContext,
    savings: &TokenSavings,
) -> Vec<String> {
    let mut out = Vec::new();
    let essential = &compressed.essential_requirements;

    if essential.explicit.len() < requirements.explicit.len() {
        out.push(format!(
            "Start with the top {} stated requirements and add the other {} in a follow-up",
            essential.explicit.len(),
            requirements.explicit.len() - essential.explicit.len()
        ));
    }
    if !compressed.pattern_defaults.is_empty() {
        out.push("Reuse the matched pattern defaults instead of specifying them again".to_owned());
    }
    if analysis.technical_level == TechnicalLevel::Beginner {
        out.push("Prefer guided, low-configuration tooling".to_owned());
    }
    if analysis.constraints.iter().any(|c| c == "limited_budget") {
        out.push("Favor free tiers and managed hosting to stay within budget".to_owned());
    }
    if !savings.is_improvement() {
        out.push("Optimization did not reduce cost; hand over the full context".to_owned());
    }

    out
}

fn explain(decision: &RoutingDecision, domain: &DomainMatch, plan: &OptimizationPlan) -> UserExplanation {
    let summary = if decision.fallback {
        format!(
            "No specialist fit this request well enough, so it goes to the '{}' handler",
            decision.handler_id
        )
    } else {
        format!(
            "Routed to '{}' as a {} project",
            decision.handler_id,
            domain.domain.replace('_', " ")
        )
    };

    let mut reasons = Vec::new();
    if domain.fallback {
        reasons.push("the request did not match a known project type".to_owned());
    } else {
        reasons.push(format!(
            "looks like a {} project ({:.0}% confidence)",
            domain.domain.replace('_', " "),
            domain.confidence * 100.0
        ));
    }
    reasons.push(decision.selection_reason.clone());

    let savings = plan
        .token_savings
        .filter(TokenSavings::is_improvement)
        .map(|s| format!("about {} tokens saved ({:.0}% less)", s.saved, s.percentage));

    UserExplanation {
        summary,
        reasons,
        savings,
    }
}

#[cfg(test)]
mod tests {
    use vibe_config::CacheConfig;

    use super::*;
    use crate::decision::FallbackTrigger;
    use crate::error::PatternError;
    use crate::patterns::InMemoryPatternRepository;

    fn router(config: &Config) -> Router {
        Router::new(config, Arc::new(InMemoryPatternRepository::builtin()))
    }

    fn store_request() -> NormalizedRequest {
        NormalizedRequest {
            description: "I want an online store with a cart and checkout to sell my handmade products".to_owned(),
            keywords: vec!["ecommerce".to_owned()],
            requirements: Requirements {
                functional: ["search", "filters", "wishlist", "order history"]
                    .map(String::from)
                    .to_vec(),
                ..Requirements::default()
            }
            .with_explicit([
                "product catalog",
                "shopping cart",
                "checkout",
                "stripe payments",
                "order emails",
                "discount codes",
                "inventory tracking",
                "customer accounts",
                "reviews",
                "shipping rates",
            ]),
        }
    }

    fn handlers() -> Vec<HandlerDescriptor> {
        vec![
            HandlerDescriptor::new("shop")
                .with_domains(["storefront"])
                .with_capabilities(["payments"])
                .with_token_efficiency(0.8),
            HandlerDescriptor::new("blog")
                .with_domains(["content_publishing"])
                .with_token_efficiency(0.6),
            HandlerDescriptor::new("general").with_domains(["general"]),
        ]
    }

    #[test]
    fn storefront_request_goes_to_the_shop_handler() {
        let router = router(&Config::default());
        let result = router.route(&store_request(), &UserContext::default(), &handlers());

        assert_eq!(result.domain.domain, "storefront");
        assert!(!result.decision.fallback);
        assert_eq!(result.decision.handler_id, "shop");
        assert!(result.decision.token_optimized);
        assert!(!result.cache_hit);

        let savings = result.token_savings.unwrap();
        assert!(savings.is_improvement());
        assert!(savings.baseline > 600);
        assert_eq!(result.plan.patterns_used.last().map(String::as_str), Some("storefront"));
        assert_eq!(result.plan.essential_requirements.explicit.len(), 5);
        assert_eq!(result.plan.essential_requirements.domain.as_deref(), Some("storefront"));

        let Handoff::Essential(essential) = &result.handoff else {
            panic!("expected essential hand-off");
        };
        assert_eq!(essential.explicit[0], "product catalog");
        assert!(result.explanation.summary.contains("shop"));
        assert!(result.explanation.savings.is_some());
        assert!(
            result
                .plan
                .recommendations
                .iter()
                .any(|r| r.contains("top 5 stated requirements"))
        );
    }

    #[test]
    fn repeated_request_hits_the_cache() {
        let router = router(&Config::default());
        let first = router.route(&store_request(), &UserContext::default(), &handlers());
        assert!(first.token_savings.unwrap().percentage >= 30.0);

        let second = router.route(&store_request(), &UserContext::default(), &handlers());
        assert!(second.cache_hit);
        assert_eq!(second.plan, first.plan);
        assert_ne!(second.decision.decision_id, first.decision.decision_id);

        let stats = router.stats();
        assert_eq!(stats.cache.hit_count, 1);
        assert_eq!(stats.cache.miss_count, 1);
        assert_eq!(stats.compression.total_compressions, 1);
        assert_eq!(stats.decisions.total_decisions, 2);
        assert_eq!(stats.pattern_version, "builtin-1");
    }

    #[test]
    fn cached_plan_carries_the_current_users_summary() {
        let router = router(&Config::default());
        let context = |user: &str, goal: &str| UserContext {
            user_id: Some(user.to_owned()),
            goals: vec![goal.to_owned()],
            ..UserContext::default()
        };

        let alice = router.route(&store_request(), &context("alice", "alice private goal"), &handlers());
        assert!(!alice.cache_hit);
        assert_eq!(alice.plan.context_summary.primary_goal, "alice private goal");

        let bob = router.route(&store_request(), &context("bob", "bob own goal"), &handlers());
        assert!(bob.cache_hit);
        assert_eq!(bob.plan.context_summary.primary_goal, "bob own goal");
        assert_eq!(bob.plan.essential_requirements, alice.plan.essential_requirements);
    }

    #[test]
    fn no_handlers_fall_back_with_a_plan() {
        let router = router(&Config::default());
        let result = router.route(&store_request(), &UserContext::default(), &[]);

        assert!(result.decision.fallback);
        assert_eq!(result.decision.handler_id, "general");
        assert_eq!(
            result.decision.decision_metadata.fallback_trigger,
            Some(FallbackTrigger::NoOptions)
        );
        assert!(result.token_savings.is_some());
        assert!(result.explanation.summary.contains("No specialist"));
    }

    #[test]
    fn full_requirement_handlers_get_everything() {
        let router = router(&Config::default());
        let handlers = vec![
            HandlerDescriptor::new("shop")
                .with_domains(["storefront"])
                .with_token_efficiency(0.8)
                .requiring_full_requirements(),
        ];
        let result = router.route(&store_request(), &UserContext::default(), &handlers);

        assert_eq!(result.decision.handler_id, "shop");
        let Handoff::Full(requirements) = &result.handoff else {
            panic!("expected full hand-off");
        };
        assert_eq!(requirements.explicit.len(), 10);
        assert!(!requirements.implicit.is_empty());
    }

    #[test]
    fn outcomes_feed_performance_and_preferences() {
        let router = router(&Config::default());
        let context = UserContext {
            user_id: Some("usr_1".to_owned()),
            ..UserContext::default()
        };
        let result = router.route(&store_request(), &context, &handlers());

        router
            .record_outcome(
                result.decision.decision_id,
                &Outcome {
                    success: true,
                    tokens_used: 420,
                    satisfaction: Some(1.0),
                },
            )
            .unwrap();

        let performance = router.engine().performance("shop");
        assert_eq!(performance.total_requests, 1);
        assert_eq!(performance.successful_requests, 1);
        let weight = router.preferences().preferences("usr_1")["shop"];
        assert!((weight - 1.1).abs() < 1e-9);

        let next = router.route(&store_request(), &context, &handlers());
        assert_eq!(next.decision.decision_metadata.preference_multiplier, Some(weight));
    }

    #[test]
    fn bad_outcomes_are_rejected() {
        let router = router(&Config::default());
        let outcome = Outcome {
            success: true,
            tokens_used: 0,
            satisfaction: None,
        };
        assert!(matches!(
            router.record_outcome(Uuid::new_v4(), &outcome),
            Err(RoutingError::UnknownDecision(_))
        ));

        let result = router.route(&store_request(), &UserContext::default(), &handlers());
        let invalid = Outcome {
            satisfaction: Some(3.0),
            ..outcome
        };
        assert!(matches!(
            router.record_outcome(result.decision.decision_id, &invalid),
            Err(RoutingError::InvalidOutcome(_))
        ));
        assert_eq!(router.engine().performance("shop").total_requests, 0);
    }

    struct BrokenRepository;

    impl PatternRepository for BrokenRepository {
        fn version(&self) -> String {
            "broken".to_owned()
        }

        fn patterns(&self) -> Result<Arc<[Pattern]>, PatternError> {
            Err(PatternError::Invalid("store offline".to_owned()))
        }
    }

    #[test]
    fn unavailable_patterns_degrade_to_fallback() {
        let router = Router::new(&Config::default(), Arc::new(BrokenRepository));
        let handlers = vec![
            HandlerDescriptor::new("shop")
                .with_domains(["storefront"])
                .with_token_efficiency(0.8),
            HandlerDescriptor::new("general").with_domains(["general"]),
        ];
        let result = router.route(&store_request(), &UserContext::default(), &handlers);

        assert!(result.domain.fallback);
        assert_eq!(result.domain.domain, "general");
        assert!(result.decision.fallback);
        assert_eq!(result.decision.handler_id, "general");
        assert!(result.plan.patterns_used.is_empty());
    }

    struct RegressingEstimator;

    impl CostEstimator for RegressingEstimator {
        fn baseline(&self, _: &Requirements, _: &UserContext) -> u64 {
            100
        }

        fn optimized(&self, _: &OptimizedCostInput) -> u64 {
            200
        }
    }

    #[test]
    fn regressing_plans_are_returned_but_not_cached() {
        let router = router(&Config::default()).with_cost_estimator(Arc::new(RegressingEstimator));
        let result = router.route(&store_request(), &UserContext::default(), &handlers());

        let savings = result.token_savings.unwrap();
        assert_eq!(savings.saved, -100);
        assert!(result.explanation.savings.is_none());
        assert!(
            result
                .plan
                .recommendations
                .iter()
                .any(|r| r.contains("did not reduce cost"))
        );
        assert!(router.cache().is_empty());
        assert!(!result.decision.fallback);
    }

    #[test]
    fn shared_cache_is_used() {
        let cache = Arc::new(OptimizationCache::new(&CacheConfig::default()));
        let router = router(&Config::default()).with_cache(Arc::clone(&cache));
        router.route(&store_request(), &UserContext::default(), &handlers());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn result_serializes() {
        let router = router(&Config::default());
        let result = router.route(&store_request(), &UserContext::default(), &handlers());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["decision"]["handler_id"], "shop");
        assert_eq!(json["handoff"]["form"], "essential");
    }
}
