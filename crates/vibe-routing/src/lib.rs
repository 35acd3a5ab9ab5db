//! Token-aware request routing
//!
//! Turns a normalized request and its user context into a handler
//! decision plus an optimization plan:
//! - **Analysis**: fill gaps in the user context from request text and history
//! - **Patterns**: detect the problem domain and expand its implied requirements
//! - **Compression**: bound requirements and summarize context for hand-off
//! - **Cost**: estimate baseline and optimized token cost
//! - **Decision**: pick a handler with preference, efficiency, and history weighting

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod analysis;
pub mod compressor;
pub mod decision;
pub mod error;
pub mod handlers;
pub mod keywords;
pub mod patterns;
pub mod preferences;
pub mod router;
pub mod tokens;

pub use analysis::{ContextAnalysis, ContextAnalyzer, Urgency};
pub use compressor::{CompressedContext, CompressionStats, VibeContextCompressor};
pub use decision::{
    DecisionCriteria, DecisionStats, FallbackTrigger, HandlerPerformance, RoutingDecision, RoutingDecisionEngine,
    ScoredOption, TokenEfficiency,
};
pub use error::{PatternError, RoutingError};
pub use handlers::{Assessment, AssessmentInput, DomainAffinityAssessor, HandlerAssessor, HandlerDescriptor};
pub use keywords::KeywordSet;
pub use patterns::{
    DomainCandidate, DomainMatch, DomainPatternLibrary, InMemoryPatternRepository, Pattern, PatternRepository,
    TomlPatternRepository,
};
pub use preferences::{InMemoryPreferenceStore, PreferenceStore, PreferenceUpdate};
pub use router::{Handoff, Outcome, RouteTimings, Router, RouterStats, RoutingResult, UserExplanation};
pub use tokens::{CostEstimator, TokenCalculator, calculate_savings};
