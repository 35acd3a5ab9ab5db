//! Problem-domain patterns and domain detection
//!
//! Patterns are read-only reference data served by a [`PatternRepository`].
//! The [`DomainPatternLibrary`] snapshots the repository on every call, so
//! a repository that reloads its source takes effect without rebuilding
//! the router.

mod builtin;
mod file;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use vibe_core::{Complexity, NormalizedRequest, PatternDefaults, Requirements, Scale, UserContext, UserType};

pub use builtin::InMemoryPatternRepository;
pub use file::TomlPatternRepository;

use crate::error::PatternError;
use crate::keywords::KeywordSet;

/// Pattern id used when nothing else matches
pub const DEFAULT_PATTERN: &str = "general";

/// Keyword hits at which the keyword component saturates
const KEYWORD_SATURATION: f64 = 3.0;

const KEYWORD_WEIGHT: f64 = 0.6;
const USER_TYPE_WEIGHT: f64 = 0.25;
const FIT_WEIGHT: f64 = 0.15;

/// How much the runner-up's score erodes the winner's confidence
const RUNNER_UP_PENALTY: f64 = 0.5;

/// A named cluster of requirement defaults for a recognizable problem domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pattern {
    /// Unique pattern id
    pub id: String,
    /// Lowercase keywords that indicate this domain
    #[serde(default)]
    pub domains: Vec<String>,
    /// User types this pattern typically serves
    #[serde(default)]
    pub user_types: Vec<UserType>,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub scale: Scale,
    /// Typical savings percentage when this pattern's defaults apply
    #[serde(default)]
    pub average_token_savings: u32,
    /// Defaults contributed when the pattern matches
    #[serde(default)]
    pub requirements: PatternDefaults,
}

/// Source of domain patterns
pub trait PatternRepository: Send + Sync {
    /// Version tag of the currently served pattern set
    fn version(&self) -> String;

    /// Snapshot of all patterns in registration order
    fn patterns(&self) -> Result<Arc<[Pattern]>, PatternError>;

    /// Concrete requirement hints a matched pattern adds to a request
    ///
    /// The default implementation returns the pattern's implicit
    /// requirements the request does not already carry.
    fn expand(&self, pattern: &Pattern, requirements: &Requirements) -> Result<Vec<String>, PatternError> {
        Ok(missing_implicit(pattern, requirements))
    }
}

/// A scored candidate domain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainCandidate {
    pub domain: String,
    pub score: f64,
}

/// Outcome of domain detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainMatch {
    /// Winning pattern id, or the default pattern when nothing matched
    pub domain: String,
    /// Match score in `[0, 1]`; 0 for the default pattern
    pub score: f64,
    /// Score discounted by the runner-up's closeness
    pub confidence: f64,
    /// Next two candidates, best first
    pub alternatives: Vec<DomainCandidate>,
    /// Whether no pattern matched and the default was used
    pub fallback: bool,
    /// Version of the pattern set the match was computed against
    pub pattern_version: String,
}

/// Keyword sets compiled for one repository snapshot
struct CompiledKeywords {
    source: Arc<[Pattern]>,
    keywords: Arc<[KeywordSet]>,
}

/// Matches requests against the patterns of a repository
#[derive(Clone)]
pub struct DomainPatternLibrary {
    repository: Arc<dyn PatternRepository>,
    default_pattern: String,
    compiled: Arc<Mutex<Option<CompiledKeywords>>>,
}

impl DomainPatternLibrary {
    pub fn new(repository: Arc<dyn PatternRepository>) -> Self {
        Self {
            repository,
            default_pattern: DEFAULT_PATTERN.to_owned(),
            compiled: Arc::default(),
        }
    }

    /// Use a different pattern id for requests that match nothing
    #[must_use]
    pub fn with_default_pattern(mut self, id: impl Into<String>) -> Self {
        self.default_pattern = id.into();
        self
    }

    pub fn default_pattern(&self) -> &str {
        &self.default_pattern
    }

    pub fn repository(&self) -> &Arc<dyn PatternRepository> {
        &self.repository
    }

    /// Current patterns, or none if the repository is unavailable
    pub fn patterns(&self) -> Arc<[Pattern]> {
        self.repository.patterns().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "pattern repository unavailable, matching against no patterns");
            Arc::from(Vec::new())
        })
    }

    /// Whole-word keyword sets for a snapshot, one per pattern
    ///
    /// Recompiled only when the repository hands out a new snapshot.
    fn keyword_sets(&self, patterns: &Arc<[Pattern]>) -> Arc<[KeywordSet]> {
        let mut compiled = self.compiled.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(cached) = compiled.as_ref()
            && Arc::ptr_eq(&cached.source, patterns)
        {
            return Arc::clone(&cached.keywords);
        }

        let keywords: Arc<[KeywordSet]> = patterns
            .iter()
            .map(|p| {
                KeywordSet::new(&p.domains).unwrap_or_else(|error| {
                    tracing::warn!(%error, pattern = %p.id, "pattern keywords failed to compile");
                    KeywordSet::empty()
                })
            })
            .collect();

        *compiled = Some(CompiledKeywords {
            source: Arc::clone(patterns),
            keywords: Arc::clone(&keywords),
        });
        keywords
    }

    /// Score every pattern against a request and pick the best
    ///
    /// Ties keep registration order. A request that matches no pattern
    /// resolves to the default pattern with score 0.
    pub fn detect_domain(&self, request: &NormalizedRequest, context: &UserContext) -> DomainMatch {
        let patterns = self.patterns();
        let keyword_sets = self.keyword_sets(&patterns);
        let pattern_version = self.repository.version();
        let text = request.search_text();
        let user_type = context.user_type.unwrap_or_default();
        let scale = context.scale.unwrap_or_default();
        let complexity = request.requirements.complexity;

        let mut ranked: Vec<DomainCandidate> = patterns
            .iter()
            .zip(keyword_sets.iter())
            .filter(|(p, _)| p.id != self.default_pattern)
            .map(|(p, keywords)| DomainCandidate {
                domain: p.id.clone(),
                score: score_pattern(p, keywords, &text, user_type, complexity, scale),
            })
            .collect();

        // Stable: equal scores keep registration order
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut ranked = ranked.into_iter();
        let Some(top) = ranked.next().filter(|c| c.score > 0.0) else {
            tracing::debug!(default = %self.default_pattern, "no domain pattern matched");
            return DomainMatch {
                domain: self.default_pattern.clone(),
                score: 0.0,
                confidence: 0.0,
                alternatives: Vec::new(),
                fallback: true,
                pattern_version,
            };
        };

        let alternatives: Vec<_> = ranked.take(2).collect();
        let runner_up = alternatives.first().map_or(0.0, |c| c.score);
        let confidence = RUNNER_UP_PENALTY.mul_add(-runner_up, top.score).clamp(0.0, 1.0);

        tracing::debug!(
            domain = %top.domain,
            score = top.score,
            confidence,
            runner_up,
            "domain detected"
        );

        DomainMatch {
            domain: top.domain,
            score: top.score,
            confidence,
            alternatives,
            fallback: false,
            pattern_version,
        }
    }

    /// Requirement hints contributed by the detected domain's pattern
    ///
    /// Expansion failures are logged and yield no hints.
    pub fn expand_requirements(&self, requirements: &Requirements, domain: &DomainMatch) -> Vec<String> {
        let patterns = self.patterns();

        let Some(pattern) = patterns.iter().find(|p| p.id == domain.domain) else {
            if !domain.fallback {
                let error = PatternError::UnknownPattern(domain.domain.clone());
                tracing::warn!(%error, "pattern expansion failed");
            }
            return Vec::new();
        };

        match self.repository.expand(pattern, requirements) {
            Ok(hints) => hints,
            Err(error) => {
                tracing::warn!(%error, pattern = %pattern.id, "pattern expansion failed");
                Vec::new()
            }
        }
    }

    /// Patterns contributing defaults for a match
    ///
    /// Positive-scoring alternatives come first, lowest first, and the
    /// winner last, so the winner takes precedence on collisions.
    pub fn matched_patterns(&self, domain: &DomainMatch) -> Vec<Pattern> {
        let patterns = self.patterns();

        domain
            .alternatives
            .iter()
            .rev()
            .filter(|c| c.score > 0.0)
            .map(|c| c.domain.as_str())
            .chain(std::iter::once(domain.domain.as_str()))
            .filter_map(|id| patterns.iter().find(|p| p.id == id).cloned())
            .collect()
    }

    /// Look up a single pattern
    pub fn pattern(&self, id: &str) -> Option<Pattern> {
        self.patterns().iter().find(|p| p.id == id).cloned()
    }
}

impl std::fmt::Debug for DomainPatternLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainPatternLibrary")
            .field("version", &self.repository.version())
            .field("default_pattern", &self.default_pattern)
            .finish_non_exhaustive()
    }
}

/// Weighted keyword, user-type, and complexity/scale overlap
///
/// Zero unless at least one domain keyword appears in the text as a
/// whole word.
#[allow(clippy::cast_precision_loss)]
fn score_pattern(
    pattern: &Pattern,
    keywords: &KeywordSet,
    text: &str,
    user_type: UserType,
    complexity: Complexity,
    scale: Scale,
) -> f64 {
    let hits = keywords.hits(text);

    if hits == 0 {
        return 0.0;
    }

    let keyword = (hits as f64 / KEYWORD_SATURATION).min(1.0);
    let user = if pattern.user_types.contains(&user_type) { 1.0 } else { 0.0 };
    let mut fit = 0.0;
    if pattern.complexity == complexity {
        fit += 0.5;
    }
    if pattern.scale == scale {
        fit += 0.5;
    }

    FIT_WEIGHT.mul_add(fit, KEYWORD_WEIGHT.mul_add(keyword, USER_TYPE_WEIGHT * user))
}

fn missing_implicit(pattern: &Pattern, requirements: &Requirements) -> Vec<String> {
    let present: HashSet<&str> = requirements
        .explicit
        .iter()
        .chain(&requirements.implicit)
        .map(String::as_str)
        .collect();

    pattern
        .requirements
        .implicit
        .iter()
        .filter(|hint| !present.contains(hint.as_str()))
        .cloned()
        .collect()
}

/// Reject pattern sets with blank or duplicate ids or impossible savings
fn validate(patterns: &[Pattern]) -> Result<(), PatternError> {
    let mut seen = HashSet::new();

    for pattern in patterns {
        if pattern.id.trim().is_empty() {
            return Err(PatternError::Invalid("pattern ids must not be empty".to_owned()));
        }

        if !seen.insert(pattern.id.as_str()) {
            return Err(PatternError::Invalid(format!("duplicate pattern id '{}'", pattern.id)));
        }

        if pattern.average_token_savings > 100 {
            return Err(PatternError::Invalid(format!(
                "pattern '{}' average_token_savings must be at most 100, got {}",
                pattern.id, pattern.average_token_savings
            )));
        }
    }

    Ok(())
}

/// Lowercase keywords so matching against lowercased text works
fn normalize(patterns: &mut [Pattern]) {
    for pattern in patterns {
        for keyword in &mut pattern.domains {
            *keyword = keyword.trim().to_lowercase();
        }
    }
}
