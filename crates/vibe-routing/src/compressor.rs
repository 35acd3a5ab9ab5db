//! Lossy context compression
//!
//! Reduces a requirement set and user context to the bounded subset a
//! handler actually needs, and keeps a rolling history of achieved
//! ratios for statistics.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use vibe_config::CompressionConfig;
use vibe_core::{
    BYTES_PER_TOKEN, ContextSummary, EssentialRequirements, PatternDefaults, Requirements, UserContext, estimate_size,
};

use crate::patterns::Pattern;

/// Primary goal reported when the user stated none
pub const DEFAULT_PRIMARY_GOAL: &str = "general-purpose";

/// Output of a full compression pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressedContext {
    pub essential_requirements: EssentialRequirements,
    pub pattern_defaults: PatternDefaults,
    pub context_summary: ContextSummary,
    /// Estimated serialized bytes of the full requirements and context
    pub original_size: usize,
    /// Estimated serialized bytes of the essential requirements and summary
    pub compressed_size: usize,
    /// `1 - compressed/original`, clamped to `[0, 1]`; 0 for empty input
    pub compression_ratio: f64,
}

/// Aggregate statistics over the retained compression history
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CompressionStats {
    /// Compressions performed since startup
    pub total_compressions: u64,
    pub average_ratio: f64,
    pub average_original_size: f64,
    pub average_compressed_size: f64,
    /// Estimated tokens saved across the retained history
    pub total_tokens_saved: u64,
}

#[derive(Debug, Clone, Copy)]
struct Record {
    original_size: usize,
    compressed_size: usize,
    ratio: f64,
}

#[derive(Debug, Default)]
struct History {
    records: VecDeque<Record>,
    total: u64,
}

#[derive(Serialize)]
struct FullShape<'a> {
    requirements: Option<&'a Requirements>,
    context: &'a UserContext,
}

#[derive(Serialize)]
struct CompressedShape<'a> {
    requirements: &'a EssentialRequirements,
    context: &'a ContextSummary,
}

/// Bounds requirement sets and summarizes user context
#[derive(Debug)]
pub struct VibeContextCompressor {
    max_explicit: usize,
    max_implicit: usize,
    history_limit: usize,
    history: Mutex<History>,
}

impl VibeContextCompressor {
    /// Create a compressor; limits below 1 are raised to 1
    pub fn new(config: &CompressionConfig) -> Self {
        Self {
            max_explicit: config.max_essential_explicit.max(1),
            max_implicit: config.max_essential_implicit.max(1),
            history_limit: config.history_limit.max(1),
            history: Mutex::new(History::default()),
        }
    }

    /// Keep the first N explicit and implicit requirements
    ///
    /// Order is preserved and scalar fields pass through. `None` yields an
    /// empty set.
    pub fn extract_essential(&self, requirements: Option<&Requirements>) -> EssentialRequirements {
        let Some(requirements) = requirements else {
            return EssentialRequirements::default();
        };

        EssentialRequirements {
            explicit: requirements.explicit.iter().take(self.max_explicit).cloned().collect(),
            implicit: requirements.implicit.iter().take(self.max_implicit).cloned().collect(),
            domain: requirements.domain.clone(),
            complexity: requirements.complexity,
        }
    }

    /// Merge the defaults of every pattern, in order
    ///
    /// Later patterns win on collision: a non-empty implicit list replaces
    /// the previous one, and technical choices override per key. An empty
    /// implicit list counts as absent. Patterns with a blank id are skipped.
    pub fn extract_pattern_defaults(&self, patterns: &[Pattern]) -> PatternDefaults {
        let mut defaults = PatternDefaults::default();

        for pattern in patterns {
            if pattern.id.trim().is_empty() {
                tracing::debug!("skipping pattern without an id");
                continue;
            }

            if !pattern.requirements.implicit.is_empty() {
                defaults.implicit.clone_from(&pattern.requirements.implicit);
            }

            for (layer, choice) in &pattern.requirements.technical {
                defaults.technical.insert(layer.clone(), choice.clone());
            }
        }

        defaults
    }

    /// Project a user context down to its routing-relevant fields
    pub fn summarize_context(&self, context: &UserContext) -> ContextSummary {
        ContextSummary {
            user_type: context.user_type.unwrap_or_default(),
            technical_level: context.technical_level.unwrap_or_default(),
            scale: context.scale.unwrap_or_default(),
            budget: context.budget.unwrap_or_default(),
            primary_goal: context
                .goals
                .first()
                .cloned()
                .unwrap_or_else(|| DEFAULT_PRIMARY_GOAL.to_owned()),
        }
    }

    /// Compress requirements, patterns, and context in one pass
    ///
    /// Pattern defaults are shared reference data and do not count toward
    /// the compressed size.
    #[allow(clippy::cast_precision_loss)]
    pub fn compress_vibe_context(
        &self,
        requirements: Option<&Requirements>,
        patterns: &[Pattern],
        context: &UserContext,
    ) -> CompressedContext {
        let essential_requirements = self.extract_essential(requirements);
        let pattern_defaults = self.extract_pattern_defaults(patterns);
        let context_summary = self.summarize_context(context);

        let original_size = estimate_size(&FullShape { requirements, context });
        let compressed_size = estimate_size(&CompressedShape {
            requirements: &essential_requirements,
            context: &context_summary,
        });

        let compression_ratio = if original_size == 0 {
            0.0
        } else {
            (1.0 - compressed_size as f64 / original_size as f64).clamp(0.0, 1.0)
        };

        self.record(Record {
            original_size,
            compressed_size,
            ratio: compression_ratio,
        });

        tracing::debug!(
            original_size,
            compressed_size,
            compression_ratio,
            explicit = essential_requirements.explicit.len(),
            implicit = essential_requirements.implicit.len(),
            "context compressed"
        );

        CompressedContext {
            essential_requirements,
            pattern_defaults,
            context_summary,
            original_size,
            compressed_size,
            compression_ratio,
        }
    }

    fn record(&self, record: Record) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.records.len() >= self.history_limit {
            history.records.pop_front();
        }
        history.records.push_back(record);
        history.total += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CompressionStats {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let n = history.records.len();

        if n == 0 {
            return CompressionStats {
                total_compressions: history.total,
                ..CompressionStats::default()
            };
        }

        let (ratio, original, compressed) = history.records.iter().fold((0.0, 0, 0), |(r, o, c), rec| {
            (r + rec.ratio, o + rec.original_size, c + rec.compressed_size)
        });
        let saved_bytes = original.saturating_sub(compressed);

        CompressionStats {
            total_compressions: history.total,
            average_ratio: ratio / n as f64,
            average_original_size: original as f64 / n as f64,
            average_compressed_size: compressed as f64 / n as f64,
            total_tokens_saved: u64::try_from(saved_bytes / BYTES_PER_TOKEN).unwrap_or(u64::MAX),
        }
    }
}

impl Default for VibeContextCompressor {
    fn default() -> Self {
        Self::new(&CompressionConfig::default())
    }
}
