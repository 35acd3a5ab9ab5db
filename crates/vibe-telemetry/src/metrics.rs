//! Metric name constants and recording helpers

use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Instrumentation scope for every router instrument
pub const METER_NAME: &str = "vibe";

pub const ROUTE_COUNT: &str = "vibe.route.count";
pub const ROUTE_DURATION: &str = "vibe.route.duration";
pub const CACHE_HIT_COUNT: &str = "vibe.cache.hit.count";
pub const CACHE_MISS_COUNT: &str = "vibe.cache.miss.count";
pub const FALLBACK_COUNT: &str = "vibe.decision.fallback.count";
pub const TOKENS_SAVED: &str = "vibe.tokens.saved";

/// Record a duration measurement on a histogram
pub fn record_duration(histogram: &Histogram<f64>, start: Instant, attributes: &[KeyValue]) {
    let duration = start.elapsed().as_secs_f64();
    histogram.record(duration, attributes);
}

/// One completed route, as seen by metrics
#[derive(Debug, Clone, Copy)]
pub struct RouteRecord<'a> {
    pub handler: &'a str,
    pub domain: &'a str,
    pub cache_hit: bool,
    pub fallback: bool,
    /// Negative when optimization regressed cost
    pub tokens_saved: i64,
    pub start: Instant,
}

/// Router instruments
///
/// Built from the global meter provider, so they are no-ops until
/// [`crate::init`] installs an exporter.
#[derive(Debug, Clone)]
pub struct RouterMetrics {
    routes: Counter<u64>,
    duration: Histogram<f64>,
    cache_hits: Counter<u64>,
    cache_misses: Counter<u64>,
    fallbacks: Counter<u64>,
    tokens_saved: Counter<u64>,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::with_meter(&opentelemetry::global::meter(METER_NAME))
    }

    pub fn with_meter(meter: &Meter) -> Self {
        Self {
            routes: meter
                .u64_counter(ROUTE_COUNT)
                .with_description("Routing decisions made")
                .build(),
            duration: meter
                .f64_histogram(ROUTE_DURATION)
                .with_description("End-to-end routing latency")
                .with_unit("s")
                .build(),
            cache_hits: meter
                .u64_counter(CACHE_HIT_COUNT)
                .with_description("Optimization plans served from cache")
                .build(),
            cache_misses: meter
                .u64_counter(CACHE_MISS_COUNT)
                .with_description("Optimization plans computed on demand")
                .build(),
            fallbacks: meter
                .u64_counter(FALLBACK_COUNT)
                .with_description("Decisions routed to the default handler")
                .build(),
            tokens_saved: meter
                .u64_counter(TOKENS_SAVED)
                .with_description("Estimated tokens saved by optimization")
                .with_unit("{token}")
                .build(),
        }
    }

    pub fn record_route(&self, record: &RouteRecord<'_>) {
        let attributes = [
            KeyValue::new("handler", record.handler.to_owned()),
            KeyValue::new("domain", record.domain.to_owned()),
            KeyValue::new("fallback", record.fallback),
        ];

        self.routes.add(1, &attributes);
        record_duration(&self.duration, record.start, &attributes);

        if record.cache_hit {
            self.cache_hits.add(1, &[]);
        } else {
            self.cache_misses.add(1, &[]);
        }
        if record.fallback {
            self.fallbacks.add(1, &attributes[1..2]);
        }
        if let Ok(saved) = u64::try_from(record.tokens_saved)
            && saved > 0
        {
            self.tokens_saved.add(saved, &attributes[..2]);
        }
    }
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_provider_is_a_noop() {
        let metrics = RouterMetrics::new();
        metrics.record_route(&RouteRecord {
            handler: "shop",
            domain: "storefront",
            cache_hit: false,
            fallback: false,
            tokens_saved: 420,
            start: Instant::now(),
        });
        metrics.record_route(&RouteRecord {
            handler: "general",
            domain: "general",
            cache_hit: true,
            fallback: true,
            tokens_saved: -30,
            start: Instant::now(),
        });
    }
}
