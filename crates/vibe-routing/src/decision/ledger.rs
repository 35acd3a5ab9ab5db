//! Per-handler outcome accounting
//!
//! Counters are atomics behind a `DashMap` entry so concurrent outcome
//! reports for the same handler never lose increments.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Default)]
struct HandlerCounters {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    total_cost: AtomicU64,
}

/// Snapshot of a handler's observed performance
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HandlerPerformance {
    pub total_requests: u64,
    pub successful_requests: u64,
    /// Successful over total; `None` before the first outcome
    pub success_rate: Option<f64>,
    /// Mean tokens per request; `None` before the first outcome
    pub average_cost: Option<f64>,
}

/// Rolling performance ledger keyed by handler id
#[derive(Debug, Default)]
pub struct PerformanceLedger {
    handlers: DashMap<String, HandlerCounters>,
}

impl PerformanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome for a handler
    pub fn record(&self, handler_id: &str, success: bool, cost: u64) {
        let entry = self.handlers.entry(handler_id.to_owned()).or_default();

        entry.total_requests.fetch_add(1, Ordering::Relaxed);
        entry.total_cost.fetch_add(cost, Ordering::Relaxed);
        if success {
            entry.successful_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current performance of a handler; all-zero when never seen
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self, handler_id: &str) -> HandlerPerformance {
        let Some(entry) = self.handlers.get(handler_id) else {
            return HandlerPerformance::default();
        };

        let total = entry.total_requests.load(Ordering::Relaxed);
        let successful = entry.successful_requests.load(Ordering::Relaxed);
        let cost = entry.total_cost.load(Ordering::Relaxed);
        drop(entry);

        if total == 0 {
            return HandlerPerformance::default();
        }

        HandlerPerformance {
            total_requests: total,
            successful_requests: successful,
            success_rate: Some(successful as f64 / total as f64),
            average_cost: Some(cost as f64 / total as f64),
        }
    }

    /// Ids of every handler with recorded outcomes
    pub fn handlers(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.handlers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
