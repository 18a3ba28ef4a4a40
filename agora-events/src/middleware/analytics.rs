//! Analytics stage
//!
//! Keeps its own per-event-type counters, separate from the bus statistics:
//! execution count, success rate and a rolling average latency over the most
//! recent publishes.

use super::{ANALYTICS_PRIORITY, Middleware, Next};
use crate::bus::PublicationResult;
use crate::error::Result;
use crate::event::{DomainEvent, EventType};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default rolling latency window
pub const DEFAULT_LATENCY_WINDOW: usize = 100;

/// Observability counters for one event type
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeMetrics {
    pub count: u64,
    pub successes: u64,
    pub failures: u64,
    pub handlers_executed: u64,
    pub handlers_failed: u64,
    /// Rolling average latency in milliseconds
    pub average_latency_ms: f64,
}

impl EventTypeMetrics {
    /// Fraction of publishes without any handler failure
    pub fn success_rate(&self) -> f64 {
        if self.count == 0 {
            return 1.0;
        }
        self.successes as f64 / self.count as f64
    }
}

#[derive(Debug, Default)]
struct Window {
    metrics: EventTypeMetrics,
    samples: VecDeque<Duration>,
}

/// Captures per-event-type execution analytics
#[derive(Debug, Clone)]
pub struct AnalyticsMiddleware {
    window: usize,
    data: Arc<DashMap<EventType, Window>>,
}

impl AnalyticsMiddleware {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_LATENCY_WINDOW)
    }

    /// Average latency over the last `window` publishes
    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(1),
            data: Arc::new(DashMap::new()),
        }
    }

    /// Metrics for one event type
    pub fn metrics(&self, event_type: EventType) -> Option<EventTypeMetrics> {
        self.data.get(&event_type).map(|w| w.metrics.clone())
    }

    /// Metrics for every event type seen so far, keyed by tag
    pub fn snapshot(&self) -> Vec<(EventType, EventTypeMetrics)> {
        let mut all: Vec<_> = self
            .data
            .iter()
            .map(|entry| (*entry.key(), entry.value().metrics.clone()))
            .collect();
        all.sort_by_key(|(ty, _)| *ty);
        all
    }

    pub fn reset(&self) {
        self.data.clear();
    }

    fn record(
        &self,
        event_type: EventType,
        outcome: &Result<PublicationResult>,
        latency: Duration,
    ) {
        let mut entry = self.data.entry(event_type).or_default();
        let window = &mut *entry;

        window.metrics.count += 1;
        match outcome {
            Ok(result) => {
                window.metrics.handlers_executed += result.handlers_executed as u64;
                window.metrics.handlers_failed += result.handlers_failed as u64;
                if result.success {
                    window.metrics.successes += 1;
                } else {
                    window.metrics.failures += 1;
                }
            }
            Err(_) => window.metrics.failures += 1,
        }

        window.samples.push_back(latency);
        while window.samples.len() > self.window {
            window.samples.pop_front();
        }
        let total: Duration = window.samples.iter().sum();
        window.metrics.average_latency_ms =
            total.as_secs_f64() * 1000.0 / window.samples.len() as f64;
    }
}

impl Default for AnalyticsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for AnalyticsMiddleware {
    fn name(&self) -> &str {
        "analytics"
    }

    fn priority(&self) -> i32 {
        ANALYTICS_PRIORITY
    }

    async fn process(&self, event: Arc<DomainEvent>, next: Next<'_>) -> Result<PublicationResult> {
        let event_type = event.event_type();
        let start = Instant::now();
        let outcome = next.run(event).await;
        self.record(event_type, &outcome, start.elapsed());
        outcome
    }
}
