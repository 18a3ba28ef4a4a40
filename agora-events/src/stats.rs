//! Aggregate bus statistics

use crate::event::EventType;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Point-in-time copy of the bus counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStatistics {
    pub total_events_published: u64,
    pub total_handlers_executed: u64,
    pub total_handler_failures: u64,
    pub active_subscriptions: usize,
    pub events_by_type: HashMap<String, u64>,
    /// Running average publish time per event type, in milliseconds
    pub average_execution_ms: HashMap<String, f64>,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl BusStatistics {
    pub fn published(&self, event_type: EventType) -> u64 {
        self.events_by_type
            .get(event_type.as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn average_ms(&self, event_type: EventType) -> Option<f64> {
        self.average_execution_ms.get(event_type.as_str()).copied()
    }
}

#[derive(Debug, Default)]
struct Counters {
    total_events_published: u64,
    total_handlers_executed: u64,
    total_handler_failures: u64,
    by_type: HashMap<EventType, TypeCounters>,
    last_event_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct TypeCounters {
    published: u64,
    average_ms: f64,
}

/// Statistics owned by one bus
#[derive(Debug, Default)]
pub(crate) struct StatisticsTracker {
    counters: RwLock<Counters>,
}

impl StatisticsTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(
        &self,
        event_type: EventType,
        executed: usize,
        failed: usize,
        elapsed: Duration,
    ) {
        let mut counters = self.counters.write();
        counters.total_events_published += 1;
        counters.total_handlers_executed += executed as u64;
        counters.total_handler_failures += failed as u64;
        counters.last_event_at = Some(Utc::now());

        let entry = counters.by_type.entry(event_type).or_default();
        entry.published += 1;
        let sample = elapsed.as_secs_f64() * 1000.0;
        entry.average_ms += (sample - entry.average_ms) / entry.published as f64;
    }

    pub(crate) fn snapshot(&self, active_subscriptions: usize) -> BusStatistics {
        let counters = self.counters.read();
        BusStatistics {
            total_events_published: counters.total_events_published,
            total_handlers_executed: counters.total_handlers_executed,
            total_handler_failures: counters.total_handler_failures,
            active_subscriptions,
            events_by_type: counters
                .by_type
                .iter()
                .map(|(ty, c)| (ty.as_str().to_string(), c.published))
                .collect(),
            average_execution_ms: counters
                .by_type
                .iter()
                .map(|(ty, c)| (ty.as_str().to_string(), c.average_ms))
                .collect(),
            last_event_at: counters.last_event_at,
        }
    }

    pub(crate) fn reset(&self) {
        *self.counters.write() = Counters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let stats = StatisticsTracker::new();
        stats.record(EventType::PostCreated, 2, 0, Duration::from_millis(10));
        stats.record(EventType::PostCreated, 1, 1, Duration::from_millis(30));
        stats.record(EventType::UserLoggedIn, 0, 0, Duration::ZERO);

        let snapshot = stats.snapshot(3);
        assert_eq!(snapshot.total_events_published, 3);
        assert_eq!(snapshot.total_handlers_executed, 3);
        assert_eq!(snapshot.total_handler_failures, 1);
        assert_eq!(snapshot.active_subscriptions, 3);
        assert_eq!(snapshot.published(EventType::PostCreated), 2);
        assert_eq!(snapshot.published(EventType::UserLoggedIn), 1);

        let avg = snapshot.average_ms(EventType::PostCreated).unwrap();
        assert!((avg - 20.0).abs() < 1e-9);
        assert!(snapshot.last_event_at.is_some());
    }

    #[test]
    fn test_reset() {
        let stats = StatisticsTracker::new();
        stats.record(EventType::PostCreated, 1, 0, Duration::from_millis(1));
        stats.reset();

        let snapshot = stats.snapshot(0);
        assert_eq!(snapshot, BusStatistics::default());
    }
}
