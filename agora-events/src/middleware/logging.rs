//! Logging stage

use super::{LOGGING_PRIORITY, Middleware, Next};
use crate::bus::PublicationResult;
use crate::error::Result;
use crate::event::DomainEvent;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Level, error, info, warn};

/// Optional callback receiving every line the logging stage writes
pub type LogSink = Arc<dyn Fn(Level, &str) + Send + Sync>;

/// Records entry, exit and timing around the rest of the chain
///
/// Never alters the event or the result.
#[derive(Clone, Default)]
pub struct LoggingMiddleware {
    sink: Option<LogSink>,
    log_payload: bool,
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also forward log lines to `sink`
    pub fn with_sink(mut self, sink: LogSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Include the serialized payload in the entry line
    pub fn with_payload(mut self) -> Self {
        self.log_payload = true;
        self
    }

    fn emit(&self, level: Level, line: &str) {
        if let Some(sink) = &self.sink {
            sink(level, line);
        }
    }
}

impl fmt::Debug for LoggingMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingMiddleware")
            .field("sink", &self.sink.is_some())
            .field("log_payload", &self.log_payload)
            .finish()
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    fn priority(&self) -> i32 {
        LOGGING_PRIORITY
    }

    async fn process(&self, event: Arc<DomainEvent>, next: Next<'_>) -> Result<PublicationResult> {
        let start = Instant::now();
        let event_type = event.event_type();
        let event_id = event.event_id();

        let mut line = format!("-> {event_type} {event_id}");
        if let Some(correlation_id) = event.correlation_id() {
            line.push_str(&format!(" correlation={correlation_id}"));
        }
        if self.log_payload
            && let Ok(data) = event.payload().to_value()
        {
            line.push_str(&format!(" data={data}"));
        }
        info!(
            event_type = %event_type,
            event_id = %event_id,
            correlation_id = event.correlation_id(),
            user_id = event.user_id(),
            "Publishing event"
        );
        self.emit(Level::INFO, &line);

        let result = next.run(event).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(outcome) if outcome.success => {
                info!(
                    event_type = %event_type,
                    event_id = %event_id,
                    executed = outcome.handlers_executed,
                    elapsed_ms,
                    "Event published"
                );
                self.emit(
                    Level::INFO,
                    &format!(
                        "<- {event_type} {event_id} ok executed={} ({elapsed_ms}ms)",
                        outcome.handlers_executed
                    ),
                );
            }
            Ok(outcome) => {
                warn!(
                    event_type = %event_type,
                    event_id = %event_id,
                    executed = outcome.handlers_executed,
                    failed = outcome.handlers_failed,
                    elapsed_ms,
                    "Event published with handler failures"
                );
                self.emit(
                    Level::WARN,
                    &format!(
                        "<- {event_type} {event_id} executed={} failed={} ({elapsed_ms}ms)",
                        outcome.handlers_executed, outcome.handlers_failed
                    ),
                );
            }
            Err(e) => {
                error!(
                    event_type = %event_type,
                    event_id = %event_id,
                    error = %e,
                    elapsed_ms,
                    "Event publication failed"
                );
                self.emit(
                    Level::ERROR,
                    &format!("<- {event_type} {event_id} error: {e} ({elapsed_ms}ms)"),
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::error::HandlerError;
    use crate::event::{CommunityJoined, EventType, MemberRole};
    use parking_lot::Mutex;

    fn event() -> DomainEvent {
        DomainEvent::builder(CommunityJoined {
            community_id: "chess-club".into(),
            user_id: "u1".into(),
            role: MemberRole::Member,
        })
        .correlation_id("req-9")
        .build()
        .unwrap()
    }

    fn capture() -> (LogSink, Arc<Mutex<Vec<(Level, String)>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = lines.clone();
        let sink: LogSink = Arc::new(move |level: Level, line: &str| {
            sink_lines.lock().push((level, line.to_string()));
        });
        (sink, lines)
    }

    #[tokio::test]
    async fn test_logs_entry_and_exit() {
        let (sink, lines) = capture();
        let bus = EventBus::builder()
            .middleware(LoggingMiddleware::new().with_sink(sink).with_payload())
            .build();
        bus.subscribe_fn(EventType::CommunityJoined, |_event| async { Ok(()) })
            .unwrap();

        let result = bus.publish(event()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.handlers_executed, 1);

        let lines = lines.lock();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, Level::INFO);
        assert!(lines[0].1.starts_with("-> community.joined"));
        assert!(lines[0].1.contains("correlation=req-9"));
        assert!(lines[0].1.contains("chess-club"));
        assert!(lines[1].1.contains("ok executed=1"));
    }

    #[tokio::test]
    async fn test_failures_logged_as_warning() {
        let (sink, lines) = capture();
        let bus = EventBus::builder()
            .middleware(LoggingMiddleware::new().with_sink(sink))
            .build();
        bus.subscribe_fn(EventType::CommunityJoined, |_event| async {
            Err(HandlerError::failed("cache unavailable"))
        })
        .unwrap();

        let result = bus.publish(event()).await.unwrap();

        assert_eq!(result.handlers_failed, 1);
        let lines = lines.lock();
        assert_eq!(lines[1].0, Level::WARN);
        assert!(lines[1].1.contains("failed=1"));
    }
}
