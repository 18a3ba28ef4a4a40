//! Validation stage

use super::{Middleware, Next, VALIDATION_PRIORITY};
use crate::bus::PublicationResult;
use crate::error::{EventError, Result};
use crate::event::DomainEvent;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default maximum event age
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Rejects malformed or stale events before any handler sees them
#[derive(Debug, Clone)]
pub struct ValidationMiddleware {
    max_age: Duration,
}

impl ValidationMiddleware {
    pub fn new() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Set the maximum accepted event age
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    fn check(&self, event: &DomainEvent) -> Result<()> {
        event.validate()?;

        let age = event.age_at(Utc::now());
        let max_age = chrono::Duration::from_std(self.max_age)
            .map_err(|e| EventError::InvalidConfig(format!("max age: {e}")))?;
        if age > max_age {
            return Err(EventError::StaleEvent {
                event_id: event.event_id(),
                age_secs: age.num_seconds(),
                max_age_secs: self.max_age.as_secs(),
            });
        }
        Ok(())
    }
}

impl Default for ValidationMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for ValidationMiddleware {
    fn name(&self) -> &str {
        "validation"
    }

    fn priority(&self) -> i32 {
        VALIDATION_PRIORITY
    }

    async fn process(&self, event: Arc<DomainEvent>, next: Next<'_>) -> Result<PublicationResult> {
        if let Err(e) = self.check(&event) {
            warn!(
                event_type = %event.event_type(),
                event_id = %event.event_id(),
                error = %e,
                "Event rejected by validation"
            );
            return Err(e);
        }
        next.run(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::event::{EventType, PostCreated};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn payload() -> PostCreated {
        PostCreated {
            post_id: "p1".into(),
            author_id: "u1".into(),
            content: "hello".into(),
            tags: vec!["intro".into()],
            community_id: None,
        }
    }

    #[tokio::test]
    async fn test_fresh_event_passes() {
        let bus = EventBus::builder().middleware(ValidationMiddleware::new()).build();
        let result = bus.publish(DomainEvent::new(payload()).unwrap()).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_stale_event_rejected_before_dispatch() {
        let calls = Arc::new(AtomicU32::new(0));
        let bus = EventBus::builder().middleware(ValidationMiddleware::new()).build();
        let counter = calls.clone();
        bus.subscribe_fn(EventType::PostCreated, move |_event| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        let old = DomainEvent::builder(payload())
            .occurred_at(Utc::now() - chrono::Duration::hours(25))
            .build()
            .unwrap();

        let err = bus.publish(old).await.unwrap_err();
        assert!(matches!(err, EventError::StaleEvent { max_age_secs: 86_400, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_custom_max_age() {
        let bus = EventBus::builder()
            .middleware(ValidationMiddleware::new().max_age(Duration::from_secs(60)))
            .build();
        let event = DomainEvent::builder(payload())
            .occurred_at(Utc::now() - chrono::Duration::minutes(2))
            .build()
            .unwrap();

        assert!(bus.publish(event).await.is_err());
    }
}
