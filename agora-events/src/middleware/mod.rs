//! Middleware pipeline wrapping event publication
//!
//! Stages are kept in one ordered list, sorted by ascending priority. A
//! publish walks the list through a [`Next`] cursor; each stage decides
//! whether (and how often) to call `next.run(event)`, and the last cursor
//! position hands the event to the bus core.

mod analytics;
mod logging;
mod retry;
mod validation;

pub use analytics::{AnalyticsMiddleware, EventTypeMetrics};
pub use logging::{LogSink, LoggingMiddleware};
pub use retry::{RetryConfig, RetryMiddleware};
pub use validation::ValidationMiddleware;

use crate::bus::PublicationResult;
use crate::error::Result;
use crate::event::DomainEvent;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

/// Priority of the validation stage
pub const VALIDATION_PRIORITY: i32 = 0;
/// Priority of the logging stage
pub const LOGGING_PRIORITY: i32 = 10;
/// Priority of the retry stage
pub const RETRY_PRIORITY: i32 = 20;
/// Priority of the analytics stage
pub const ANALYTICS_PRIORITY: i32 = 30;

/// Terminal step of the pipeline: actually run the handlers
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, event: Arc<DomainEvent>) -> Result<PublicationResult>;
}

/// Cross-cutting stage around publication
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Unique stage name, used for removal
    fn name(&self) -> &str;

    /// Lower runs first
    fn priority(&self) -> i32 {
        100
    }

    /// Inspect, reject, delay or retry the event, calling `next` to continue
    async fn process(&self, event: Arc<DomainEvent>, next: Next<'_>) -> Result<PublicationResult>;
}

/// Cursor over the remaining stages
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    dispatch: &'a dyn Dispatch,
}

impl<'a> Next<'a> {
    pub fn new(stages: &'a [Arc<dyn Middleware>], dispatch: &'a dyn Dispatch) -> Self {
        Self { stages, dispatch }
    }

    /// Number of stages left before the core
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }

    /// Run the rest of the chain
    pub async fn run(self, event: Arc<DomainEvent>) -> Result<PublicationResult> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                trace!(middleware = stage.name(), "Executing middleware");
                stage
                    .process(event, Next::new(rest, self.dispatch))
                    .await
            }
            None => {
                trace!("Middleware chain complete, dispatching to handlers");
                self.dispatch.dispatch(event).await
            }
        }
    }
}

/// Ordered, rebuildable list of middleware stages
#[derive(Default)]
pub struct MiddlewarePipeline {
    stages: RwLock<Arc<Vec<Arc<dyn Middleware>>>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a stage, replacing any stage with the same name
    pub fn add(&self, middleware: Arc<dyn Middleware>) {
        let mut guard = self.stages.write();
        let mut stages: Vec<_> = guard
            .iter()
            .filter(|m| m.name() != middleware.name())
            .cloned()
            .collect();
        debug!(
            middleware = middleware.name(),
            priority = middleware.priority(),
            "Adding middleware"
        );
        stages.push(middleware);
        stages.sort_by_key(|m| m.priority());
        *guard = Arc::new(stages);
    }

    /// Remove a stage by name; returns whether one was removed
    pub fn remove(&self, name: &str) -> bool {
        let mut guard = self.stages.write();
        let before = guard.len();
        let stages: Vec<_> = guard.iter().filter(|m| m.name() != name).cloned().collect();
        let removed = stages.len() != before;
        if removed {
            debug!(middleware = name, "Removed middleware");
        }
        *guard = Arc::new(stages);
        removed
    }

    /// Stage names in execution order
    pub fn names(&self) -> Vec<String> {
        self.stages.read().iter().map(|m| m.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        *self.stages.write() = Arc::new(Vec::new());
    }

    /// Run `event` through every stage and finally `dispatch`
    ///
    /// The stage list is snapshotted first, so concurrent add/remove calls
    /// only affect later publishes.
    pub async fn execute(
        &self,
        event: Arc<DomainEvent>,
        dispatch: &dyn Dispatch,
    ) -> Result<PublicationResult> {
        let stages = self.stages.read().clone();
        debug!(
            middleware_count = stages.len(),
            event_type = %event.event_type(),
            "Executing middleware chain"
        );
        Next::new(&stages, dispatch).run(event).await
    }
}
