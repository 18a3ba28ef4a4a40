//! Event Bus implementation

use crate::config::EventBusConfig;
use crate::error::{EventError, HandlerError, Result};
use crate::event::{DomainEvent, EventType};
use crate::handler::{EventHandler, HandlerResult, handler_fn};
use crate::middleware::{Dispatch, Middleware, MiddlewarePipeline};
use crate::registry::{HandlerEntry, HandlerRegistry, Subscription};
use crate::stats::{BusStatistics, StatisticsTracker};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// One handler failure captured during a publish
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerFailure {
    pub subscription_id: Uuid,
    pub handler: String,
    pub error: HandlerError,
}

impl HandlerFailure {
    /// Convert into the error returned when containment is disabled
    ///
    /// `executed` is the number of handlers that succeeded in the same dispatch.
    pub fn into_event_error(self, timeout: Duration, executed: usize) -> EventError {
        match self.error {
            HandlerError::Timeout(_) => EventError::HandlerTimeout {
                handler: self.handler,
                after: timeout,
                executed,
            },
            source => EventError::HandlerFailed {
                handler: self.handler,
                source,
                executed,
            },
        }
    }
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.handler, self.error)
    }
}

/// Outcome of one publish call
#[derive(Debug, Clone)]
pub struct PublicationResult {
    /// True iff no handler failed
    pub success: bool,
    pub handlers_executed: usize,
    pub handlers_failed: usize,
    /// Failures in the order they were observed
    pub errors: Vec<HandlerFailure>,
    pub execution_time: Duration,
    pub event: Arc<DomainEvent>,
}

impl PublicationResult {
    /// Result for a publish that reached no handlers
    pub fn empty(event: Arc<DomainEvent>, execution_time: Duration) -> Self {
        Self {
            success: true,
            handlers_executed: 0,
            handlers_failed: 0,
            errors: Vec::new(),
            execution_time,
            event,
        }
    }

    /// No handler succeeded and at least one failed
    pub fn is_total_failure(&self) -> bool {
        self.handlers_executed == 0 && !self.errors.is_empty()
    }

    /// Some handlers succeeded and some failed
    pub fn is_partial_failure(&self) -> bool {
        self.handlers_executed > 0 && self.handlers_failed > 0
    }
}

/// The part of the bus that owns handlers and statistics
struct BusCore {
    registry: HandlerRegistry,
    config: EventBusConfig,
    stats: StatisticsTracker,
}

impl BusCore {
    async fn invoke(&self, entry: &HandlerEntry, event: Arc<DomainEvent>) -> HandlerResult {
        let timeout = self.config.handler_timeout;
        let call = AssertUnwindSafe(entry.handler().handle(event)).catch_unwind();

        // The timer is dropped together with the race, whichever side wins.
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(HandlerError::Timeout(timeout.as_millis() as u64)),
        }
    }

    async fn run_sequential(
        &self,
        handlers: &[HandlerEntry],
        event: &Arc<DomainEvent>,
    ) -> Vec<(usize, HandlerResult)> {
        let stop_early = self.config.stop_on_first_failure || !self.config.catch_handler_errors;
        let mut outcomes = Vec::with_capacity(handlers.len());
        for (index, entry) in handlers.iter().enumerate() {
            let outcome = self.invoke(entry, event.clone()).await;
            let failed = outcome.is_err();
            outcomes.push((index, outcome));
            if failed && stop_early {
                debug!(
                    skipped = handlers.len() - index - 1,
                    "Stopping dispatch after handler failure"
                );
                break;
            }
        }
        outcomes
    }

    async fn run_parallel(
        &self,
        handlers: &[HandlerEntry],
        event: &Arc<DomainEvent>,
    ) -> Vec<(usize, HandlerResult)> {
        let mut calls = Vec::with_capacity(handlers.len());
        for (index, entry) in handlers.iter().enumerate() {
            let event = event.clone();
            calls.push(async move { (index, self.invoke(entry, event).await) });
        }
        join_all(calls).await
    }
}

#[async_trait]
impl Dispatch for BusCore {
    async fn dispatch(&self, event: Arc<DomainEvent>) -> Result<PublicationResult> {
        let start = Instant::now();
        let event_type = event.event_type();
        let handlers = self.registry.get_handlers(event_type);

        if handlers.is_empty() {
            debug!(
                event_type = %event_type,
                event_id = %event.event_id(),
                "No handlers registered for event"
            );
            let elapsed = start.elapsed();
            self.stats.record(event_type, 0, 0, elapsed);
            return Ok(PublicationResult::empty(event, elapsed));
        }

        let outcomes = if self.config.execute_in_parallel {
            self.run_parallel(&handlers, &event).await
        } else {
            self.run_sequential(&handlers, &event).await
        };

        let mut executed = 0;
        let mut errors = Vec::new();
        for (index, outcome) in outcomes {
            let entry = &handlers[index];
            match outcome {
                Ok(()) => executed += 1,
                Err(e) => {
                    error!(
                        event_type = %event_type,
                        event_id = %event.event_id(),
                        handler = entry.name(),
                        error = %e,
                        "Handler failed"
                    );
                    errors.push(HandlerFailure {
                        subscription_id: entry.subscription_id(),
                        handler: entry.name().to_string(),
                        error: e,
                    });
                }
            }
        }

        let elapsed = start.elapsed();
        self.stats.record(event_type, executed, errors.len(), elapsed);
        debug!(
            event_type = %event_type,
            event_id = %event.event_id(),
            handlers = handlers.len(),
            executed,
            failed = errors.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Event dispatched"
        );

        if !self.config.catch_handler_errors && !errors.is_empty() {
            let first = errors.swap_remove(0);
            return Err(first.into_event_error(self.config.handler_timeout, executed));
        }

        Ok(PublicationResult {
            success: errors.is_empty(),
            handlers_executed: executed,
            handlers_failed: errors.len(),
            errors,
            execution_time: elapsed,
            event,
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Event bus for in-process domain event publishing
///
/// Cloning is cheap; clones share handlers, statistics and middleware.
#[derive(Clone)]
pub struct EventBus {
    core: Arc<BusCore>,
    pipeline: Arc<MiddlewarePipeline>,
}

impl EventBus {
    /// Create new event bus
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create event bus with custom config
    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            core: Arc::new(BusCore {
                registry: HandlerRegistry::with_capacity_limit(config.max_handlers_per_event),
                config,
                stats: StatisticsTracker::new(),
            }),
            pipeline: Arc::new(MiddlewarePipeline::new()),
        }
    }

    /// Start building an event bus
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.core.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.core.registry
    }

    /// Subscribe a handler to an event type
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let bus = EventBus::new();
    /// let subscription = bus.subscribe(EventType::PostCreated, NotificationHandler::new())?;
    /// ```
    pub fn subscribe<H>(&self, event_type: EventType, handler: H) -> Result<Subscription>
    where
        H: EventHandler + 'static,
    {
        self.subscribe_arc(event_type, Arc::new(handler))
    }

    /// Subscribe a shared handler
    pub fn subscribe_arc(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription> {
        self.core.registry.register(event_type, handler).inspect_err(|e| {
            warn!(event_type = %event_type, error = %e, "Subscription rejected");
        })
    }

    /// Subscribe an async closure
    pub fn subscribe_fn<F, Fut>(&self, event_type: EventType, func: F) -> Result<Subscription>
    where
        F: Fn(Arc<DomainEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe(event_type, handler_fn(func))
    }

    /// Remove a subscription; safe to call more than once
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.core.registry.unregister(subscription)
    }

    /// Publish an event
    ///
    /// The event passes through the middleware pipeline and is then delivered
    /// to every handler registered for its type at this moment. Handler
    /// failures are reported inside the result unless error containment is
    /// disabled.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let result = bus.publish(DomainEvent::new(post_created)?).await?;
    /// assert!(result.success);
    /// ```
    pub async fn publish(&self, event: impl Into<Arc<DomainEvent>>) -> Result<PublicationResult> {
        let event = event.into();
        debug!(
            event_type = %event.event_type(),
            event_id = %event.event_id(),
            "Publishing event"
        );
        self.pipeline.execute(event, self.core.as_ref()).await
    }

    /// Publish several events one after another
    pub async fn publish_all<I>(&self, events: I) -> Vec<Result<PublicationResult>>
    where
        I: IntoIterator<Item = DomainEvent>,
    {
        let mut results = Vec::new();
        for event in events {
            results.push(self.publish(event).await);
        }
        results
    }

    /// Get handler count for an event type
    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.core.registry.handler_count(event_type)
    }

    /// Current statistics snapshot
    pub fn statistics(&self) -> BusStatistics {
        self.core
            .stats
            .snapshot(self.core.registry.total_subscriptions())
    }

    pub fn reset_statistics(&self) {
        self.core.stats.reset();
    }

    /// Clear all handlers
    pub fn clear(&self) {
        self.core.registry.clear();
    }

    /// Add a middleware stage
    pub fn add_middleware<M: Middleware + 'static>(&self, middleware: M) {
        self.pipeline.add(Arc::new(middleware));
    }

    /// Add a shared middleware stage
    pub fn add_middleware_arc(&self, middleware: Arc<dyn Middleware>) {
        self.pipeline.add(middleware);
    }

    /// Remove a middleware stage by name
    pub fn remove_middleware(&self, name: &str) -> bool {
        self.pipeline.remove(name)
    }

    /// Middleware names in execution order
    pub fn middleware_names(&self) -> Vec<String> {
        self.pipeline.names()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event bus builder
pub struct EventBusBuilder {
    config: EventBusConfig,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl EventBusBuilder {
    /// Create new event bus builder
    pub fn new() -> Self {
        Self {
            config: EventBusConfig::default(),
            middleware: Vec::new(),
        }
    }

    /// Start from an existing config
    pub fn config(mut self, config: EventBusConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_handlers_per_event(mut self, max: usize) -> Self {
        self.config.max_handlers_per_event = max;
        self
    }

    /// Enable/disable concurrent handler execution
    pub fn execute_in_parallel(mut self, enabled: bool) -> Self {
        self.config.execute_in_parallel = enabled;
        self
    }

    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.config.handler_timeout = timeout;
        self
    }

    /// Enable/disable handler error containment
    pub fn catch_handler_errors(mut self, enabled: bool) -> Self {
        self.config.catch_handler_errors = enabled;
        self
    }

    pub fn stop_on_first_failure(mut self, enabled: bool) -> Self {
        self.config.stop_on_first_failure = enabled;
        self
    }

    /// Add a middleware stage
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Build the event bus
    pub fn build(self) -> EventBus {
        let bus = EventBus::with_config(self.config);
        for middleware in self.middleware {
            bus.add_middleware_arc(middleware);
        }
        bus
    }
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}
