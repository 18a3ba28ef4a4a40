//! Handler registry and subscription handles

use crate::error::{EventError, Result};
use crate::event::EventType;
use crate::handler::EventHandler;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use uuid::Uuid;

/// Default per-event-type handler limit
pub const DEFAULT_MAX_HANDLERS_PER_EVENT: usize = 50;

/// A registered handler as seen by dispatch
#[derive(Clone)]
pub struct HandlerEntry {
    subscription_id: Uuid,
    handler: Arc<dyn EventHandler>,
    active: Arc<AtomicBool>,
}

impl HandlerEntry {
    pub fn subscription_id(&self) -> Uuid {
        self.subscription_id
    }

    pub fn handler(&self) -> &Arc<dyn EventHandler> {
        &self.handler
    }

    pub fn name(&self) -> &str {
        self.handler.name()
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("subscription_id", &self.subscription_id)
            .field("handler", &self.handler.name())
            .finish()
    }
}

struct RegistryInner {
    handlers: DashMap<EventType, Vec<HandlerEntry>>,
    max_handlers_per_event: usize,
}

impl RegistryInner {
    fn remove(&self, event_type: EventType, subscription_id: Uuid) {
        let mut now_empty = false;
        if let Some(mut entries) = self.handlers.get_mut(&event_type) {
            entries.retain(|e| e.subscription_id != subscription_id);
            now_empty = entries.is_empty();
        }
        if now_empty {
            self.handlers.remove_if(&event_type, |_, v| v.is_empty());
        }
    }
}

/// Maps event types to their ordered handlers
#[derive(Clone)]
pub struct HandlerRegistry {
    inner: Arc<RegistryInner>,
}

impl HandlerRegistry {
    /// Create a registry with the default handler limit
    pub fn new() -> Self {
        Self::with_capacity_limit(DEFAULT_MAX_HANDLERS_PER_EVENT)
    }

    /// Create a registry with a custom per-event-type handler limit
    pub fn with_capacity_limit(max_handlers_per_event: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                handlers: DashMap::new(),
                max_handlers_per_event,
            }),
        }
    }

    pub fn max_handlers_per_event(&self) -> usize {
        self.inner.max_handlers_per_event
    }

    /// Register a handler for an event type
    ///
    /// Fails with [`EventError::CapacityExceeded`] once the event type already
    /// holds the configured maximum; existing registrations are untouched.
    pub fn register(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription> {
        let limit = self.inner.max_handlers_per_event;
        // A zero limit must not leave an empty entry behind.
        if limit == 0 {
            return Err(EventError::CapacityExceeded { event_type, limit });
        }
        let mut entries = self.inner.handlers.entry(event_type).or_default();
        if entries.len() >= limit {
            return Err(EventError::CapacityExceeded { event_type, limit });
        }

        let active = Arc::new(AtomicBool::new(true));
        let subscription_id = Uuid::new_v4();
        debug!(
            event_type = %event_type,
            subscription_id = %subscription_id,
            handler = handler.name(),
            "Registered handler"
        );
        entries.push(HandlerEntry {
            subscription_id,
            handler,
            active: active.clone(),
        });

        Ok(Subscription {
            id: subscription_id,
            event_type,
            active,
            registry: Arc::downgrade(&self.inner),
        })
    }

    /// Remove a subscription; returns whether this call removed it
    pub fn unregister(&self, subscription: &Subscription) -> bool {
        subscription.unsubscribe()
    }

    /// Snapshot of the handlers currently registered for an event type
    pub fn get_handlers(&self, event_type: EventType) -> Vec<HandlerEntry> {
        self.inner
            .handlers
            .get(&event_type)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.inner
            .handlers
            .get(&event_type)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Total active subscriptions across all event types
    pub fn total_subscriptions(&self) -> usize {
        self.inner.handlers.iter().map(|e| e.value().len()).sum()
    }

    /// Event types that currently have at least one handler
    pub fn event_types(&self) -> Vec<EventType> {
        let mut types: Vec<_> = self.inner.handlers.iter().map(|e| *e.key()).collect();
        types.sort();
        types
    }

    /// Remove every registration
    pub fn clear(&self) {
        for entries in self.inner.handlers.iter() {
            for entry in entries.value() {
                entry.active.store(false, Ordering::SeqCst);
            }
        }
        self.inner.handlers.clear();
        info!("Cleared all event handlers");
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Revocable registration of one handler against one event type
///
/// The handle only weakly references the registry. Dropping it does not
/// unsubscribe; the registration stays until [`Subscription::unsubscribe`]
/// or a registry `clear()`.
#[derive(Clone)]
pub struct Subscription {
    id: Uuid,
    event_type: EventType,
    active: Arc<AtomicBool>,
    registry: Weak<RegistryInner>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop future dispatch to this handler
    ///
    /// Idempotent: only the first call returns `true`.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.event_type, self.id);
        }
        debug!(
            event_type = %self.event_type,
            subscription_id = %self.id,
            "Unsubscribed handler"
        );
        true
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("is_active", &self.is_active())
            .finish()
    }
}
