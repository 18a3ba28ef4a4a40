// Agora - backend building blocks for a university social app
//
// This library re-exports the domain event bus: typed campus events, revocable
// subscriptions, a middleware pipeline and ready-made execution profiles.

// Re-export the event bus
pub use agora_events::*;

// Re-export the crate itself for fully qualified paths
pub use agora_events as events;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        BusManager,
        DomainEvent,
        EventBus,
        EventBusConfig,
        EventBusFactory,
        EventError,
        EventHandler,
        EventPayload,
        EventType,
        HandlerError,
        HandlerResult,
        // Middleware
        Middleware,
        Next,
        Profile,
        PublicationResult,
        Subscription,
        handler_fn,
        named_handler_fn,
    };
}
