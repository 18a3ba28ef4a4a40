//! Domain event bus for Agora applications
//!
//! This crate provides in-process publishing of domain events (post created,
//! reaction added, user registered, ...) to any number of subscribers, so the
//! use case that changed state never waits on or fails because of its side
//! effects.
//!
//! ## Features
//!
//! - **Typed events** - A closed set of validated event payloads
//! - **Revocable subscriptions** - Idempotent unsubscribe handles
//! - **Execution policy** - Parallel or sequential dispatch, per-handler timeouts
//! - **Error containment** - Handler failures are reported, not thrown
//! - **Middleware** - Validation, logging, retry and analytics stages
//! - **Profiles** - Ready-made development, production and test buses
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agora_events::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EventError> {
//!     let bus = EventBusFactory::create(Profile::Production);
//!
//!     bus.subscribe_fn(EventType::PostCreated, |event| async move {
//!         println!("notify followers about {}", event.event_id());
//!         Ok(())
//!     })?;
//!
//!     let event = DomainEvent::builder(PostCreated {
//!         post_id: "p1".into(),
//!         author_id: "u1".into(),
//!         content: "hello".into(),
//!         tags: vec![],
//!         community_id: None,
//!     })
//!     .user_id("u1")
//!     .build()?;
//!
//!     let result = bus.publish(event).await?;
//!     assert!(result.success);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust,ignore
//! let bus = EventBus::builder()
//!     .execute_in_parallel(false)           // Run handlers in subscription order
//!     .handler_timeout(Duration::from_secs(2))
//!     .catch_handler_errors(true)           // Report failures in the result
//!     .middleware(ValidationMiddleware::new())
//!     .middleware(RetryMiddleware::new(RetryConfig::new(3)))
//!     .build();
//! ```
//!
//! ## Error Handling
//!
//! ```rust,ignore
//! match bus.publish(event).await {
//!     Ok(result) if result.success => {}
//!     Ok(result) => eprintln!("{} handlers failed: {:?}", result.handlers_failed, result.errors),
//!     Err(EventError::RetryExhausted { attempts, .. }) => eprintln!("gave up after {attempts}"),
//!     Err(e) => eprintln!("publish rejected: {e}"),
//! }
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod factory;
pub mod handler;
pub mod middleware;
pub mod registry;
pub mod stats;

pub use bus::{EventBus, EventBusBuilder, HandlerFailure, PublicationResult};
pub use config::EventBusConfig;
pub use error::{EventError, HandlerError, Result};
pub use event::{
    AnnouncementPublished, Audience, CampusEventCreated, CommentAdded, CommunityJoined,
    DomainEvent, DomainEventBuilder, EventPayload, EventRecord, EventType, LoginMethod,
    MemberRole, PostCreated, PostDeleted, PostUpdated, PostViewed, ReactionAdded,
    ReactionKind, ReactionRemoved, UserLoggedIn, UserRegistered, Validate, ViewSource,
};
pub use factory::{BusManager, EventBusFactory, FactoryOptions, Profile};
pub use handler::{EventHandler, FnHandler, HandlerResult, handler_fn, named_handler_fn};
pub use middleware::{
    AnalyticsMiddleware, Dispatch, EventTypeMetrics, LogSink, LoggingMiddleware, Middleware,
    MiddlewarePipeline, Next, RetryConfig, RetryMiddleware, ValidationMiddleware,
};
pub use registry::{HandlerRegistry, Subscription};
pub use stats::BusStatistics;
