//! Error types for the event bus

use crate::event::EventType;
use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, EventError>;

/// Event bus errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventError {
    /// The event failed construction-time or pipeline validation
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Too many handlers registered for a single event type
    #[error("Handler limit of {limit} reached for event type {event_type}")]
    CapacityExceeded { event_type: EventType, limit: usize },

    /// A handler failed while error containment was disabled
    ///
    /// `executed` counts the handlers that succeeded in the same dispatch.
    #[error("Handler {handler} failed: {source}")]
    HandlerFailed {
        handler: String,
        #[source]
        source: HandlerError,
        executed: usize,
    },

    /// A handler exceeded its time box while error containment was disabled
    #[error("Handler {handler} timeout after {}ms", .after.as_millis())]
    HandlerTimeout {
        handler: String,
        after: Duration,
        executed: usize,
    },

    /// The event is older than the allowed maximum age
    #[error("Stale event {event_id}: {age_secs}s old exceeds max age of {max_age_secs}s")]
    StaleEvent {
        event_id: uuid::Uuid,
        age_secs: i64,
        max_age_secs: u64,
    },

    /// Every attempt ended in total failure
    #[error("Retry budget exhausted after {attempts} attempts: {}", .errors.join("; "))]
    RetryExhausted { attempts: u32, errors: Vec<String> },

    /// The shared bus instance has not been initialized
    #[error("Event bus has not been initialized")]
    NotInitialized,

    /// Record (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration value could not be applied
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EventError {
    /// Create an invalid event error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidEvent(msg.into())
    }

    /// Whether this error came out of handler execution
    pub fn is_handler_error(&self) -> bool {
        matches!(self, Self::HandlerFailed { .. } | Self::HandlerTimeout { .. })
    }

    /// A propagated handler error from a dispatch where no handler succeeded
    pub fn is_total_handler_failure(&self) -> bool {
        matches!(
            self,
            Self::HandlerFailed { executed: 0, .. } | Self::HandlerTimeout { executed: 0, .. }
        )
    }
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Event handler error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("handler timeout after {0}ms")]
    Timeout(u64),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Create a generic handler failure
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Whether this failure was a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
