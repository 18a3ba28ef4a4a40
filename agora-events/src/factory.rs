//! Profile-based bus construction and the optional shared instance
//!
//! Applications should construct an [`EventBus`] once and pass it to the
//! services that need it. [`BusManager`] exists for code paths where
//! threading the bus through is impractical.

use crate::bus::EventBus;
use crate::config::{EventBusConfig, env_parse};
use crate::error::{EventError, Result};
use crate::middleware::{
    AnalyticsMiddleware, LogSink, LoggingMiddleware, RetryConfig, RetryMiddleware,
    ValidationMiddleware,
};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Execution profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Profile {
    /// Sequential, every stage enabled, generous timeouts
    #[default]
    Development,
    /// Parallel, no logging stage, tight timeouts
    Production,
    /// Sequential, no middleware, handler errors propagate
    Test,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Development => "development",
            Profile::Production => "production",
            Profile::Test => "test",
        }
    }

    /// Read `AGORA_EVENTS_PROFILE`, defaulting to development
    pub fn from_env() -> Self {
        env_parse::<String>("AGORA_EVENTS_PROFILE")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Base bus configuration for this profile
    pub fn bus_config(&self) -> EventBusConfig {
        match self {
            Profile::Development => EventBusConfig {
                execute_in_parallel: false,
                handler_timeout: Duration::from_secs(30),
                ..Default::default()
            },
            Profile::Production => EventBusConfig {
                execute_in_parallel: true,
                handler_timeout: Duration::from_secs(5),
                ..Default::default()
            },
            Profile::Test => EventBusConfig {
                execute_in_parallel: false,
                handler_timeout: Duration::from_secs(1),
                catch_handler_errors: false,
                ..Default::default()
            },
        }
    }

    /// Retry tuning for this profile
    pub fn retry_config(&self) -> RetryConfig {
        match self {
            Profile::Development => RetryConfig::new(3)
                .base_delay(Duration::from_millis(100))
                .max_delay(Duration::from_secs(5)),
            Profile::Production => RetryConfig::new(3)
                .base_delay(Duration::from_millis(200))
                .max_delay(Duration::from_secs(10)),
            Profile::Test => RetryConfig::new(0),
        }
    }
}

impl FromStr for Profile {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Profile::Development),
            "production" | "prod" => Ok(Profile::Production),
            "test" => Ok(Profile::Test),
            other => Err(EventError::InvalidConfig(format!(
                "unknown profile {other:?}, expected development, production or test"
            ))),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full factory input: profile defaults plus overrides
#[derive(Clone, Default)]
pub struct FactoryOptions {
    pub bus: Option<EventBusConfig>,
    pub retry: Option<RetryConfig>,
    pub logger: Option<LogSink>,
}

impl FactoryOptions {
    /// Overrides read from `AGORA_EVENTS_*` variables on top of `profile`
    pub fn from_env(profile: Profile) -> Self {
        Self {
            bus: Some(profile.bus_config().merge_env()),
            retry: Some(profile.retry_config().merge_env()),
            logger: None,
        }
    }

    pub fn bus(mut self, config: EventBusConfig) -> Self {
        self.bus = Some(config);
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn logger(mut self, logger: LogSink) -> Self {
        self.logger = Some(logger);
        self
    }
}

/// Builds buses for an execution profile
pub struct EventBusFactory;

impl EventBusFactory {
    /// Build a bus with the profile's defaults
    pub fn create(profile: Profile) -> EventBus {
        Self::create_with(profile, FactoryOptions::default())
    }

    /// Build a bus for the profile selected by the environment
    pub fn from_env() -> EventBus {
        let profile = Profile::from_env();
        Self::create_with(profile, FactoryOptions::from_env(profile))
    }

    /// Build a bus with the profile's middleware set and explicit overrides
    pub fn create_with(profile: Profile, options: FactoryOptions) -> EventBus {
        let config = options.bus.unwrap_or_else(|| profile.bus_config());
        let retry = options.retry.unwrap_or_else(|| profile.retry_config());
        let mut builder = EventBus::builder().config(config);

        match profile {
            Profile::Development => {
                let mut logging = LoggingMiddleware::new();
                if let Some(logger) = options.logger {
                    logging = logging.with_sink(logger);
                }
                builder = builder
                    .middleware(ValidationMiddleware::new())
                    .middleware(logging)
                    .middleware(RetryMiddleware::new(retry))
                    .middleware(AnalyticsMiddleware::new());
            }
            Profile::Production => {
                builder = builder
                    .middleware(ValidationMiddleware::new())
                    .middleware(RetryMiddleware::new(retry))
                    .middleware(AnalyticsMiddleware::new());
            }
            Profile::Test => {}
        }

        let bus = builder.build();
        info!(
            profile = %profile,
            parallel = bus.config().execute_in_parallel,
            middleware = ?bus.middleware_names(),
            "Event bus created"
        );
        bus
    }
}

static SHARED: Lazy<RwLock<Option<EventBus>>> = Lazy::new(|| RwLock::new(None));

/// Process-wide bus slot
///
/// Optional convenience over explicit construction; nothing in this crate
/// requires it.
pub struct BusManager;

impl BusManager {
    /// Create a bus for `profile` and install it, replacing any existing one
    pub fn initialize(profile: Profile) -> EventBus {
        let bus = EventBusFactory::create(profile);
        Self::set_instance(bus.clone());
        bus
    }

    /// The installed bus
    pub fn get_instance() -> Result<EventBus> {
        SHARED.read().clone().ok_or(EventError::NotInitialized)
    }

    /// Install an explicitly constructed bus
    pub fn set_instance(bus: EventBus) {
        if SHARED.write().replace(bus).is_some() {
            info!("Replaced shared event bus");
        }
    }

    pub fn is_initialized() -> bool {
        SHARED.read().is_some()
    }

    /// Clear the installed bus's handlers and empty the slot
    pub fn clear() {
        if let Some(bus) = SHARED.write().take() {
            bus.clear();
            info!("Cleared shared event bus");
        }
    }
}
