//! Bus configuration
//!
//! Values can be set in code through [`EventBusConfig`] / the bus builder or
//! read from the environment:
//!
//! - `AGORA_EVENTS_MAX_HANDLERS` - per-event-type handler limit
//! - `AGORA_EVENTS_PARALLEL=1|0` - run handlers concurrently
//! - `AGORA_EVENTS_HANDLER_TIMEOUT_MS` - per-handler time box
//! - `AGORA_EVENTS_CATCH_ERRORS=1|0` - collect handler errors into the result
//! - `AGORA_EVENTS_STOP_ON_FIRST_FAILURE=1|0` - sequential mode only
//!
//! Missing or unparsable variables fall back to the defaults.

use crate::registry::DEFAULT_MAX_HANDLERS_PER_EVENT;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default per-handler timeout
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_millis(5000);

/// Event bus configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EventBusConfig {
    /// Maximum handlers per event type
    pub max_handlers_per_event: usize,

    /// Run handlers concurrently instead of in subscription order
    pub execute_in_parallel: bool,

    /// Time box for each handler invocation
    pub handler_timeout: Duration,

    /// Collect handler failures into the result instead of returning them
    pub catch_handler_errors: bool,

    /// Sequential mode: skip remaining handlers after a failure
    pub stop_on_first_failure: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_handlers_per_event: DEFAULT_MAX_HANDLERS_PER_EVENT,
            execute_in_parallel: true,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            catch_handler_errors: true,
            stop_on_first_failure: false,
        }
    }
}

impl EventBusConfig {
    /// Create config from environment variables, starting from defaults
    pub fn from_env() -> Self {
        Self::default().merge_env()
    }

    /// Override fields with any `AGORA_EVENTS_*` variables that are set
    pub fn merge_env(mut self) -> Self {
        if let Some(max) = env_parse("AGORA_EVENTS_MAX_HANDLERS") {
            self.max_handlers_per_event = max;
        }
        if let Some(parallel) = env_flag("AGORA_EVENTS_PARALLEL") {
            self.execute_in_parallel = parallel;
        }
        if let Some(ms) = env_parse::<u64>("AGORA_EVENTS_HANDLER_TIMEOUT_MS") {
            self.handler_timeout = Duration::from_millis(ms);
        }
        if let Some(catch) = env_flag("AGORA_EVENTS_CATCH_ERRORS") {
            self.catch_handler_errors = catch;
        }
        if let Some(stop) = env_flag("AGORA_EVENTS_STOP_ON_FIRST_FAILURE") {
            self.stop_on_first_failure = stop;
        }
        self
    }
}

/// Read and parse an environment variable
pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Read a boolean flag (`1`/`true`/`yes` or `0`/`false`/`no`)
pub(crate) fn env_flag(key: &str) -> Option<bool> {
    parse_flag(&env::var(key).ok()?)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
