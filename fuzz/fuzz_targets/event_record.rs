//! Fuzz target for structured event records.
//!
//! Builds records with arbitrary envelope fields and payload objects so the
//! validation paths are reached more often than with raw JSON.

#![no_main]

use agora_events::{DomainEvent, EventRecord, EventType};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value};

/// Arbitrary record fields for fuzzing.
#[derive(Debug, Arbitrary)]
struct FuzzRecord {
    event_id: String,
    type_index: u8,
    occurred_at: String,
    user_id: Option<String>,
    correlation_id: Option<String>,
    causation_id: Option<String>,
    version: u32,
    /// Payload entries with string values
    fields: Vec<(String, String)>,
    /// Payload entries with array values
    lists: Vec<(String, Vec<String>)>,
}

fuzz_target!(|data: FuzzRecord| {
    let event_type = EventType::ALL[data.type_index as usize % EventType::ALL.len()];

    let mut payload = Map::new();
    for (key, value) in data.fields {
        payload.insert(key, Value::String(value));
    }
    for (key, values) in data.lists {
        payload.insert(key, Value::from(values));
    }

    let record = EventRecord {
        event_id: data.event_id,
        event_type: event_type.as_str().to_string(),
        occurred_at: data.occurred_at,
        user_id: data.user_id,
        correlation_id: data.correlation_id,
        causation_id: data.causation_id,
        version: data.version,
        data: Value::Object(payload),
    };

    if let Ok(event) = DomainEvent::from_record(record) {
        assert_eq!(event.event_type(), event_type);
        assert!(event.validate().is_ok());
    }
});
