//! Fuzz target for event JSON decoding.
//!
//! Any input either fails with an error or yields an event that survives
//! a second encode/decode unchanged.

#![no_main]

use agora_events::DomainEvent;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(event) = DomainEvent::from_json(input) {
        let encoded = event.to_json().expect("decoded event must encode");
        let decoded = DomainEvent::from_json(&encoded).expect("encoded event must decode");
        assert_eq!(decoded, event);
    }
});
