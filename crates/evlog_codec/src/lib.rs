//! # evlog Codec
//!
//! Line-oriented encoding for evlog event records.
//!
//! Each event is stored as one JSON line:
//!
//! ```text
//! {"id":"…","timestamp":"2024-07-01T12:00:00Z","type":"…","channel":"…","payload":…}
//! ```
//!
//! This crate provides:
//! - The [`Event`] record and its time-ordered [`EventId`]
//! - Deterministic line encoding and strict decoding
//! - [`hash_line`], the short content hash used for segment identity
//!
//! ## Usage
//!
//! ```
//! use evlog_codec::{decode_event, encode_event, Event};
//! use serde_json::json;
//!
//! let event = Event::new("email.received", "inbox", json!({"from": "a@b.com"}));
//! let line = encode_event(&event).unwrap();
//! let decoded = decode_event(&line).unwrap();
//! assert_eq!(event, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod event;

pub use decoder::decode_event;
pub use encoder::{encode_event, hash_line, LINE_HASH_BYTES};
pub use error::{CodecError, CodecResult};
pub use event::{Event, EventId};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn payload_strategy() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            any::<f64>()
                .prop_filter("JSON has no NaN or infinity", |f| f.is_finite())
                .prop_map(|f| json!(f)),
            ".{0,24}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    prop_compose! {
        fn event_strategy()(
            id in "[0-9a-f-]{1,36}",
            secs in 0i64..4_102_444_800,
            nanos in 0u32..1_000_000_000,
            event_type in "[a-z]{1,10}(\\.[a-z]{1,10})?",
            channel in ".{0,16}",
            payload in payload_strategy(),
        ) -> Event {
            Event {
                id: EventId::from_string(id),
                timestamp: Utc.timestamp_opt(secs, nanos).unwrap(),
                event_type,
                channel,
                payload,
            }
        }
    }

    proptest! {
        #[test]
        fn decode_reverses_encode(event in event_strategy()) {
            let line = encode_event(&event).unwrap();
            prop_assert!(!line.contains(&b'\n'));
            let decoded = decode_event(&line).unwrap();
            prop_assert_eq!(decoded, event);
        }
    }

    #[test]
    fn extreme_floats_survive_round_trip() {
        for f in [
            1.0715660391465826e-75,
            -1.81996730402717e-179,
            -1.603964615428183e143,
            -9.643915712060552e-234,
            f64::MIN_POSITIVE,
            f64::MAX,
            5e-324,
        ] {
            let event = Event::new("t", "c", json!({ "v": f }));
            let decoded = decode_event(&encode_event(&event).unwrap()).unwrap();
            assert_eq!(decoded.payload["v"].as_f64(), Some(f), "{f:e}");
            assert_eq!(decoded, event);
        }
    }

    #[test]
    fn hash_of_encoded_line_is_stable_across_encodes() {
        let event = Event::new("t", "c", json!({"b": 1, "a": [1, 2]}));
        let h1 = hash_line(&encode_event(&event).unwrap());
        let h2 = hash_line(&encode_event(&event.clone()).unwrap());
        assert_eq!(h1, h2);
    }
}
