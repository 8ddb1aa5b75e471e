//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random events, channel names and
//! JSON payloads.

use evlog_core::Event;
use proptest::prelude::*;
use serde_json::{Map, Number, Value};

/// Strategy for generating dotted event types such as `email.received`.
pub fn event_type_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}(\\.[a-z][a-z0-9_]{0,15}){0,2}")
        .expect("Invalid regex")
}

/// Strategy for generating plain channel names.
pub fn channel_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_-]{0,31}").expect("Invalid regex")
}

/// Strategy for generating hostile channel names: path separators, dots,
/// reserved characters and unicode.
pub fn hostile_channel_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(".".to_string()),
        Just("..".to_string()),
        Just("../escape".to_string()),
        Just("a/b\\c".to_string()),
        Just("100%".to_string()),
        "[ -~]{1,24}",
        "\\PC{1,12}",
    ]
}

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        any::<f64>()
            .prop_filter_map("JSON has no NaN or infinity", Number::from_f64)
            .prop_map(Value::Number),
        "\\PC{0,24}".prop_map(Value::String),
    ]
}

/// Strategy for generating arbitrary JSON payloads up to a few levels deep.
///
/// Floats are finite; JSON cannot carry NaN or infinity.
pub fn payload_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,10}", inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Strategy for generating events with fresh ids.
pub fn event_strategy() -> impl Strategy<Value = Event> {
    (
        event_type_strategy(),
        channel_name_strategy(),
        payload_strategy(),
    )
        .prop_map(|(event_type, channel, payload)| Event::new(event_type, channel, payload))
}

/// One step of a producer/consumer workload.
#[derive(Debug, Clone)]
pub enum BusOperation {
    /// Add an event.
    Add {
        /// Event type.
        event_type: String,
        /// Producer channel.
        channel: String,
        /// Payload.
        payload: Value,
    },
    /// List pending events for a consumer and mark the last one.
    Consume {
        /// Consumer channel.
        channel: String,
        /// Maximum entries to take; 0 takes everything.
        limit: usize,
    },
}

/// Strategy for generating bus operations over a small set of consumers.
pub fn bus_operation_strategy() -> impl Strategy<Value = BusOperation> {
    prop_oneof![
        3 => (event_type_strategy(), channel_name_strategy(), payload_strategy())
            .prop_map(|(event_type, channel, payload)| BusOperation::Add {
                event_type,
                channel,
                payload,
            }),
        1 => (prop::sample::select(vec!["alpha", "beta", "gamma"]), 0usize..4)
            .prop_map(|(channel, limit)| BusOperation::Consume {
                channel: channel.to_string(),
                limit,
            }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<BusOperation>> {
    prop::collection::vec(bus_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
