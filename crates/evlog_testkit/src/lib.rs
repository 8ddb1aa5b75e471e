//! # evlog testkit
//!
//! Test utilities for evlog.
//!
//! This crate provides:
//! - Temporary event logs with automatic cleanup
//! - Property-based test generators using proptest
//! - Multi-producer stress harnesses
//! - Crash and tampering helpers for recovery tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use evlog_testkit::prelude::*;
//! use serde_json::json;
//!
//! #[test]
//! fn test_with_bus() {
//!     with_temp_bus(|bus| {
//!         bus.add("t", "c", json!(1)).unwrap();
//!         assert_eq!(bus.list("reader", 0).unwrap().len(), 1);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_test_logging;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;

/// Installs a test log subscriber once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Output goes
/// through the test writer so it is captured per test.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
