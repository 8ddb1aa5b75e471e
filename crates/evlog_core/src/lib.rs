//! # evlog core
//!
//! A durable, append-only event log shared by cooperating processes on
//! one machine.
//!
//! This crate provides:
//! - Compressed, size-rotated segment files with JSON sidecar metadata
//! - Per-channel consumption markers validated by first-line hashes
//! - An advisory file lock serializing writers across processes
//! - The [`EventBus`] façade tying them together
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use evlog_core::{Config, EventBus};
//! use serde_json::json;
//! use std::path::Path;
//!
//! # fn main() -> evlog_core::CoreResult<()> {
//! let bus = EventBus::open(Path::new("/tmp/events"), Config::default())?;
//! bus.add("email.received", "inbox", json!({"from": "a@b.com"}))?;
//!
//! for entry in bus.list("archiver", 0)? {
//!     println!("{} {}", entry.position, entry.event.event_type);
//!     bus.mark("archiver", &entry.position)?;
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bus;
mod config;
mod dir;
mod error;
mod lock;
mod marker;
mod segment;
mod types;

pub use bus::EventBus;
pub use config::{Config, DEFAULT_MAX_SEGMENT_SIZE, DEFAULT_ROTATION_HEADROOM};
pub use dir::LogDir;
pub use error::{CoreError, CoreResult, NotFoundKind};
pub use lock::{LockGuard, LockMode, ProcessMutex};
pub use marker::{channel_to_stem, marker_file_name, stem_to_channel, Marker, MarkerStore};
pub use segment::{FileStatus, SegmentMeta, SegmentName, SegmentReport, SegmentStore};
pub use types::{Entry, Position};

pub use evlog_codec::{Event, EventId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
