//! Segment storage for events.
//!
//! A segment is one zstd-compressed JSON-lines file. Every append writes
//! a single independent zstd frame, so appending never recompresses
//! earlier records and the concatenated frames decode as one stream.
//! Segment files therefore end in `.jsonl.zst` rather than the
//! `.jsonl.gz` of gzip-based logs: zstd frames concatenate the way gzip
//! members do, which is the only property appends rely on.
//!
//! Exactly one segment is *latest* (open for append). When an append
//! would grow it past the size budget, the next segment is created and
//! becomes latest; the previous one is sealed and never written again.
//!
//! ## Sidecar Format
//!
//! ```text
//! {"uncompressed_size":1234,"line_count":9,"first_line_hash":"…","compressed_size":512}
//! ```

mod meta;
mod name;
mod scan;
mod store;

pub use meta::{FileStatus, SegmentMeta, SegmentReport};
pub use name::SegmentName;
pub use store::SegmentStore;

pub(crate) use store::parse_name;
