//! Event line encoder and line hashing.

use crate::error::{CodecError, CodecResult};
use crate::event::Event;
use sha2::{Digest, Sha256};

/// Number of digest bytes kept when rendering a line hash.
pub const LINE_HASH_BYTES: usize = 16;

/// Encodes an event to a single JSON line without the trailing newline.
///
/// Fields are emitted in declaration order (`id`, `timestamp`, `type`,
/// `channel`, `payload`) and payload object keys in sorted order, so the
/// same event always produces the same bytes. JSON string escaping
/// guarantees the line contains no raw newline.
///
/// # Errors
///
/// Returns `EncodingFailed` if the payload cannot be serialized.
pub fn encode_event(event: &Event) -> CodecResult<Vec<u8>> {
    let line = serde_json::to_vec(event).map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    debug_assert!(!line.contains(&b'\n'));
    Ok(line)
}

/// Hashes a serialized line for segment identity checks.
///
/// Returns the first [`LINE_HASH_BYTES`] bytes of the SHA-256 digest as
/// lowercase hex.
#[must_use]
pub fn hash_line(line: &[u8]) -> String {
    let digest = Sha256::digest(line);
    hex::encode(&digest[..LINE_HASH_BYTES])
}
