//! Event line decoder.

use crate::error::{CodecError, CodecResult};
use crate::event::Event;

/// Decodes one line (without its trailing newline) into an event.
///
/// # Errors
///
/// Returns `MalformedRecord` if the line is not valid JSON, lacks a
/// required field, carries a non RFC 3339 timestamp, or has an empty
/// `id` or `type`.
pub fn decode_event(line: &[u8]) -> CodecResult<Event> {
    let event: Event =
        serde_json::from_slice(line).map_err(|e| CodecError::malformed(e.to_string()))?;

    if event.id.is_empty() {
        return Err(CodecError::malformed("empty event id"));
    }
    if event.event_type.is_empty() {
        return Err(CodecError::malformed("empty event type"));
    }

    Ok(event)
}
