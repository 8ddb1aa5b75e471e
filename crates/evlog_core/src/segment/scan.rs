//! Line scanning over a segment's decompressed stream.

use crate::segment::meta::SegmentMeta;
use crate::types::{Entry, Position};
use evlog_codec::{decode_event, hash_line};
use tracing::warn;

/// Splits `data` into lines, yielding each line (without its newline)
/// together with the offset just past it.
fn lines_from(data: &[u8], from: u64) -> impl Iterator<Item = (&[u8], u64)> {
    let start = usize::try_from(from).unwrap_or(usize::MAX).min(data.len());
    let mut offset = from;
    data[start..]
        .split_inclusive(|&b| b == b'\n')
        .map(move |chunk| {
            offset += chunk.len() as u64;
            let line = chunk.strip_suffix(b"\n").unwrap_or(chunk);
            (line, offset)
        })
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// Decodes every event after `from` in a decompressed segment stream.
///
/// Blank lines are skipped. Lines that fail to decode are logged and
/// skipped; their bytes still advance the offset so later entries keep
/// exact positions. An offset at or past the end yields nothing.
pub fn scan_entries(segment: &str, data: &[u8], from: u64) -> Vec<Entry> {
    let mut entries = Vec::new();

    for (line, offset) in lines_from(data, from) {
        if is_blank(line) {
            continue;
        }
        match decode_event(line) {
            Ok(event) => entries.push(Entry {
                event,
                position: Position::new(segment, offset),
            }),
            Err(e) => {
                warn!(segment, offset, error = %e, "skipping malformed record");
            }
        }
    }

    entries
}

/// Recomputes sidecar metadata from a decompressed stream.
///
/// Returns the metadata (without a compressed size) and the number of
/// lines that failed to decode. Every non-blank line counts toward
/// `line_count`, matching what appends recorded.
pub fn summarize(data: &[u8]) -> (SegmentMeta, u64) {
    let mut meta = SegmentMeta {
        uncompressed_size: data.len() as u64,
        ..SegmentMeta::default()
    };
    let mut malformed = 0;

    for (line, _) in lines_from(data, 0) {
        if is_blank(line) {
            continue;
        }
        if meta.line_count == 0 {
            meta.first_line_hash = hash_line(line);
        }
        meta.line_count += 1;
        if decode_event(line).is_err() {
            malformed += 1;
        }
    }

    (meta, malformed)
}

/// Returns the hash of the first non-blank line, or an empty string.
pub fn first_line_hash(data: &[u8]) -> String {
    lines_from(data, 0)
        .map(|(line, _)| line)
        .find(|line| !is_blank(line))
        .map(hash_line)
        .unwrap_or_default()
}
