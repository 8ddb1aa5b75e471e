//! Mapping between channel names and marker file names.
//!
//! Channel names are arbitrary strings; marker files must stay inside the
//! markers directory on every platform. Path separators, characters
//! reserved on Windows, `%`, control characters and a leading `.` are
//! percent-escaped as UTF-8 bytes. The mapping is reversible, so channel
//! names can be recovered from file names.

use std::fmt::Write;

/// Extension of marker files.
pub const MARKER_EXTENSION: &str = "json";

fn needs_escape(ch: char, first: bool) -> bool {
    matches!(ch, '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' | '%')
        || ch.is_control()
        || (first && ch == '.')
}

/// Escapes a channel name into a file stem.
///
/// `.` becomes `%2E` and `..` becomes `%2E.`, so no channel name can
/// refer to the markers directory or its parent.
#[must_use]
pub fn channel_to_stem(channel: &str) -> String {
    let mut stem = String::with_capacity(channel.len());
    for (i, ch) in channel.chars().enumerate() {
        if needs_escape(ch, i == 0) {
            let mut buf = [0u8; 4];
            for b in ch.encode_utf8(&mut buf).bytes() {
                let _ = write!(stem, "%{b:02X}");
            }
        } else {
            stem.push(ch);
        }
    }
    stem
}

/// Reverses [`channel_to_stem`]. Returns `None` for stems it could not
/// have produced.
#[must_use]
pub fn stem_to_channel(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Returns the marker file name for a channel.
#[must_use]
pub fn marker_file_name(channel: &str) -> String {
    format!("{}.{MARKER_EXTENSION}", channel_to_stem(channel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_names_are_unchanged() {
        assert_eq!(channel_to_stem("inbox"), "inbox");
        assert_eq!(channel_to_stem("reader-1_a.b"), "reader-1_a.b");
        assert_eq!(channel_to_stem("ünïcode"), "ünïcode");
    }

    #[test]
    fn dot_names_do_not_traverse() {
        assert_eq!(channel_to_stem("."), "%2E");
        assert_eq!(channel_to_stem(".."), "%2E.");
        assert_eq!(marker_file_name(".."), "%2E..json");
        assert_eq!(channel_to_stem(".hidden"), "%2Ehidden");
    }

    #[test]
    fn separators_are_escaped() {
        assert_eq!(channel_to_stem("../../etc/passwd"), "%2E.%2F..%2Fetc%2Fpasswd");
        assert_eq!(channel_to_stem("a\\b"), "a%5Cb");
        assert_eq!(channel_to_stem("a:b*c?"), "a%3Ab%2Ac%3F");
        assert_eq!(channel_to_stem("100%"), "100%25");
        assert_eq!(channel_to_stem("tab\there"), "tab%09here");
    }

    #[test]
    fn unescape_rejects_bad_sequences() {
        assert_eq!(stem_to_channel("%zz"), None);
        assert_eq!(stem_to_channel("%2"), None);
        assert_eq!(stem_to_channel("%FF"), None);
    }

    proptest! {
        #[test]
        fn stems_are_safe_and_reversible(channel in "\\PC{1,24}|[./\\\\%:]{1,8}") {
            let stem = channel_to_stem(&channel);
            prop_assert!(!stem.contains('/'));
            prop_assert!(!stem.contains('\\'));
            prop_assert!(!stem.starts_with('.'));
            prop_assert_eq!(stem_to_channel(&stem), Some(channel));
        }
    }
}
