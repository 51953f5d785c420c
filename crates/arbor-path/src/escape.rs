//! Percent-escaping of single path segments (RFC 3986 style).
//!
//! Segment text is always stored in canonical form: decoded, then encoded
//! again with [`SEGMENT`]. Two spellings of the same name (`a` and `%61`)
//! therefore canonicalize to the same stored text.

use std::borrow::Cow;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::error::{PathError, PathResult};

/// Bytes escaped inside a segment.
///
/// `*` and `?` are included so that a literal name can never be mistaken for
/// a glob once escaped.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'*')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Escape a raw segment name.
///
/// ```
/// use arbor_path::escape::encode;
///
/// assert_eq!(encode("plain.txt"), "plain.txt");
/// assert_eq!(encode("a b/c"), "a%20b%2Fc");
/// assert_eq!(encode("*"), "%2A");
/// ```
pub fn encode(name: &str) -> Cow<'_, str> {
    utf8_percent_encode(name, SEGMENT).into()
}

/// Unescape segment text.
///
/// Fails if a `%` is not followed by two hex digits, or if the decoded bytes
/// are not UTF-8.
pub fn decode(escaped: &str) -> PathResult<Cow<'_, str>> {
    validate(escaped)?;
    percent_decode_str(escaped)
        .decode_utf8()
        .map_err(|_| PathError::parse(escaped, "escaped bytes are not valid UTF-8"))
}

/// Decode then re-encode, giving the single stored spelling of a segment.
pub fn canonicalize(escaped: &str) -> PathResult<String> {
    let name = decode(escaped)?;
    Ok(encode(&name).into_owned())
}

/// Decode text this crate produced itself.
pub(crate) fn decode_canonical(escaped: &str) -> Cow<'_, str> {
    percent_decode_str(escaped).decode_utf8_lossy()
}

fn validate(escaped: &str) -> PathResult<()> {
    let bytes = escaped.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        let hex = |at: usize| bytes.get(at).is_some_and(u8::is_ascii_hexdigit);
        if !(hex(i + 1) && hex(i + 2)) {
            return Err(PathError::parse(
                escaped,
                format!("malformed escape sequence at byte {i}"),
            ));
        }
        i += 3;
    }
    Ok(())
}
