//! Character encoding detection
//!
//! Order of precedence: the `charset` parameter of the Content-Type header,
//! then a `<meta charset>` (or `http-equiv` content) declaration near the start
//! of the document, then UTF-8. A byte order mark overrides all of them.

use encoding_rs::{Encoding, UTF_8};

/// How far into the body a `<meta charset>` declaration is looked for
const SNIFF_LIMIT: usize = 1024;

/// Picks the encoding for a response body
pub fn detect_encoding(body: &[u8], content_type: Option<&str>) -> &'static Encoding {
    content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| sniff_meta_charset(body))
        .unwrap_or(UTF_8)
}

/// Decodes a response body to text, replacing malformed sequences
pub fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    let encoding = detect_encoding(body, content_type);
    let (text, actual, had_errors) = encoding.decode(body);
    if had_errors {
        tracing::debug!("Malformed {} sequences replaced while decoding", actual.name());
    }
    text.into_owned()
}

fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            (!value.is_empty()).then_some(value)
        } else {
            None
        }
    })
}

fn sniff_meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(SNIFF_LIMIT)];
    let head = head.to_ascii_lowercase();

    let mut search_from = 0;
    while let Some(offset) = find(&head[search_from..], b"charset") {
        let mut pos = search_from + offset + b"charset".len();
        search_from = pos;

        pos = skip_spaces(&head, pos);
        if head.get(pos) != Some(&b'=') {
            continue;
        }
        pos = skip_spaces(&head, pos + 1);
        if matches!(head.get(pos), Some(b'"') | Some(b'\'')) {
            pos += 1;
        }

        let end = head[pos..]
            .iter()
            .position(|b| !(b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')))
            .map_or(head.len(), |n| pos + n);

        if let Some(encoding) = Encoding::for_label(&head[pos..end]) {
            return Some(encoding);
        }
    }

    None
}

fn skip_spaces(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(|b| b.is_ascii_whitespace()) {
        pos += 1;
    }
    pos
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
