//! V4 request/response encoding.
//!
//! A V4 message is a bencode-style list of one or two byte strings:
//!
//! ```text
//! l <len> : <json metadata> [ <len> : <raw body> ] e
//! ```
//!
//! Requests carry `{endpoint, method, headers}` metadata; responses carry
//! `{code, headers}`. The body part is raw bytes interpreted according to the
//! metadata's `content-type`.
//!
//! Decoding fails closed: any malformed envelope yields `None`.

use serde_json::Value;
use std::collections::BTreeMap;

/// Largest accepted length prefix (digits), keeps the parser bounded.
const MAX_LENGTH_DIGITS: usize = 10;

/// Response body classified by content type.
#[derive(Debug, Clone, PartialEq)]
pub enum V4Body {
    /// `application/json`
    Json(Value),
    /// `text/plain`, typically a server-side error string
    PlainText(String),
    /// Any other content type
    Binary(Vec<u8>),
    /// No body part
    Empty,
}

/// A decoded V4 response.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedV4 {
    /// Status code from the metadata
    pub code: u16,
    /// Response headers, keys lowercased
    pub headers: BTreeMap<String, String>,
    /// Classified body
    pub body: V4Body,
}

/// Encode metadata and an optional body.
#[must_use]
pub fn encode_v4(metadata: &Value, body: Option<&[u8]>) -> Vec<u8> {
    let meta = metadata.to_string();
    let mut out = Vec::with_capacity(meta.len() + body.map_or(0, <[u8]>::len) + 24);
    out.push(b'l');
    push_part(&mut out, meta.as_bytes());
    if let Some(body) = body {
        push_part(&mut out, body);
    }
    out.push(b'e');
    out
}

fn push_part(out: &mut Vec<u8>, part: &[u8]) {
    out.extend_from_slice(part.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(part);
}

/// Read one `<len>:<bytes>` part at `pos`, returning the part and the next position.
fn read_part(bytes: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let rest = bytes.get(pos..)?;
    let colon = rest.iter().take(MAX_LENGTH_DIGITS + 1).position(|&b| b == b':')?;
    if colon == 0 {
        return None;
    }
    let digits = &rest[..colon];
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let len: usize = std::str::from_utf8(digits).ok()?.parse().ok()?;
    let start = pos.checked_add(colon + 1)?;
    let end = start.checked_add(len)?;
    Some((bytes.get(start..end)?, end))
}

/// Split a V4 message into its metadata and optional body parts.
#[must_use]
pub fn decode_v4_parts(bytes: &[u8]) -> Option<(&[u8], Option<&[u8]>)> {
    if bytes.len() < 2 || bytes[0] != b'l' || bytes[bytes.len() - 1] != b'e' {
        return None;
    }
    let last = bytes.len() - 1;
    let (meta, next) = read_part(bytes, 1)?;
    if next == last {
        return Some((meta, None));
    }
    let (body, next) = read_part(bytes, next)?;
    (next == last).then_some((meta, Some(body)))
}

/// Decode a V4 response: parse metadata and classify the body.
#[must_use]
pub fn decode_v4(bytes: &[u8]) -> Option<DecodedV4> {
    let (meta, body) = decode_v4_parts(bytes)?;
    let metadata: Value = serde_json::from_slice(meta).ok()?;
    let code = u16::try_from(metadata.get("code")?.as_u64()?).ok()?;
    let headers = headers_from(&metadata);

    let body = match body {
        None => V4Body::Empty,
        Some(raw) => {
            let content_type = headers.get("content-type").map(String::as_str).unwrap_or_default();
            if content_type.starts_with("application/json") {
                V4Body::Json(serde_json::from_slice(raw).ok()?)
            } else if content_type.starts_with("text/plain") {
                V4Body::PlainText(String::from_utf8_lossy(raw).into_owned())
            } else {
                V4Body::Binary(raw.to_vec())
            }
        }
    };
    Some(DecodedV4 { code, headers, body })
}

/// Lowercased string headers from a metadata object.
fn headers_from(metadata: &Value) -> BTreeMap<String, String> {
    metadata
        .get("headers")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.to_ascii_lowercase(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
