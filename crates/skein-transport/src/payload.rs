//! Final-destination payloads.
//!
//! Whatever reaches the destination is a V4 request: `{endpoint, method,
//! headers}` metadata plus an optional body. File uploads are embedded as
//! base64 under `fileUpload` and their headers merged into the request's.

use crate::v4::encode_v4;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Storage RPC endpoint on a storage node.
pub const STORAGE_RPC_ENDPOINT: &str = "/storage_rpc/v1";

/// Request body as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// No body
    Empty,
    /// Pre-serialized text
    Text(String),
    /// JSON, serialized on the way out
    Json(Value),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// A file upload with its own headers
    File {
        /// File contents
        data: Vec<u8>,
        /// Headers describing the file
        headers: BTreeMap<String, String>,
    },
}

/// A normalized destination request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpPayload {
    /// HTTP method
    pub method: String,
    /// Endpoint path, with query string
    pub endpoint: String,
    /// Request headers
    pub headers: BTreeMap<String, String>,
    /// Body bytes, if any
    pub body: Option<Vec<u8>>,
}

/// Normalize a request for the final destination.
#[must_use]
pub fn build_final_payload(
    endpoint: &str,
    method: &str,
    mut headers: BTreeMap<String, String>,
    body: RequestBody,
) -> HttpPayload {
    let body = match body {
        RequestBody::Empty => None,
        RequestBody::Text(text) => Some(text.into_bytes()),
        RequestBody::Json(value) => Some(value.to_string().into_bytes()),
        RequestBody::Bytes(bytes) => Some(bytes),
        RequestBody::File {
            data,
            headers: file_headers,
        } => {
            headers.extend(file_headers);
            Some(json!({ "fileUpload": STANDARD.encode(data) }).to_string().into_bytes())
        }
    };
    HttpPayload {
        method: method.to_string(),
        endpoint: endpoint.to_string(),
        headers,
        body,
    }
}

impl HttpPayload {
    /// Payload carrying a storage RPC (`{method, params}` JSON) to a node.
    #[must_use]
    pub fn storage_rpc(rpc: &Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        build_final_payload(STORAGE_RPC_ENDPOINT, "POST", headers, RequestBody::Json(rpc.clone()))
    }

    /// V4-encode for the destination.
    #[must_use]
    pub fn to_v4(&self) -> Vec<u8> {
        let metadata = json!({
            "endpoint": self.endpoint,
            "method": self.method,
            "headers": self.headers,
        });
        encode_v4(&metadata, self.body.as_deref())
    }
}
