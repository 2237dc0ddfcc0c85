//! Captured request records and the JSON envelopes sent to remote endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fingerprint;

/// Largest POST body captured, in bytes (1 MiB).
pub const MAX_CAPTURED_BODY: u64 = 1024 * 1024;

/// Tag stamped on every admitted record.
pub const ADMITTED_TAG: i32 = 1;

/// Returns true for the methods the scanner records (GET and POST).
pub fn is_captured_method(method: &str) -> bool {
    method == "GET" || method == "POST"
}

/// Returns true when a declared Content-Length is small enough to capture.
pub fn is_capturable_length(content_length: Option<u64>) -> bool {
    matches!(content_length, Some(len) if len > 0 && len <= MAX_CAPTURED_BODY)
}

/// Canonical MIME header casing: `content-type` becomes `Content-Type`.
pub fn canonical_header_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        upper = c == '-';
    }
    out
}

/// One unique request observed by the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    /// Identifier of the owning run.
    pub id: String,
    /// HTTP method (GET or POST).
    pub method: String,
    /// Full request URL.
    pub link: String,
    /// Flattened headers: every value followed by a single space.
    pub headers: BTreeMap<String, String>,
    /// Raw POST body, empty when not captured.
    pub post_data: String,
    /// Reserved tag, always [`ADMITTED_TAG`].
    pub tag: i32,
    /// Dedup digest of the request fingerprint.
    pub hash: String,
}

impl CapturedRequest {
    /// Creates a record with no headers, no body and no hash yet.
    pub fn new(id: impl Into<String>, method: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            link: link.into(),
            headers: BTreeMap::new(),
            post_data: String::new(),
            tag: ADMITTED_TAG,
            hash: String::new(),
        }
    }

    /// Appends a header value. Repeated names accumulate, space separated.
    pub fn push_header(&mut self, name: &str, value: &str) {
        let entry = self
            .headers
            .entry(canonical_header_name(name))
            .or_default();
        entry.push_str(value);
        entry.push(' ');
    }

    /// Builder form of [`push_header`](Self::push_header).
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.push_header(name, value);
        self
    }

    /// Sets the raw POST body.
    pub fn with_post_data(mut self, body: impl Into<String>) -> Self {
        self.post_data = body.into();
        self
    }

    /// Looks up a flattened header value ignoring name case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Fingerprint of this request. See [`fingerprint::canonicalize`].
    pub fn fingerprint(&self, ignore_case: bool) -> String {
        fingerprint::canonicalize(
            &self.method,
            &self.link,
            self.header("Content-Type"),
            &self.post_data,
            ignore_case,
        )
    }

    /// MD5 hex digest of the case-insensitive fingerprint.
    pub fn dedup_digest(&self) -> String {
        fingerprint::digest(&self.fingerprint(true))
    }

    /// Stamps the dedup digest on an admitted record.
    pub fn admitted(mut self, digest: impl Into<String>) -> Self {
        self.hash = digest.into();
        self.tag = ADMITTED_TAG;
        self
    }

    /// Serializes the record as compact JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Envelope POSTed to the remote collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOutput {
    pub id: String,
    pub result: Vec<CapturedRequest>,
}

impl RemoteOutput {
    /// Wraps a single record.
    pub fn single(id: impl Into<String>, record: CapturedRequest) -> Self {
        Self {
            id: id.into(),
            result: vec![record],
        }
    }

    /// Serializes the envelope as compact JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Notice POSTed to the message address when a run times out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionNotice {
    pub id: String,
    pub code: i32,
    pub message: String,
}

impl CompletionNotice {
    /// The notice sent when the maximum run time elapses.
    pub fn timeout(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: 0,
            message: "running timeout".to_string(),
        }
    }

    /// Serializes the notice as compact JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
