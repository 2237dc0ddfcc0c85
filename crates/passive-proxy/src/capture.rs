//! Request capture: filter, record, deduplicate, emit.

use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hudsucker::hyper::header::{CONTENT_LENGTH, HOST};
use hudsucker::hyper::{Method, Request};
use hudsucker::Body;

use passive_core::{
    is_capturable_length, is_captured_method, CapturedRequest, DedupGate, RunSettings,
};

use crate::intercept::RequestInterceptor;
use crate::sink::ResultSink;

/// Records every unique GET/POST request passing through the proxy.
///
/// The request is always forwarded; capture only observes it. A POST body
/// that gets read is put back in place before forwarding.
#[derive(Debug)]
pub struct CaptureInterceptor {
    settings: Arc<RunSettings>,
    gate: Arc<DedupGate>,
    sink: Arc<ResultSink>,
}

impl CaptureInterceptor {
    /// Creates an interceptor admitting through `gate` into `sink`.
    pub fn new(settings: Arc<RunSettings>, gate: Arc<DedupGate>, sink: Arc<ResultSink>) -> Self {
        Self {
            settings,
            gate,
            sink,
        }
    }

    fn host_allowed(&self, request: &Request<Body>) -> bool {
        if self.settings.hosts.is_empty() {
            return true;
        }
        match request_authority(request) {
            Some(authority) => {
                let host = authority
                    .rsplit_once(':')
                    .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
                    .map(|(host, _)| host)
                    .unwrap_or(&authority);
                self.settings.host_allowed(host) || self.settings.host_allowed(&authority)
            }
            None => false,
        }
    }

    /// Builds the record for `request`, reading its body when eligible.
    async fn record(&self, request: Request<Body>) -> (Request<Body>, CapturedRequest) {
        let mut record = CapturedRequest::new(
            &self.settings.id,
            request.method().as_str(),
            request.uri().to_string(),
        );
        for (name, value) in request.headers() {
            record.push_header(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
        }

        let wants_body = request.method() == Method::POST
            && is_capturable_length(content_length(&request))
            && record.header("Content-Type").is_some();
        if !wants_body {
            return (request, record);
        }

        let (parts, body) = request.into_parts();
        match body.collect().await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                record.post_data = String::from_utf8_lossy(&bytes).into_owned();
                (Request::from_parts(parts, Body::from(Full::new(bytes))), record)
            }
            Err(e) => {
                tracing::warn!("Failed to read request body: {}", e);
                (Request::from_parts(parts, Body::empty()), record)
            }
        }
    }
}

#[async_trait::async_trait]
impl RequestInterceptor for CaptureInterceptor {
    async fn intercept_request(&self, request: Request<Body>) -> Request<Body> {
        if !is_captured_method(request.method().as_str()) {
            return request;
        }
        if !self.host_allowed(&request) {
            tracing::trace!("Host not in allow-list: {}", request.uri());
            return request;
        }
        if self.settings.is_ignored(&request.uri().to_string()) {
            tracing::trace!("Ignored by keyword: {}", request.uri());
            return request;
        }

        let (request, record) = self.record(request).await;

        let digest = record.dedup_digest();
        if !self.gate.try_admit(&digest) {
            tracing::trace!("Duplicate request shape: {}", record.link);
            return request;
        }

        tracing::debug!("Captured {} {}", record.method, record.link);
        if let Err(e) = self.sink.emit_record(record.admitted(digest)).await {
            tracing::error!("Failed to emit record: {}", e);
        }

        request
    }
}

/// Host and optional port from the request URI, or from the `Host` header.
fn request_authority(request: &Request<Body>) -> Option<String> {
    if let Some(authority) = request.uri().authority() {
        return Some(authority.as_str().to_string());
    }
    request
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
}

fn content_length(request: &Request<Body>) -> Option<u64> {
    request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
