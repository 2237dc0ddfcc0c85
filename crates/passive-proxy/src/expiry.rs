//! Expiry banner served in the last minute of a run.

use std::time::{Duration, Instant};

use http_body_util::Full;
use hudsucker::hyper::body::Bytes;
use hudsucker::hyper::header::{
    HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING,
};
use hudsucker::hyper::{Response, StatusCode};
use hudsucker::Body;

use crate::intercept::ResponseInterceptor;

/// Page replacing every upstream response once the run is about to expire.
pub const EXPIRY_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Passive scan expiring</title>
</head>
<body>
    <h1>Passive scan service expiring</h1>
    <p>This passive scanning session is about to reach its maximum running time.</p>
    <p>The proxy will stop shortly. Please start a new task to continue scanning.</p>
</body>
</html>"#;

const EXPIRY_CONTENT_TYPE: &str = "text/html;charset=UTF-8";

/// Replaces responses with [`EXPIRY_PAGE_HTML`] during the final minute.
///
/// The banner is due once the whole minutes elapsed since start reach
/// `max_run_time - 1`. A `max_run_time` of zero disables it.
#[derive(Debug, Clone)]
pub struct ExpiryBanner {
    max_run_time: u64,
    started_at: Instant,
}

impl ExpiryBanner {
    /// Creates a banner for a run of `max_run_time` minutes started at
    /// `started_at`.
    pub fn new(max_run_time: u64, started_at: Instant) -> Self {
        Self {
            max_run_time,
            started_at,
        }
    }

    /// Whether the banner is due after `elapsed` run time.
    pub fn is_due_after(&self, elapsed: Duration) -> bool {
        self.max_run_time >= 1 && elapsed.as_secs() / 60 >= self.max_run_time - 1
    }

    /// Whether the banner is due now.
    pub fn is_due(&self) -> bool {
        self.is_due_after(self.started_at.elapsed())
    }

    /// Rewrites `response` into the expiry page. The upstream body is dropped.
    pub fn banner_response(response: Response<Body>) -> Response<Body> {
        let (mut parts, _upstream) = response.into_parts();

        parts.status = StatusCode::OK;
        parts.headers.remove(TRANSFER_ENCODING);
        parts
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(EXPIRY_CONTENT_TYPE));
        parts
            .headers
            .insert(CONTENT_ENCODING, HeaderValue::from_static("identity"));
        parts
            .headers
            .insert(CONTENT_LENGTH, HeaderValue::from(EXPIRY_PAGE_HTML.len()));

        Response::from_parts(
            parts,
            Body::from(Full::new(Bytes::from_static(EXPIRY_PAGE_HTML.as_bytes()))),
        )
    }
}

#[async_trait::async_trait]
impl ResponseInterceptor for ExpiryBanner {
    async fn intercept_response(&self, response: Response<Body>) -> Response<Body> {
        if !self.is_due() {
            return response;
        }
        tracing::debug!("Run expiring, serving banner instead of upstream response");
        Self::banner_response(response)
    }
}
