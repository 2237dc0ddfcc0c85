//! Connections from the proxy to origin servers.
//!
//! Dialing is bounded by [`CONNECT_TIMEOUT`] and dial plus TLS handshake by
//! `CONNECT_TIMEOUT + TLS_HANDSHAKE_TIMEOUT`. Origin certificates are
//! verified against the webpki roots.

use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use hyper::Uri;
use hyper_rustls::{ConfigBuilderExt, HttpsConnector};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Builder as ClientBuilder;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::crypto::CryptoProvider;
use rustls::ClientConfig;
use tower_service::Service;

use crate::error::{ProxyError, Result};

/// Limit on establishing the TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP keep-alive interval, also the idle lifetime of pooled connections.
pub const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Limit on the TLS handshake once connected.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type BoxError = Box<dyn StdError + Send + Sync>;

/// Connector the proxy forwards through.
pub type UpstreamConnector = TimeoutConnector<HttpsConnector<HttpConnector>>;

/// Fails a connection attempt that does not finish within `timeout`.
#[derive(Debug, Clone)]
pub struct TimeoutConnector<C> {
    inner: C,
    timeout: Duration,
}

impl<C> TimeoutConnector<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<C> Service<Uri> for TimeoutConnector<C>
where
    C: Service<Uri>,
    C::Error: Into<BoxError>,
    C::Future: Send + 'static,
{
    type Response = C::Response;
    type Error = BoxError;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let timeout = self.timeout;
        let connecting = self.inner.call(uri.clone());
        Box::pin(async move {
            match tokio::time::timeout(timeout, connecting).await {
                Ok(connection) => connection.map_err(Into::into),
                Err(_) => Err(format!("connecting to {} timed out after {:?}", uri, timeout).into()),
            }
        })
    }
}

/// TLS client config for origin connections.
pub fn upstream_tls_config(provider: CryptoProvider) -> Result<ClientConfig> {
    let config = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProxyError::Proxy(e.to_string()))?
        .with_webpki_roots()
        .with_no_client_auth();
    Ok(config)
}

/// HTTP/HTTPS connector with dial, keep-alive and handshake limits.
pub fn upstream_connector(tls: ClientConfig) -> UpstreamConnector {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(CONNECT_TIMEOUT));
    http.set_keepalive(Some(KEEP_ALIVE));

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    TimeoutConnector::new(https, CONNECT_TIMEOUT + TLS_HANDSHAKE_TIMEOUT)
}

/// Client settings for forwarded requests. Header case is kept as sent.
pub fn upstream_client() -> ClientBuilder {
    let mut builder = ClientBuilder::new(TokioExecutor::new());
    builder
        .http1_title_case_headers(true)
        .http1_preserve_header_case(true)
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(KEEP_ALIVE);
    builder
}
