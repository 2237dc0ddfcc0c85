//! Passive Proxy - intercepting proxy that records unique requests.
//!
//! This crate runs the HTTP(S) proxy of a passive scan. Every GET/POST
//! exchange is observed, reduced to a fingerprint, deduplicated and, when
//! new, emitted as a [`passive_core::CapturedRequest`].
//!
//! ## Features
//!
//! - Generates and loads the RSA-4096 root CA (PEM, PKCS#1 key)
//! - Issues and caches per-host leaf certificates for CONNECT tunnels
//! - Host allow-list and URL keyword filtering
//! - Forwards records to a remote collector, or prints them
//! - Replaces responses with an expiry banner in the last minute of a run
//!
//! ## Architecture
//!
//! ```text
//! Client → ProxyEngine (hudsucker) → ProxyHandler
//!                                         │
//!                  ┌──────────────────────┴──────────────────────┐
//!                  │ request                                     │ response
//!                  ▼                                             ▼
//!          CaptureInterceptor                              ExpiryBanner
//!     filter → fingerprint → DedupGate                  final minute?
//!                  │ admitted                                    │ yes
//!                  ▼                                             ▼
//!     ResultSink (collector POST | stdout)               expiry page
//! ```

mod authority;
mod ca;
mod capture;
mod collector;
mod error;
mod expiry;
mod handler;
mod intercept;
mod proxy;
mod sink;
mod upstream;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use authority::LeafAuthority;
pub use ca::{generate_root, CaError, CertificateAuthority, IssuedLeaf, PemPair};
pub use capture::CaptureInterceptor;
pub use collector::{CollectorClient, POST_TIMEOUT};
pub use error::{ProxyError, Result};
pub use expiry::{ExpiryBanner, EXPIRY_PAGE_HTML};
pub use handler::ProxyHandler;
pub use intercept::{InterceptorChain, RequestInterceptor, ResponseInterceptor};
pub use proxy::{EngineState, ProxyEngine, SHUTDOWN_GRACE};
pub use sink::ResultSink;
pub use upstream::{
    upstream_client, upstream_connector, upstream_tls_config, TimeoutConnector,
    UpstreamConnector, CONNECT_TIMEOUT, KEEP_ALIVE, TLS_HANDSHAKE_TIMEOUT,
};
