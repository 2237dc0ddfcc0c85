//! Intercepting proxy engine.
//!
//! Owns the listener and the hudsucker server task. The lifecycle is
//! `Stopped → Starting → Running → Stopping → Stopped`; a failed start falls
//! back to `Stopped`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hudsucker::rustls::crypto::aws_lc_rs::default_provider;
use hudsucker::tokio_tungstenite::Connector;
use hudsucker::Proxy;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use passive_core::{DedupGate, RunSettings};

use crate::authority::LeafAuthority;
use crate::ca::CertificateAuthority;
use crate::capture::CaptureInterceptor;
use crate::collector::POST_TIMEOUT;
use crate::error::{ProxyError, Result};
use crate::expiry::ExpiryBanner;
use crate::handler::ProxyHandler;
use crate::intercept::InterceptorChain;
use crate::sink::ResultSink;
use crate::upstream::{upstream_client, upstream_connector, upstream_tls_config};

/// How long `close` waits for in-flight exchanges before aborting. Covers
/// a collector POST started just before shutdown.
pub const SHUTDOWN_GRACE: Duration = POST_TIMEOUT.saturating_add(Duration::from_secs(5));

/// Lifecycle state of a [`ProxyEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// A running hudsucker server.
struct RunningProxy {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
    addr: SocketAddr,
}

/// The intercepting proxy of one run.
pub struct ProxyEngine {
    settings: Arc<RunSettings>,
    gate: Arc<DedupGate>,
    sink: Arc<ResultSink>,
    state: Mutex<EngineState>,
    running: Mutex<Option<RunningProxy>>,
}

impl std::fmt::Debug for ProxyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyEngine")
            .field("id", &self.settings.id)
            .field("state", &self.state())
            .field("addr", &self.local_addr())
            .finish()
    }
}

impl ProxyEngine {
    /// Creates a stopped engine emitting into `sink`.
    pub fn new(settings: RunSettings, sink: Arc<ResultSink>) -> Self {
        Self {
            settings: Arc::new(settings),
            gate: Arc::new(DedupGate::new()),
            sink,
            state: Mutex::new(EngineState::Stopped),
            running: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Address the listener is bound to while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.addr)
    }

    /// The run settings.
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// The sink receiving admitted records.
    pub fn sink(&self) -> &Arc<ResultSink> {
        &self.sink
    }

    /// Loads the CA (when HTTPS capture is on), binds the listener and
    /// starts serving. Returns the bound address.
    ///
    /// Bind and CA failures are returned as-is; nothing is retried.
    pub async fn start(&self) -> Result<SocketAddr> {
        {
            let mut state = self.state.lock();
            if *state != EngineState::Stopped {
                return Err(ProxyError::Proxy(format!(
                    "cannot start engine while {:?}",
                    *state
                )));
            }
            *state = EngineState::Starting;
        }

        match self.launch().await {
            Ok(addr) => {
                *self.state.lock() = EngineState::Running;
                Ok(addr)
            }
            Err(e) => {
                tracing::error!("Failed to start proxy: {}", e);
                *self.state.lock() = EngineState::Stopped;
                Err(e)
            }
        }
    }

    async fn launch(&self) -> Result<SocketAddr> {
        let authority = self.leaf_authority().await?;

        let addr = self.settings.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProxyError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let chain = InterceptorChain::new()
            .with_request(Arc::new(CaptureInterceptor::new(
                self.settings.clone(),
                self.gate.clone(),
                self.sink.clone(),
            )))
            .with_response(Arc::new(ExpiryBanner::new(
                self.settings.max_run_time,
                Instant::now(),
            )));
        let handler = ProxyHandler::new(chain, self.settings.contain_https);

        let tls = upstream_tls_config(default_provider())?;
        let websocket_tls = Connector::Rustls(Arc::new(tls.clone()));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let proxy = Proxy::builder()
            .with_listener(listener)
            .with_ca(authority)
            .with_http_connector(upstream_connector(tls))
            .with_client(upstream_client())
            .with_websocket_connector(websocket_tls)
            .with_http_handler(handler)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .build()
            .map_err(|e| ProxyError::Proxy(e.to_string()))?;

        let task = tokio::spawn(async move {
            if let Err(e) = proxy.start().await {
                tracing::error!("Proxy error: {}", e);
            }
            tracing::info!("Proxy server stopped");
        });

        *self.running.lock() = Some(RunningProxy {
            shutdown_tx,
            task,
            addr: local_addr,
        });

        tracing::info!(
            "Passive proxy listening on {} (https capture: {})",
            local_addr,
            self.settings.contain_https
        );
        Ok(local_addr)
    }

    async fn leaf_authority(&self) -> Result<LeafAuthority> {
        if !self.settings.contain_https {
            return Ok(LeafAuthority::new(None)?);
        }

        let cert = self.settings.ca_cert.clone();
        let key = self.settings.ca_key.clone();
        tracing::info!("CA certificate: {:?}", cert);
        let root = tokio::task::spawn_blocking(move || CertificateAuthority::load(&cert, &key))
            .await
            .map_err(|e| ProxyError::Proxy(format!("CA loading task failed: {}", e)))??;

        Ok(LeafAuthority::new(Some(root))?)
    }

    /// Stops serving: signals graceful shutdown, waits up to
    /// [`SHUTDOWN_GRACE`] for in-flight exchanges, then aborts.
    ///
    /// A no-op when the engine is not running.
    pub async fn close(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        *self.state.lock() = EngineState::Stopping;

        let _ = running.shutdown_tx.send(());
        let mut task = running.task;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            tracing::warn!("Proxy did not stop within {:?}, aborting", SHUTDOWN_GRACE);
            task.abort();
        }

        *self.state.lock() = EngineState::Stopped;
        tracing::info!("Proxy on {} closed", running.addr);
    }
}
