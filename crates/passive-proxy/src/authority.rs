//! Per-host TLS server configs for intercepted CONNECT tunnels.

use std::sync::Arc;

use hudsucker::certificate_authority::CertificateAuthority as HudsuckerAuthority;
use hyper::http::uri::Authority;
use moka::future::Cache;
use rustls::crypto::aws_lc_rs::default_provider;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;

use crate::ca::{CaError, CertificateAuthority, IssuedLeaf};

/// Maximum number of cached leaf configs.
const LEAF_CACHE_CAPACITY: u64 = 1000;

/// Resolver that never offers a certificate, so every handshake fails.
#[derive(Debug)]
struct NoCertificate;

impl ResolvesServerCert for NoCertificate {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        None
    }
}

/// Issues and caches one leaf certificate per tunnelled host.
///
/// When issuance fails the tunnel gets a config without any certificate:
/// that one handshake fails and the proxy keeps serving.
pub struct LeafAuthority {
    root: Option<Arc<CertificateAuthority>>,
    cache: Cache<String, Arc<ServerConfig>>,
    refusal: Arc<ServerConfig>,
}

impl std::fmt::Debug for LeafAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafAuthority")
            .field("has_root", &self.root.is_some())
            .field("cached", &self.cache.entry_count())
            .finish()
    }
}

impl LeafAuthority {
    /// Creates an authority signing with `root`. Without a root every
    /// handshake is refused.
    pub fn new(root: Option<CertificateAuthority>) -> Result<Self, CaError> {
        let refusal = ServerConfig::builder_with_provider(Arc::new(default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| CaError::Crypto(e.to_string()))?
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(NoCertificate));

        Ok(Self {
            root: root.map(Arc::new),
            cache: Cache::builder().max_capacity(LEAF_CACHE_CAPACITY).build(),
            refusal: Arc::new(refusal),
        })
    }

    /// Returns the server config for `host`, issuing a leaf on first use.
    pub async fn server_config_for(&self, host: &str) -> Result<Arc<ServerConfig>, CaError> {
        let key = host.to_ascii_lowercase();
        // Concurrent first requests for a host share one issuance.
        self.cache
            .try_get_with(key, self.issue_config(host))
            .await
            .map_err(|e| Arc::try_unwrap(e).unwrap_or_else(|e| CaError::Crypto(e.to_string())))
    }

    async fn issue_config(&self, host: &str) -> Result<Arc<ServerConfig>, CaError> {
        let root = self
            .root
            .clone()
            .ok_or_else(|| CaError::Crypto("no root CA loaded".into()))?;
        let target = format!("https://{}", host);

        let leaf = tokio::task::spawn_blocking(move || root.issue_leaf(&target))
            .await
            .map_err(|e| CaError::Crypto(format!("leaf issuance task failed: {}", e)))??;

        let config = Arc::new(self.leaf_config(leaf)?);
        tracing::debug!("Issued leaf certificate for {}", host);
        Ok(config)
    }

    fn leaf_config(&self, leaf: IssuedLeaf) -> Result<ServerConfig, CaError> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| CaError::Crypto("no root CA loaded".into()))?;
        let chain = vec![leaf.cert_der, root.root_der().clone()];

        let mut config = ServerConfig::builder_with_provider(Arc::new(default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| CaError::Crypto(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(chain, leaf.key_der)
            .map_err(|e| CaError::Crypto(e.to_string()))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(config)
    }
}

impl HudsuckerAuthority for LeafAuthority {
    async fn gen_server_config(&self, authority: &Authority) -> Arc<ServerConfig> {
        match self.server_config_for(authority.as_str()).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Cannot issue certificate for {}: {}", authority, e);
                self.refusal.clone()
            }
        }
    }
}
