//! Network Management
//!
//! RPC endpoint trust and network switching:
//! - Exact-match RPC whitelist
//! - Live TLS handshake against the endpoint (bounded by a timeout)
//! - Trusted network registry and the active network
//! - Background RPC health monitoring

use crate::error::{GuardError, GuardResult};
use crate::security::manager::SecurityManager;
use crate::types::{TrustedNetwork, TxRecord};
use crate::utils::audit::SecurityEvent;
use crate::utils::network_config::{EndpointHealth, EndpointHealthCache, RpcWhitelist};
use crate::utils::security_config::NetworkSettings;
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

const DEFAULT_TLS_PORT: u16 = 443;

// =============================================================================
// TLS probe
// =============================================================================

/// Performs the live TLS handshake used to validate an RPC endpoint
#[async_trait]
pub trait TlsProbe: Send + Sync {
    /// Handshake with `host:port`, returning how many certificates the peer presented
    async fn handshake(&self, host: &str, port: u16) -> GuardResult<usize>;
}

/// `tokio-rustls` handshake verified against the webpki root set
pub struct RustlsProbe {
    connector: TlsConnector,
    timeout: Duration,
}

impl RustlsProbe {
    pub fn new(timeout: Duration) -> GuardResult<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout,
        })
    }
}

#[async_trait]
impl TlsProbe for RustlsProbe {
    async fn handshake(&self, host: &str, port: u16) -> GuardResult<usize> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| GuardError::rpc_validation(format!("invalid server name: {}", e)))?;

        let attempt = async {
            let stream = TcpStream::connect((host, port))
                .await
                .map_err(|e| GuardError::rpc_validation(format!("connection failed: {}", e)))?;
            let tls = self
                .connector
                .connect(server_name, stream)
                .await
                .map_err(|e| GuardError::rpc_validation(format!("TLS handshake failed: {}", e)))?;

            let (_, connection) = tls.get_ref();
            Ok::<usize, GuardError>(connection.peer_certificates().map_or(0, |certs| certs.len()))
        };

        tokio::time::timeout(self.timeout, attempt).await?
    }
}

// =============================================================================
// Network manager
// =============================================================================

/// Trusted networks and RPC endpoint validation
pub struct NetworkManager {
    security: Arc<SecurityManager>,
    settings: NetworkSettings,
    probe: Arc<dyn TlsProbe>,
    whitelist: RpcWhitelist,
    networks: RwLock<Vec<TrustedNetwork>>,
    active: RwLock<Option<TrustedNetwork>>,
    health: EndpointHealthCache,
}

impl NetworkManager {
    pub fn new(
        security: Arc<SecurityManager>,
        settings: NetworkSettings,
        probe: Arc<dyn TlsProbe>,
    ) -> Self {
        let whitelist = RpcWhitelist::new(settings.trusted_rpc_urls.iter().cloned());
        let health = EndpointHealthCache::new(security.clock());
        Self {
            security,
            settings,
            probe,
            whitelist,
            networks: RwLock::new(Vec::new()),
            active: RwLock::new(None),
            health,
        }
    }

    /// Build with the production `RustlsProbe`
    pub fn with_rustls(security: Arc<SecurityManager>, settings: NetworkSettings) -> GuardResult<Self> {
        let probe = Arc::new(RustlsProbe::new(settings.tls_timeout)?);
        Ok(Self::new(security, settings, probe))
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    // =========================================================================
    // RPC validation
    // =========================================================================

    /// Whitelist, https scheme, then a live TLS handshake presenting a certificate
    pub async fn validate_rpc_endpoint(&self, url: &str) -> GuardResult<bool> {
        let trusted = self.whitelist.is_trusted(url);
        let outcome = if trusted {
            self.probe_endpoint(url).await
        } else {
            Err(GuardError::rpc_validation("Untrusted RPC endpoint").with_details(url))
        };

        if trusted {
            self.health.update(url, outcome.as_ref().map(|_| ()));
        }

        match outcome {
            Ok(certificates) => {
                self.security.record_event(
                    self.event("rpc_validated")
                        .detail("url", url)
                        .detail("certificates", certificates),
                );
                Ok(true)
            }
            Err(e) => {
                self.security.record_event(
                    self.event("rpc_validation_violation")
                        .detail("url", url)
                        .detail("reason", &e.message),
                );
                Err(e)
            }
        }
    }

    async fn probe_endpoint(&self, url: &str) -> GuardResult<usize> {
        let parsed = url::Url::parse(url)
            .map_err(|e| GuardError::rpc_validation(format!("invalid RPC URL: {}", e)))?;
        if parsed.scheme() != "https" {
            return Err(GuardError::rpc_validation("RPC endpoint must use https")
                .with_details(parsed.scheme().to_string()));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| GuardError::rpc_validation("RPC URL has no host"))?;
        let port = parsed.port().unwrap_or(DEFAULT_TLS_PORT);

        let certificates = self.probe.handshake(host, port).await?;
        if certificates == 0 {
            return Err(GuardError::rpc_validation("No certificate presented")
                .with_details(format!("{}:{}", host, port)));
        }
        Ok(certificates)
    }

    /// Extend the RPC whitelist; the URL must be credential-free https
    pub fn trust_rpc_url(&self, url: &str) -> GuardResult<()> {
        self.whitelist.trust(url)
    }

    pub fn is_trusted_rpc(&self, url: &str) -> bool {
        self.whitelist.is_trusted(url)
    }

    // =========================================================================
    // Networks
    // =========================================================================

    /// Register a network after validating its RPC endpoint.
    ///
    /// A network with the same id is replaced.
    pub async fn add_trusted_network(&self, network: TrustedNetwork) -> GuardResult<()> {
        self.validate_rpc_endpoint(&network.rpc_url).await?;

        let mut networks = self
            .networks
            .write()
            .map_err(|_| GuardError::internal("Network registry lock poisoned"))?;
        networks.retain(|n| n.id != network.id);
        info!(network = %network.id, chain_id = network.chain_id, "trusted network added");
        networks.push(network);
        Ok(())
    }

    pub fn trusted_networks(&self) -> Vec<TrustedNetwork> {
        self.networks.read().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn active_network(&self) -> Option<TrustedNetwork> {
        self.active.read().ok().and_then(|a| a.clone())
    }

    /// Switch the active network for `actor`.
    ///
    /// Every failure is reported as a network-switch error carrying the cause.
    pub async fn switch_network(&self, actor: &str, id: &str) -> GuardResult<TrustedNetwork> {
        match self.try_switch(actor, id).await {
            Ok(network) => {
                self.security.record_event(
                    self.event("network_switched")
                        .actor(actor)
                        .detail("network", &network.id)
                        .detail("chain_id", network.chain_id),
                );
                Ok(network)
            }
            Err(cause) => {
                self.security.record_event(
                    self.event("network_switch_violation")
                        .actor(actor)
                        .detail("network", id)
                        .detail("reason", &cause.message),
                );
                Err(GuardError::network_switch("Network switch failed").with_details(cause.message))
            }
        }
    }

    async fn try_switch(&self, actor: &str, id: &str) -> GuardResult<TrustedNetwork> {
        let network = self
            .trusted_networks()
            .into_iter()
            .find(|n| n.id == id)
            .ok_or_else(|| GuardError::network_switch(format!("unknown network: {}", id)))?;

        self.validate_rpc_endpoint(&network.rpc_url).await?;

        let now = self.security.clock().unix_seconds();
        self.security
            .detect_suspicious_activity(actor, TxRecord::at(now))?;

        let mut active = self
            .active
            .write()
            .map_err(|_| GuardError::internal("Active network lock poisoned"))?;
        *active = Some(network.clone());
        Ok(network)
    }

    // =========================================================================
    // Health monitoring
    // =========================================================================

    /// Re-validate `url` every `health_interval` until stopped.
    ///
    /// `callback` receives each validation error. The first check runs immediately.
    pub fn monitor_rpc_health<F>(self: &Arc<Self>, url: impl Into<String>, callback: F) -> HealthMonitor
    where
        F: Fn(&GuardError) + Send + Sync + 'static,
    {
        let url = url.into();
        let manager = Arc::clone(self);
        let period = self.settings.health_interval;
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            debug!(url = %url, "RPC health monitor started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = manager.validate_rpc_endpoint(&url).await {
                            callback(&e);
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!(url = %url, "RPC health monitor stopped");
        });

        HealthMonitor { stop_tx, handle }
    }

    /// Last recorded health of a whitelisted endpoint
    pub fn endpoint_health(&self, url: &str) -> Option<EndpointHealth> {
        self.health.get(url)
    }

    pub fn unhealthy_endpoints(&self) -> Vec<EndpointHealth> {
        self.health.unhealthy()
    }

    fn event(&self, kind: &str) -> SecurityEvent {
        SecurityEvent::new(kind, self.security.clock().now())
    }
}

/// Handle to a running health monitor. Dropping it also stops the loop.
pub struct HealthMonitor {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    /// Signal the loop and wait for it to exit
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::utils::clock::ManualClock;
    use crate::utils::security_config::SecuritySettings;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProbe {
        certificates: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TlsProbe for FixedProbe {
        async fn handshake(&self, _host: &str, port: u16) -> GuardResult<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(port, 443);
            Ok(self.certificates)
        }
    }

    fn network_manager(certificates: usize) -> (NetworkManager, Arc<FixedProbe>) {
        let clock = Arc::new(ManualClock::starting_now());
        let security =
            Arc::new(SecurityManager::with_clock(SecuritySettings::default(), clock).unwrap());
        let probe = Arc::new(FixedProbe {
            certificates,
            calls: AtomicUsize::new(0),
        });
        let settings = NetworkSettings {
            trusted_rpc_urls: vec![
                "https://rpc.example.org".to_string(),
                "http://plain.example.org".to_string(),
            ],
            ..Default::default()
        };
        (NetworkManager::new(security, settings, probe.clone()), probe)
    }

    #[tokio::test]
    async fn test_untrusted_endpoint_skips_probe() {
        let (manager, probe) = network_manager(1);
        let err = manager
            .validate_rpc_endpoint("https://rpc.example.org/")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RpcValidation);
        assert_eq!(err.message, "Untrusted RPC endpoint");
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_whitelisted_http_rejected() {
        let (manager, probe) = network_manager(1);
        let err = manager
            .validate_rpc_endpoint("http://plain.example.org")
            .await
            .unwrap_err();
        assert_eq!(err.message, "RPC endpoint must use https");
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_certificate_required() {
        let (manager, _) = network_manager(0);
        let err = manager
            .validate_rpc_endpoint("https://rpc.example.org")
            .await
            .unwrap_err();
        assert_eq!(err.message, "No certificate presented");

        let health = manager.endpoint_health("https://rpc.example.org").unwrap();
        assert!(!health.is_healthy);
        assert_eq!(health.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_valid_endpoint() {
        let (manager, probe) = network_manager(2);
        assert!(manager.validate_rpc_endpoint("https://rpc.example.org").await.unwrap());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert!(manager.unhealthy_endpoints().is_empty());
    }

    #[test]
    fn test_rustls_probe_builds() {
        assert!(RustlsProbe::new(Duration::from_secs(5)).is_ok());
    }
}
