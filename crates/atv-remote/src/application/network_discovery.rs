//! NetworkDiscoveryUseCase: find Android TV remote endpoints with mDNS.
//!
//! The use case owns the collection window and its cleanup; the actual
//! multicast browsing sits behind [`ServiceBrowser`].
//!
//! # Contract
//!
//! `discover(timeout)` browses every configured service type, gathers the
//! IPv4 addresses of each resolved instance until `timeout` elapses, then
//! stops the browser and returns what it has.  It never fails: browser
//! errors are logged and yield whatever was collected so far (often an empty
//! list).  Addresses are deduplicated, so a TV advertising both
//! `_androidtvremote2._tcp` and `_googlecast._tcp` appears once.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atv_core::RemoteError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Android TV remote protocol v2 service.
pub const ANDROID_TV_REMOTE_SERVICE: &str = "_androidtvremote2._tcp.local.";

/// Google Cast service, also advertised by Android TV devices.
pub const GOOGLE_CAST_SERVICE: &str = "_googlecast._tcp.local.";

/// A service instance resolved to addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    pub service_type: String,
    pub instance_name: String,
    pub addresses: Vec<Ipv4Addr>,
}

/// Starts and stops mDNS browsing.
#[async_trait]
pub trait ServiceBrowser: Send + Sync {
    /// Begins browsing `service_types` and returns the stream of resolved
    /// instances.  The stream ends when browsing stops.
    async fn start(
        &self,
        service_types: &[String],
    ) -> Result<mpsc::Receiver<ResolvedService>, RemoteError>;

    /// Cancels all browsers and releases the resolver.  Idempotent.
    async fn stop(&self);
}

/// The network discovery use case.
pub struct NetworkDiscovery {
    browser: Arc<dyn ServiceBrowser>,
    service_types: Vec<String>,
}

impl NetworkDiscovery {
    /// Creates a use case browsing the Android TV and Cast service types.
    pub fn new(browser: Arc<dyn ServiceBrowser>) -> Self {
        Self::with_service_types(
            browser,
            vec![
                ANDROID_TV_REMOTE_SERVICE.to_string(),
                GOOGLE_CAST_SERVICE.to_string(),
            ],
        )
    }

    pub fn with_service_types(browser: Arc<dyn ServiceBrowser>, service_types: Vec<String>) -> Self {
        Self {
            browser,
            service_types,
        }
    }

    /// Collects resolved addresses for `timeout`, then stops browsing.
    pub async fn discover(&self, timeout: Duration) -> Vec<Ipv4Addr> {
        let mut found: Vec<Ipv4Addr> = Vec::new();

        let mut rx = match self.browser.start(&self.service_types).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("mDNS browse failed to start: {e}");
                self.browser.stop().await;
                return found;
            }
        };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(service)) => {
                    debug!(
                        "resolved {} ({}) -> {:?}",
                        service.instance_name, service.service_type, service.addresses
                    );
                    for addr in service.addresses {
                        if !found.contains(&addr) {
                            found.push(addr);
                        }
                    }
                }
                // Browser ended early; nothing more will arrive.
                Ok(None) => break,
                Err(_elapsed) => break,
            }
        }

        self.browser.stop().await;
        info!("mDNS discovery found {} device(s)", found.len());
        found
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::mock::MockServiceBrowser;

    fn svc(ty: &str, addrs: &[[u8; 4]]) -> ResolvedService {
        ResolvedService {
            service_type: ty.to_string(),
            instance_name: "Living Room TV".to_string(),
            addresses: addrs.iter().map(|a| Ipv4Addr::from(*a)).collect(),
        }
    }

    #[tokio::test]
    async fn test_discover_collects_and_dedupes_addresses_across_service_types() {
        // Arrange
        let browser = Arc::new(MockServiceBrowser::with_results(vec![
            svc(ANDROID_TV_REMOTE_SERVICE, &[[192, 168, 1, 20]]),
            svc(GOOGLE_CAST_SERVICE, &[[192, 168, 1, 20], [192, 168, 1, 21]]),
        ]));
        let discovery = NetworkDiscovery::new(browser.clone());

        // Act
        let found = discovery.discover(Duration::from_millis(200)).await;

        // Assert
        assert_eq!(
            found,
            vec![Ipv4Addr::new(192, 168, 1, 20), Ipv4Addr::new(192, 168, 1, 21)]
        );
        assert_eq!(browser.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_discover_with_no_devices_returns_empty_after_timeout() {
        let browser = Arc::new(MockServiceBrowser::silent());
        let discovery = NetworkDiscovery::new(browser.clone());

        let found = discovery.discover(Duration::from_millis(50)).await;

        assert!(found.is_empty());
        assert_eq!(browser.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_discover_swallows_start_failure() {
        let browser = Arc::new(MockServiceBrowser::failing("multicast socket unavailable"));
        let discovery = NetworkDiscovery::new(browser.clone());

        let found = discovery.discover(Duration::from_millis(50)).await;

        assert!(found.is_empty());
        assert_eq!(browser.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_discover_browses_configured_service_types() {
        let browser = Arc::new(MockServiceBrowser::silent());
        let discovery = NetworkDiscovery::new(browser.clone());

        discovery.discover(Duration::from_millis(10)).await;

        assert_eq!(
            browser.started_with(),
            vec![
                ANDROID_TV_REMOTE_SERVICE.to_string(),
                GOOGLE_CAST_SERVICE.to_string()
            ]
        );
    }
}
