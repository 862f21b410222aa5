//! mDNS service browsing backed by `mdns-sd`.
//!
//! [`MdnsBrowser`] implements the application's `ServiceBrowser` port.  One
//! `ServiceDaemon` is created per `start()` call; each service type gets its
//! own browse channel, and a forwarding task per channel turns
//! `ServiceResolved` events into [`ResolvedService`] values on a single
//! Tokio channel.
//!
//! # How mDNS browsing works (for beginners)
//!
//! Android TV devices announce themselves on the LAN by multicasting DNS
//! records for the `_androidtvremote2._tcp.local.` service.  A browser sends a
//! query for that service type; every TV answers with its instance name,
//! port, and A/AAAA records.  `mdns-sd` runs the multicast socket on its own
//! thread and hands events to us over a `flume` channel, which we read with
//! `recv_async()` so no Tokio worker is ever blocked.
//!
//! `stop()` cancels the browses and shuts the daemon down, which closes the
//! flume channels, ends the forwarding tasks, and thereby closes the stream
//! returned by `start()`.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use atv_core::RemoteError;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::network_discovery::{ResolvedService, ServiceBrowser};

struct ActiveBrowse {
    daemon: ServiceDaemon,
    service_types: Vec<String>,
    forwarders: Vec<JoinHandle<()>>,
}

/// Production `ServiceBrowser`.
#[derive(Default)]
pub struct MdnsBrowser {
    active: Mutex<Option<ActiveBrowse>>,
}

impl MdnsBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveBrowse>> {
        recover(&self.active)
    }
}

/// Locks `m`, taking the guard back from a poisoned lock.  The slot only
/// ever holds a whole value, so a panic elsewhere cannot leave it torn.
fn recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[async_trait]
impl ServiceBrowser for MdnsBrowser {
    async fn start(
        &self,
        service_types: &[String],
    ) -> Result<mpsc::Receiver<ResolvedService>, RemoteError> {
        // A previous browse that was never stopped is replaced.
        self.stop().await;

        let daemon = ServiceDaemon::new()
            .map_err(|e| RemoteError::TransportUnavailable(format!("mDNS daemon: {e}")))?;
        let (tx, rx) = mpsc::channel(64);

        let mut forwarders = Vec::with_capacity(service_types.len());
        for service_type in service_types {
            let events = match daemon.browse(service_type) {
                Ok(events) => events,
                Err(e) => {
                    warn!("mDNS browse for {service_type} failed: {e}");
                    continue;
                }
            };
            debug!("browsing {service_type}");

            let tx = tx.clone();
            forwarders.push(tokio::spawn(async move {
                while let Ok(event) = events.recv_async().await {
                    match event {
                        ServiceEvent::ServiceResolved(info) => {
                            let resolved = ResolvedService {
                                service_type: info.get_type().to_string(),
                                instance_name: info.get_fullname().to_string(),
                                addresses: ipv4_only(info.get_addresses().iter().copied()),
                            };
                            if tx.send(resolved).await.is_err() {
                                break;
                            }
                        }
                        ServiceEvent::SearchStopped(_) => break,
                        other => debug!("mDNS event: {other:?}"),
                    }
                }
            }));
        }

        if forwarders.is_empty() {
            let _ = daemon.shutdown();
            return Err(RemoteError::TransportUnavailable(
                "no mDNS browse could be started".into(),
            ));
        }

        info!("mDNS browse started for {} service type(s)", forwarders.len());
        *self.active() = Some(ActiveBrowse {
            daemon,
            service_types: service_types.to_vec(),
            forwarders,
        });
        Ok(rx)
    }

    async fn stop(&self) {
        let previous = self.active().take();
        let Some(active) = previous else { return };

        for service_type in &active.service_types {
            if let Err(e) = active.daemon.stop_browse(service_type) {
                debug!("stop_browse {service_type}: {e}");
            }
        }
        if let Err(e) = active.daemon.shutdown() {
            debug!("mDNS daemon shutdown: {e}");
        }
        for task in active.forwarders {
            task.abort();
        }
        debug!("mDNS browse stopped");
    }
}

/// Keeps the IPv4 addresses; the remote protocol is reached over IPv4.
fn ipv4_only(addrs: impl Iterator<Item = IpAddr>) -> Vec<Ipv4Addr> {
    let mut out: Vec<Ipv4Addr> = addrs
        .filter_map(|a| match a {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .collect();
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_ipv4_only_drops_v6_and_sorts() {
        let addrs = vec![
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 30)),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 4)),
        ];

        let v4 = ipv4_only(addrs.into_iter());

        assert_eq!(
            v4,
            vec![Ipv4Addr::new(192, 168, 1, 4), Ipv4Addr::new(192, 168, 1, 30)]
        );
    }

    #[tokio::test]
    async fn test_stop_without_start_is_a_no_op() {
        let browser = MdnsBrowser::new();
        browser.stop().await;
        browser.stop().await;
    }

    #[test]
    fn test_recover_returns_guard_from_poisoned_lock() {
        // Arrange: poison the lock by panicking while it is held.
        let slot = std::sync::Arc::new(Mutex::new(Some(7u32)));
        let poisoner = std::sync::Arc::clone(&slot);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(slot.is_poisoned());

        // Act
        let taken = recover(&slot).take();

        // Assert
        assert_eq!(taken, Some(7));
        assert_eq!(*recover(&slot), None);
    }
}
