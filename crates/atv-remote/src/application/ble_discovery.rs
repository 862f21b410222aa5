//! BluetoothDiscoveryUseCase: multi-attempt BLE scan with quality ranking.
//!
//! A single BLE scan often misses devices that advertise slowly, so the scan
//! is repeated `attempt_count` times and the observations are merged by
//! address (see [`atv_core::DeviceTable`]).  Between attempts the use case
//! pauses so the radio and the OS device cache can settle: a short pause when
//! the attempt found something, a longer one when it found nothing, and a
//! middle value after a scan error.  There is no pause after the final
//! attempt.
//!
//! Discovery never fails.  An unavailable adapter or a failing scan produces
//! a warning and whatever was collected so far.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atv_core::domain::device::MAX_RESULTS;
use atv_core::{DeviceMetadata, DeviceTable, DiscoveredDevice, RemoteError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::capability::Capability;
use crate::application::timing::Sleeper;

/// One advertisement as reported by the BLE stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub service_uuids: Vec<Uuid>,
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
}

impl Advertisement {
    fn into_device(self, attempt: u32) -> DiscoveredDevice {
        DiscoveredDevice::new(self.address, self.name, self.rssi, attempt).with_metadata(
            DeviceMetadata {
                service_uuids: self.service_uuids,
                manufacturer_data: self.manufacturer_data,
            },
        )
    }
}

/// Runs one bounded BLE scan.
#[async_trait]
pub trait BleScanner: Send + Sync {
    /// Scans for `timeout` and returns every device seen.
    async fn scan(&self, timeout: Duration) -> Result<Vec<Advertisement>, RemoteError>;
}

/// Pauses between scan attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPacing {
    /// After an attempt that saw at least one device.
    pub after_found: Duration,
    /// After an attempt that saw nothing.
    pub after_empty: Duration,
    /// After a scan error.
    pub after_error: Duration,
}

impl Default for ScanPacing {
    fn default() -> Self {
        Self {
            after_found: Duration::from_secs(2),
            after_empty: Duration::from_secs(5),
            after_error: Duration::from_secs(3),
        }
    }
}

/// The Bluetooth discovery use case.
pub struct BluetoothDiscovery {
    scanner: Capability<Arc<dyn BleScanner>>,
    sleeper: Arc<dyn Sleeper>,
    pacing: ScanPacing,
    max_results: usize,
}

impl BluetoothDiscovery {
    pub fn new(scanner: Capability<Arc<dyn BleScanner>>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            scanner,
            sleeper,
            pacing: ScanPacing::default(),
            max_results: MAX_RESULTS,
        }
    }

    pub fn with_pacing(mut self, pacing: ScanPacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn is_available(&self) -> bool {
        self.scanner.is_available()
    }

    /// Scans `attempt_count` times and returns the ranked device list.
    pub async fn discover(
        &self,
        timeout_per_attempt: Duration,
        attempt_count: u32,
    ) -> Vec<DiscoveredDevice> {
        let scanner = match self.scanner.require() {
            Ok(s) => s,
            Err(e) => {
                warn!("Bluetooth discovery skipped: {e}");
                return Vec::new();
            }
        };

        let mut table = DeviceTable::new();
        for attempt in 0..attempt_count {
            info!(
                "Bluetooth scan attempt {}/{} ({}s)",
                attempt + 1,
                attempt_count,
                timeout_per_attempt.as_secs()
            );

            let pause = match scanner.scan(timeout_per_attempt).await {
                Ok(ads) => {
                    let seen = ads.len();
                    for ad in ads {
                        let device = ad.into_device(attempt);
                        debug!(
                            "  {} {:?} rssi={:?} score={}",
                            device.address, device.name, device.rssi, device.quality_score
                        );
                        table.merge(device);
                    }
                    info!("attempt {} saw {seen} device(s), {} unique so far", attempt + 1, table.len());
                    if seen > 0 {
                        self.pacing.after_found
                    } else {
                        self.pacing.after_empty
                    }
                }
                Err(e) => {
                    warn!("Bluetooth scan attempt {} failed: {e}", attempt + 1);
                    self.pacing.after_error
                }
            };

            if attempt + 1 < attempt_count {
                self.sleeper.sleep(pause).await;
            }
        }

        let ranked = table.into_ranked(self.max_results);
        info!("Bluetooth discovery returned {} device(s)", ranked.len());
        ranked
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
