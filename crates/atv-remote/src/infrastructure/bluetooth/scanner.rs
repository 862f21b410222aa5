//! `btleplug`-backed BLE scanning.

use std::time::Duration;

use async_trait::async_trait;
use atv_core::RemoteError;
use btleplug::api::{Central, Peripheral as _, ScanFilter};
use btleplug::platform::Adapter;
use tracing::{debug, warn};

use super::peripheral_address;
use crate::application::ble_discovery::{Advertisement, BleScanner};

/// Production [`BleScanner`] over the first system adapter.
pub struct BtleplugScanner {
    adapter: Adapter,
}

impl BtleplugScanner {
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl BleScanner for BtleplugScanner {
    async fn scan(&self, timeout: Duration) -> Result<Vec<Advertisement>, RemoteError> {
        // Unfiltered: TVs rarely list their services in the advertisement.
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| RemoteError::TransportUnavailable(format!("BLE scan start: {e}")))?;
        tokio::time::sleep(timeout).await;

        // Read the cache before stopping; some backends clear it on stop.
        let peripherals = self.adapter.peripherals().await;
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("BLE scan stop: {e}");
        }
        let peripherals = peripherals
            .map_err(|e| RemoteError::TransportUnavailable(format!("BLE peripherals: {e}")))?;

        let mut found = Vec::with_capacity(peripherals.len());
        for peripheral in peripherals {
            let props = match peripheral.properties().await {
                Ok(Some(props)) => props,
                Ok(None) => continue,
                Err(e) => {
                    debug!("properties unavailable: {e}");
                    continue;
                }
            };
            found.push(Advertisement {
                address: peripheral_address(&peripheral, &props),
                name: props.local_name.clone(),
                rssi: props.rssi,
                service_uuids: props.services.clone(),
                manufacturer_data: props.manufacturer_data.into_iter().collect(),
            });
        }
        debug!("BLE scan saw {} peripheral(s)", found.len());
        Ok(found)
    }
}
