//! `btleplug`-backed GATT client links.
//!
//! A peripheral has to be in the adapter's cache before it can be connected,
//! so `open` scans until the requested address shows up.  That search is
//! bounded by [`SEARCH_TIMEOUT`], shorter than the shortest connect timeout,
//! so the scan is always stopped before the caller gives up on `open`.

use std::time::Duration;

use async_trait::async_trait;
use atv_core::domain::gatt::DEVICE_NAME_UUID;
use atv_core::{GattCharacteristic, GattService, RemoteError};
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Peripheral};
use tracing::{debug, info, warn};

use super::peripheral_address;
use crate::application::ble_connection::{BleCentral, BleLink};

const CACHE_POLL: Duration = Duration::from_millis(500);
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BtleplugCentral {
    adapter: Adapter,
}

impl BtleplugCentral {
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }

    async fn cached(&self, address: &str) -> Result<Option<Peripheral>, RemoteError> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| RemoteError::TransportUnavailable(e.to_string()))?;
        for peripheral in peripherals {
            if let Ok(Some(props)) = peripheral.properties().await {
                if peripheral_address(&peripheral, &props).eq_ignore_ascii_case(address) {
                    return Ok(Some(peripheral));
                }
            }
        }
        Ok(None)
    }

    async fn find(&self, address: &str) -> Result<Peripheral, RemoteError> {
        if let Some(p) = self.cached(address).await? {
            return Ok(p);
        }

        debug!("{address} not cached; scanning for it");
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| RemoteError::TransportUnavailable(format!("BLE scan start: {e}")))?;
        let search = async {
            loop {
                tokio::time::sleep(CACHE_POLL).await;
                if let Some(p) = self.cached(address).await? {
                    return Ok::<_, RemoteError>(p);
                }
            }
        };
        let found = tokio::time::timeout(SEARCH_TIMEOUT, search).await;

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("BLE scan stop: {e}");
        }
        match found {
            Ok(result) => result,
            Err(_) => Err(RemoteError::cannot_connect(
                address,
                format!("not seen within {}s of scanning", SEARCH_TIMEOUT.as_secs()),
            )),
        }
    }
}

#[async_trait]
impl BleCentral for BtleplugCentral {
    async fn open(&self, address: &str) -> Result<Box<dyn BleLink>, RemoteError> {
        let peripheral = self.find(address).await?;
        peripheral
            .connect()
            .await
            .map_err(|e| classify(address, e))?;
        info!("GATT link to {address} open");
        Ok(Box::new(BtleplugLink {
            address: address.to_string(),
            peripheral,
        }))
    }
}

pub struct BtleplugLink {
    address: String,
    peripheral: Peripheral,
}

impl BtleplugLink {
    fn characteristic(&self, service: uuid::Uuid, uuid: uuid::Uuid) -> Option<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid && c.service_uuid == service)
    }
}

#[async_trait]
impl BleLink for BtleplugLink {
    async fn discover_services(&self) -> Result<Vec<GattService>, RemoteError> {
        self.peripheral
            .discover_services()
            .await
            .map_err(|e| classify(&self.address, e))?;

        Ok(self
            .peripheral
            .services()
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .iter()
                    .map(|c| GattCharacteristic {
                        service_uuid: service.uuid,
                        uuid: c.uuid,
                        writable: c
                            .properties
                            .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn write(&self, characteristic: &GattCharacteristic, data: &[u8]) -> Result<(), RemoteError> {
        let target = self
            .characteristic(characteristic.service_uuid, characteristic.uuid)
            .ok_or(RemoteError::CharacteristicNotFound)?;
        let write_type = if target.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.peripheral
            .write(&target, data, write_type)
            .await
            .map_err(|e| RemoteError::WriteFailed(e.to_string()))
    }

    async fn read_device_name(&self) -> Option<String> {
        let characteristic = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == DEVICE_NAME_UUID && c.properties.contains(CharPropFlags::READ))?;
        let raw = self.peripheral.read(&characteristic).await.ok()?;
        let name = String::from_utf8_lossy(&raw).trim_end_matches('\0').trim().to_string();
        (!name.is_empty()).then_some(name)
    }

    async fn close(&self) {
        if let Err(e) = self.peripheral.disconnect().await {
            debug!("BLE disconnect from {}: {e}", self.address);
        }
    }
}

fn classify(address: &str, error: btleplug::Error) -> RemoteError {
    match error {
        btleplug::Error::TimedOut(d) => {
            RemoteError::Timeout(format!("BLE {address} after {}s", d.as_secs()))
        }
        btleplug::Error::NotConnected => RemoteError::ConnectionClosed(format!("{address} dropped the link")),
        btleplug::Error::PermissionDenied => {
            RemoteError::TransportUnavailable("Bluetooth permission denied".into())
        }
        other => RemoteError::cannot_connect(address, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ble_connection::BleConnectPolicy;

    #[test]
    fn test_search_gives_up_before_first_connect_timeout() {
        // The scan is stopped when the search ends, so it must end before
        // the caller's per-attempt timeout drops `open`.
        let first = BleConnectPolicy::default().connect_timeout.timeout_for(0);
        assert!(SEARCH_TIMEOUT < first, "{SEARCH_TIMEOUT:?} vs {first:?}");
    }
}
