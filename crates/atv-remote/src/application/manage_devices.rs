//! ManageDevicesUseCase: registry of the devices the UI can act on.
//!
//! The `DeviceRegistry` is the in-memory list of every TV found by the last
//! discovery run, plus whichever device is currently connected.  Each entry
//! tracks:
//!
//! - The address (IPv4 for the TLS remote, MAC or platform id for BLE).
//! - A display name and the transport it was found on.
//! - For BLE devices, the quality score used to order the picker.
//! - The device's current [`ConnectionState`].
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! discovery run ──► replace_transport() ──► entries in Disconnected
//!                                                │
//!                          connect / pair ──► set_state(Connected)
//!                                                │
//!                                    disconnect ──► set_state(Disconnected)
//! ```
//!
//! A new discovery run replaces only the entries of its own transport, so a
//! Bluetooth scan does not wipe out the network results.  The connected entry
//! is kept across runs even if the new scan missed it.

use std::collections::HashMap;

use atv_core::{ConnectionState, DiscoveredDevice};
use serde::{Deserialize, Serialize};

/// The transport a device was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// TLS remote protocol over TCP.
    Network,
    /// BLE HID.
    Bluetooth,
}

/// Runtime state for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub address: String,
    pub name: String,
    pub transport: Transport,
    pub quality_score: Option<i32>,
    #[serde(skip)]
    pub connection_state: ConnectionState,
}

impl DeviceEntry {
    pub fn network(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            name: address.clone(),
            address,
            transport: Transport::Network,
            quality_score: None,
            connection_state: ConnectionState::Disconnected,
        }
    }

    pub fn bluetooth(device: &DiscoveredDevice) -> Self {
        Self {
            address: device.address.clone(),
            name: device.display_name().to_string(),
            transport: Transport::Bluetooth,
            quality_score: Some(device.quality_score),
            connection_state: ConnectionState::Disconnected,
        }
    }
}

/// In-memory registry of known devices.
///
/// Stored behind a `Mutex` in `AppState` and shared between UI commands.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceEntry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or updates a device, keeping its connection state.
    pub fn upsert(&mut self, mut entry: DeviceEntry) {
        if let Some(existing) = self.devices.get(&entry.address) {
            entry.connection_state = existing.connection_state;
        }
        self.devices.insert(entry.address.clone(), entry);
    }

    /// Replaces the results of one transport with a fresh discovery run.
    pub fn replace_transport(&mut self, transport: Transport, entries: Vec<DeviceEntry>) {
        self.devices.retain(|_, d| {
            d.transport != transport || d.connection_state != ConnectionState::Disconnected
        });
        for entry in entries {
            self.upsert(entry);
        }
    }

    /// All devices: best BLE score first, then by name.
    pub fn all(&self) -> Vec<DeviceEntry> {
        let mut list: Vec<DeviceEntry> = self.devices.values().cloned().collect();
        list.sort_by(|a, b| {
            b.quality_score
                .cmp(&a.quality_score)
                .then_with(|| a.name.cmp(&b.name))
        });
        list
    }

    pub fn get(&self, address: &str) -> Option<&DeviceEntry> {
        self.devices.get(address)
    }

    pub fn set_state(&mut self, address: &str, state: ConnectionState) {
        if let Some(device) = self.devices.get_mut(address) {
            device.connection_state = state;
        }
    }

    /// The entry currently marked connected, if any.
    pub fn connected(&self) -> Option<&DeviceEntry> {
        self.devices
            .values()
            .find(|d| d.connection_state.is_connected())
    }

    pub fn remove(&mut self, address: &str) {
        self.devices.remove(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ble(address: &str, name: &str, rssi: i16) -> DeviceEntry {
        DeviceEntry::bluetooth(&DiscoveredDevice::new(
            address.to_string(),
            Some(name.to_string()),
            Some(rssi),
            0,
        ))
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = DeviceRegistry::new();
        assert!(registry.all().is_empty());
        assert!(registry.connected().is_none());
    }

    #[test]
    fn test_upsert_keeps_connection_state() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(DeviceEntry::network("192.168.1.20"));
        registry.set_state("192.168.1.20", ConnectionState::Connected);

        let mut renamed = DeviceEntry::network("192.168.1.20");
        renamed.name = "Living Room".to_string();
        registry.upsert(renamed);

        let entry = registry.get("192.168.1.20").unwrap();
        assert_eq!(entry.name, "Living Room");
        assert_eq!(entry.connection_state, ConnectionState::Connected);
    }

    #[test]
    fn test_replace_transport_leaves_other_transport_alone() {
        // Arrange
        let mut registry = DeviceRegistry::new();
        registry.upsert(DeviceEntry::network("10.0.0.5"));
        registry.upsert(ble("AA", "Chromecast", -60));

        // Act
        registry.replace_transport(Transport::Bluetooth, vec![ble("BB", "Android TV", -50)]);

        // Assert
        assert!(registry.get("10.0.0.5").is_some());
        assert!(registry.get("AA").is_none());
        assert!(registry.get("BB").is_some());
    }

    #[test]
    fn test_replace_transport_keeps_connected_device() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(ble("AA", "Chromecast", -60));
        registry.set_state("AA", ConnectionState::Connected);

        registry.replace_transport(Transport::Bluetooth, vec![]);

        assert_eq!(registry.connected().map(|d| d.address.as_str()), Some("AA"));
    }

    #[test]
    fn test_all_orders_by_score_then_name() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(DeviceEntry::network("10.0.0.9"));
        registry.upsert(ble("AA", "Soundbar", -80));
        registry.upsert(ble("BB", "Android TV", -45));

        let order: Vec<String> = registry.all().into_iter().map(|d| d.address).collect();

        assert_eq!(order, vec!["BB", "AA", "10.0.0.9"]);
    }

    #[test]
    fn test_remove_deletes_device() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(DeviceEntry::network("10.0.0.5"));
        registry.remove("10.0.0.5");
        assert!(registry.get("10.0.0.5").is_none());
    }
}
