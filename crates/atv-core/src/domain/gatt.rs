//! GATT service model and HID report characteristic resolution.
//!
//! After a BLE connect the manager enumerates services and must pick where
//! key reports go.  The preferred target is the HID Report characteristic
//! (0x2A4D) inside the HID service (0x1812).  Many TVs do not expose that to
//! a central, so the fallback is every characteristic that advertises a
//! write capability, tried in discovery order until one accepts the write.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Human Interface Device service.
pub const HID_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1812_0000_1000_8000_0080_5f9b_34fb);

/// HID Report characteristic.
pub const HID_REPORT_UUID: Uuid = Uuid::from_u128(0x0000_2a4d_0000_1000_8000_0080_5f9b_34fb);

/// Generic Access "Device Name" characteristic.
pub const DEVICE_NAME_UUID: Uuid = Uuid::from_u128(0x0000_2a00_0000_1000_8000_0080_5f9b_34fb);

/// One characteristic as reported by service discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GattCharacteristic {
    pub service_uuid: Uuid,
    pub uuid: Uuid,
    /// Supports write-with-response or write-without-response.
    pub writable: bool,
}

/// One service with its characteristics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

/// Where key reports will be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportTarget {
    /// The HID Report characteristic was found.
    HidReport(GattCharacteristic),
    /// Writable characteristics in discovery order; may be empty.
    Generic(Vec<GattCharacteristic>),
}

impl ReportTarget {
    /// Candidates in the order writes should be attempted.
    pub fn candidates(&self) -> Vec<&GattCharacteristic> {
        match self {
            ReportTarget::HidReport(c) => vec![c],
            ReportTarget::Generic(list) => list.iter().collect(),
        }
    }

    pub fn is_hid(&self) -> bool {
        matches!(self, ReportTarget::HidReport(_))
    }
}

/// Picks the report target from a discovered service list.
pub fn resolve_report_target(services: &[GattService]) -> ReportTarget {
    let hid = services
        .iter()
        .filter(|s| s.uuid == HID_SERVICE_UUID)
        .flat_map(|s| s.characteristics.iter())
        .find(|c| c.uuid == HID_REPORT_UUID);

    if let Some(report) = hid {
        return ReportTarget::HidReport(report.clone());
    }

    let writable = services
        .iter()
        .flat_map(|s| s.characteristics.iter())
        .filter(|c| c.writable)
        .cloned()
        .collect();
    ReportTarget::Generic(writable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(service: Uuid, uuid: Uuid, writable: bool) -> GattCharacteristic {
        GattCharacteristic {
            service_uuid: service,
            uuid,
            writable,
        }
    }

    #[test]
    fn test_resolve_prefers_hid_report_characteristic() {
        // Arrange
        let other = Uuid::from_u128(0xABCD);
        let services = vec![
            GattService {
                uuid: other,
                characteristics: vec![ch(other, Uuid::from_u128(1), true)],
            },
            GattService {
                uuid: HID_SERVICE_UUID,
                characteristics: vec![ch(HID_SERVICE_UUID, HID_REPORT_UUID, true)],
            },
        ];

        // Act
        let target = resolve_report_target(&services);

        // Assert
        assert!(target.is_hid());
        assert_eq!(target.candidates()[0].uuid, HID_REPORT_UUID);
    }

    #[test]
    fn test_resolve_falls_back_to_writable_characteristics_in_order() {
        let svc = Uuid::from_u128(0x1800);
        let services = vec![GattService {
            uuid: svc,
            characteristics: vec![
                ch(svc, Uuid::from_u128(1), false),
                ch(svc, Uuid::from_u128(2), true),
                ch(svc, Uuid::from_u128(3), true),
            ],
        }];

        let target = resolve_report_target(&services);

        let uuids: Vec<Uuid> = target.candidates().iter().map(|c| c.uuid).collect();
        assert_eq!(uuids, vec![Uuid::from_u128(2), Uuid::from_u128(3)]);
    }

    #[test]
    fn test_resolve_with_nothing_writable_yields_empty_generic_target() {
        assert_eq!(resolve_report_target(&[]), ReportTarget::Generic(Vec::new()));
    }

    #[test]
    fn test_uuid_constants_render_in_standard_form() {
        assert_eq!(
            HID_SERVICE_UUID.to_string(),
            "00001812-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            HID_REPORT_UUID.to_string(),
            "00002a4d-0000-1000-8000-00805f9b34fb"
        );
    }
}
