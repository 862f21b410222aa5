//! Scriptable fakes for the Bluetooth ports.
//!
//! [`MockBleScanner`] replays one scripted outcome per scan.
//! [`MockBleCentral`] hands out links that share one log, so a test can
//! inspect every write and close performed through any link it opened.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use atv_core::domain::gatt::{HID_REPORT_UUID, HID_SERVICE_UUID};
use atv_core::protocol::RELEASE_REPORT;
use atv_core::{GattCharacteristic, GattService, RemoteError};
use uuid::Uuid;

use crate::application::ble_connection::{BleCentral, BleLink};
use crate::application::ble_discovery::{Advertisement, BleScanner};

// ── Scanner ───────────────────────────────────────────────────────────────────

/// Outcome of one scripted scan.
#[derive(Debug, Clone)]
pub enum ScanScript {
    Found(Vec<Advertisement>),
    Fail(String),
}

/// A [`BleScanner`] that pops one [`ScanScript`] per call.  Once the script
/// runs out every scan finds nothing.
pub struct MockBleScanner {
    script: Mutex<VecDeque<ScanScript>>,
    timeouts: Mutex<Vec<Duration>>,
}

impl MockBleScanner {
    pub fn new(script: Vec<ScanScript>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            timeouts: Mutex::new(Vec::new()),
        }
    }

    /// Timeout passed to each scan, in call order.
    pub fn scan_timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl BleScanner for MockBleScanner {
    async fn scan(&self, timeout: Duration) -> Result<Vec<Advertisement>, RemoteError> {
        self.timeouts.lock().expect("lock poisoned").push(timeout);
        match self.script.lock().expect("lock poisoned").pop_front() {
            Some(ScanScript::Found(found)) => Ok(found),
            Some(ScanScript::Fail(reason)) => Err(RemoteError::TransportUnavailable(reason)),
            None => Ok(Vec::new()),
        }
    }
}

/// Builds an advertisement with no service UUIDs or manufacturer data.
pub fn advert(address: &str, name: Option<&str>, rssi: Option<i16>) -> Advertisement {
    Advertisement {
        address: address.to_string(),
        name: name.map(str::to_string),
        rssi,
        service_uuids: Vec::new(),
        manufacturer_data: BTreeMap::new(),
    }
}

// ── GATT fixtures ─────────────────────────────────────────────────────────────

/// A peripheral exposing the HID service with a writable Report characteristic.
pub fn hid_services() -> Vec<GattService> {
    vec![GattService {
        uuid: HID_SERVICE_UUID,
        characteristics: vec![GattCharacteristic {
            service_uuid: HID_SERVICE_UUID,
            uuid: HID_REPORT_UUID,
            writable: true,
        }],
    }]
}

/// A peripheral with one vendor service holding `(uuid, writable)` characteristics.
pub fn generic_services(characteristics: &[(Uuid, bool)]) -> Vec<GattService> {
    let service = Uuid::from_u128(0xFFF0);
    vec![GattService {
        uuid: service,
        characteristics: characteristics
            .iter()
            .map(|(uuid, writable)| GattCharacteristic {
                service_uuid: service,
                uuid: *uuid,
                writable: *writable,
            })
            .collect(),
    }]
}

// ── Central ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CentralLog {
    open_calls: u32,
    close_calls: u32,
    writes: Vec<(Uuid, Vec<u8>)>,
    write_attempts: Vec<(Uuid, Vec<u8>)>,
}

#[derive(Clone)]
struct LinkBehaviour {
    services: Vec<GattService>,
    hanging_discovery: bool,
    rejected: Vec<Uuid>,
    failing_release: bool,
    device_name: Option<String>,
}

enum OpenFailure {
    None,
    First(u32, RemoteError),
    Always(RemoteError),
    Hang,
}

/// A [`BleCentral`] whose links expose fixed services and record writes.
pub struct MockBleCentral {
    behaviour: LinkBehaviour,
    open_failure: OpenFailure,
    log: Arc<Mutex<CentralLog>>,
}

impl MockBleCentral {
    pub fn new(services: Vec<GattService>) -> Self {
        Self {
            behaviour: LinkBehaviour {
                services,
                hanging_discovery: false,
                rejected: Vec::new(),
                failing_release: false,
                device_name: None,
            },
            open_failure: OpenFailure::None,
            log: Arc::new(Mutex::new(CentralLog::default())),
        }
    }

    pub fn always_failing(mut self, error: RemoteError) -> Self {
        self.open_failure = OpenFailure::Always(error);
        self
    }

    /// The first `count` opens fail with `error`; later ones succeed.
    pub fn failing_opens(mut self, count: u32, error: RemoteError) -> Self {
        self.open_failure = OpenFailure::First(count, error);
        self
    }

    /// `open` never completes.
    pub fn hanging(mut self) -> Self {
        self.open_failure = OpenFailure::Hang;
        self
    }

    /// `discover_services` never completes.
    pub fn hanging_discovery(mut self) -> Self {
        self.behaviour.hanging_discovery = true;
        self
    }

    pub fn rejecting_writes_to(mut self, uuid: Uuid) -> Self {
        self.behaviour.rejected.push(uuid);
        self
    }

    /// Writes of the release report fail.
    pub fn failing_release(mut self) -> Self {
        self.behaviour.failing_release = true;
        self
    }

    pub fn with_device_name(mut self, name: &str) -> Self {
        self.behaviour.device_name = Some(name.to_string());
        self
    }

    pub fn open_calls(&self) -> u32 {
        self.log.lock().expect("lock poisoned").open_calls
    }

    pub fn close_calls(&self) -> u32 {
        self.log.lock().expect("lock poisoned").close_calls
    }

    /// Writes the link accepted, in order.
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.log.lock().expect("lock poisoned").writes.clone()
    }

    /// Every write attempted, accepted or not.
    pub fn write_attempts(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.log.lock().expect("lock poisoned").write_attempts.clone()
    }
}

#[async_trait]
impl BleCentral for MockBleCentral {
    async fn open(&self, _address: &str) -> Result<Box<dyn BleLink>, RemoteError> {
        let call = {
            let mut log = self.log.lock().expect("lock poisoned");
            log.open_calls += 1;
            log.open_calls
        };
        match &self.open_failure {
            OpenFailure::None => {}
            OpenFailure::First(count, error) if call <= *count => return Err(error.clone()),
            OpenFailure::First(..) => {}
            OpenFailure::Always(error) => return Err(error.clone()),
            OpenFailure::Hang => std::future::pending::<()>().await,
        }
        Ok(Box::new(MockBleLink {
            behaviour: self.behaviour.clone(),
            log: Arc::clone(&self.log),
        }))
    }
}

struct MockBleLink {
    behaviour: LinkBehaviour,
    log: Arc<Mutex<CentralLog>>,
}

#[async_trait]
impl BleLink for MockBleLink {
    async fn discover_services(&self) -> Result<Vec<GattService>, RemoteError> {
        if self.behaviour.hanging_discovery {
            std::future::pending::<()>().await;
        }
        Ok(self.behaviour.services.clone())
    }

    async fn write(&self, characteristic: &GattCharacteristic, data: &[u8]) -> Result<(), RemoteError> {
        let mut log = self.log.lock().expect("lock poisoned");
        log.write_attempts.push((characteristic.uuid, data.to_vec()));

        if self.behaviour.rejected.contains(&characteristic.uuid) {
            return Err(RemoteError::WriteFailed(format!("{} rejected the write", characteristic.uuid)));
        }
        if self.behaviour.failing_release && data == RELEASE_REPORT {
            return Err(RemoteError::WriteFailed("link dropped".into()));
        }
        log.writes.push((characteristic.uuid, data.to_vec()));
        Ok(())
    }

    async fn read_device_name(&self) -> Option<String> {
        self.behaviour.device_name.clone()
    }

    async fn close(&self) {
        self.log.lock().expect("lock poisoned").close_calls += 1;
    }
}
