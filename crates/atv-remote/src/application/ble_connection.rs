//! BleConnectionUseCase: connect to a TV over BLE and write HID key reports.
//!
//! # Connect (for beginners)
//!
//! 1. Open a GATT client with a per-attempt timeout that grows with each
//!    attempt (15 s, 20 s, 25 s, ...).
//! 2. Enumerate services under their own 10 s timeout.
//! 3. Pick the report target: the HID Report characteristic if the TV
//!    exposes it, otherwise every writable characteristic in discovery order.
//! 4. A failed attempt closes the partial link, bumps the per-address failure
//!    counter, and waits out the backoff before the next attempt (but not
//!    after the last).
//!
//! States move `Disconnected → Connecting → ServiceDiscovery → Connected`.
//! There is no persisted `Failed`: a failed connect reports its reason and
//! leaves the manager `Disconnected`.
//!
//! # Key send
//!
//! A key is always a press/release pair on the same characteristic:
//! `[0x01, lo, hi]`, a short settle delay, then `[0x01, 0x00, 0x00]`.  If
//! the press cannot be written the release is never sent.  A failed release
//! is logged and ignored.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use atv_core::domain::gatt::resolve_report_target;
use atv_core::protocol::RELEASE_REPORT;
use atv_core::{
    BackoffSchedule, ConnectionAttemptHistory, ConnectionState, ConsumerReport, GattCharacteristic,
    GattService, KeyMapper, RemoteError, RemoteKey, ReportTarget, TimeoutRamp,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::application::capability::Capability;
use crate::application::status::StatusNotifier;
use crate::application::timing::Sleeper;

/// Transport label reported in [`BleDeviceInfo`].
pub const BLE_TRANSPORT_LABEL: &str = "Bluetooth HID";

// ── Ports ─────────────────────────────────────────────────────────────────────

/// Opens GATT client links.
#[async_trait]
pub trait BleCentral: Send + Sync {
    /// Connects to the peripheral with `address`.  May never return; the
    /// caller bounds it with a timeout.
    async fn open(&self, address: &str) -> Result<Box<dyn BleLink>, RemoteError>;
}

/// An open GATT client link.
#[async_trait]
pub trait BleLink: Send + Sync {
    async fn discover_services(&self) -> Result<Vec<GattService>, RemoteError>;

    /// Writes `data` to `characteristic`.  Fails with `WriteFailed`.
    async fn write(&self, characteristic: &GattCharacteristic, data: &[u8]) -> Result<(), RemoteError>;

    /// Reads the Generic Access device name, if the peripheral exposes it.
    async fn read_device_name(&self) -> Option<String>;

    /// Disconnects.  Idempotent.
    async fn close(&self);
}

// ── Policy ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BleConnectPolicy {
    pub connect_timeout: TimeoutRamp,
    pub backoff: BackoffSchedule,
    pub service_discovery_timeout: Duration,
    /// Pause between the press and the release report.
    pub settle: Duration,
}

impl Default for BleConnectPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: TimeoutRamp {
                base: Duration::from_secs(15),
                step: Duration::from_secs(5),
            },
            backoff: BackoffSchedule::fixed(Duration::from_secs(2)),
            service_discovery_timeout: Duration::from_secs(10),
            settle: Duration::from_millis(100),
        }
    }
}

/// The connected peripheral as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleDeviceInfo {
    pub name: String,
    pub address: String,
    pub transport: String,
}

// ── Manager ───────────────────────────────────────────────────────────────────

struct BleSession {
    address: String,
    name: Option<String>,
    link: Box<dyn BleLink>,
    target: ReportTarget,
    /// Generic-fallback characteristic that last accepted a write.
    accepted: Option<GattCharacteristic>,
}

impl BleSession {
    /// Characteristics to try, most likely first.
    fn write_order(&self) -> Vec<GattCharacteristic> {
        let mut order: Vec<GattCharacteristic> = Vec::new();
        if let Some(c) = &self.accepted {
            order.push(c.clone());
        }
        for c in self.target.candidates() {
            if !order.contains(c) {
                order.push(c.clone());
            }
        }
        order
    }
}

/// The BLE connection manager.  Holds at most one link.
pub struct BleConnectionManager {
    central: Capability<Arc<dyn BleCentral>>,
    sleeper: Arc<dyn Sleeper>,
    policy: BleConnectPolicy,
    state: watch::Sender<ConnectionState>,
    session: Mutex<Option<BleSession>>,
    attempts: StdMutex<ConnectionAttemptHistory>,
    notifier: StatusNotifier,
    command_lock: Mutex<()>,
}

impl BleConnectionManager {
    pub fn new(central: Capability<Arc<dyn BleCentral>>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self::with_policy(central, sleeper, BleConnectPolicy::default())
    }

    pub fn with_policy(
        central: Capability<Arc<dyn BleCentral>>,
        sleeper: Arc<dyn Sleeper>,
        policy: BleConnectPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            central,
            sleeper,
            policy,
            state,
            session: Mutex::new(None),
            attempts: StdMutex::new(ConnectionAttemptHistory::new()),
            notifier: StatusNotifier::new(),
            command_lock: Mutex::new(()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.central.is_available()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn notifier(&self) -> &StatusNotifier {
        &self.notifier
    }

    /// Failed attempts recorded for `address` since its last success.
    pub fn connection_attempts(&self, address: &str) -> u32 {
        self.attempts.lock().map(|h| h.failures(address)).unwrap_or(0)
    }

    /// Clears the counter for one address, or all of them.
    pub fn reset_connection_history(&self, address: Option<&str>) {
        if let Ok(mut h) = self.attempts.lock() {
            h.reset(address);
        }
    }

    pub async fn device_info(&self) -> Option<BleDeviceInfo> {
        self.session.lock().await.as_ref().map(|s| BleDeviceInfo {
            name: s.name.clone().unwrap_or_else(|| s.address.clone()),
            address: s.address.clone(),
            transport: BLE_TRANSPORT_LABEL.to_string(),
        })
    }

    // ── Connect / disconnect ──────────────────────────────────────────────────

    /// Connects with up to `max_attempts` attempts.
    ///
    /// # Errors
    ///
    /// - [`RemoteError::TransportUnavailable`] immediately if no adapter.
    /// - [`RemoteError::CharacteristicNotFound`] if the TV exposes nothing
    ///   writable; not retried.
    /// - Otherwise the last attempt's error.
    pub async fn connect(&self, address: &str, max_attempts: u32) -> Result<(), RemoteError> {
        let central = Arc::clone(self.central.require()?);
        self.teardown().await;

        let attempts = max_attempts.max(1);
        let mut last_error = RemoteError::Unknown("no connect attempt made".into());

        for attempt in 0..attempts {
            info!("BLE connect to {address} (attempt {}/{attempts})", attempt + 1);
            self.state.send_replace(ConnectionState::Connecting);

            match self.try_connect(central.as_ref(), address, attempt).await {
                Ok(session) => {
                    if let Ok(mut h) = self.attempts.lock() {
                        h.record_success(address);
                    }
                    let label = session.name.clone().unwrap_or_else(|| address.to_string());
                    info!(
                        "BLE connected to {label} ({})",
                        if session.target.is_hid() { "HID report" } else { "generic write" }
                    );
                    *self.session.lock().await = Some(session);
                    self.state.send_replace(ConnectionState::Connected);
                    self.notifier.notify(true, &format!("Connected to {label}"));
                    return Ok(());
                }
                Err(e) => {
                    let failures = self
                        .attempts
                        .lock()
                        .map(|mut h| h.record_failure(address))
                        .unwrap_or(0);
                    warn!("BLE attempt {} failed ({failures} total): {e}", attempt + 1);

                    let retryable = e.is_transient() || matches!(e, RemoteError::Timeout(_));
                    last_error = e;
                    if !retryable {
                        break;
                    }
                    if attempt + 1 < attempts {
                        self.sleeper.sleep(self.policy.backoff.delay_for(attempt)).await;
                    }
                }
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);
        self.notifier
            .notify(false, &format!("Connection failed: {last_error}"));
        Err(last_error)
    }

    /// Boolean form of [`Self::connect`].
    pub async fn connect_with_retry(&self, address: &str, max_retries: u32) -> bool {
        self.connect(address, max_retries).await.is_ok()
    }

    /// Closes the link if any.  Idempotent.
    pub async fn disconnect(&self) {
        let was_up = self.teardown().await;
        self.state.send_replace(ConnectionState::Disconnected);
        if was_up {
            info!("BLE disconnected");
            self.notifier.notify(false, "Disconnected");
        }
    }

    async fn teardown(&self) -> bool {
        match self.session.lock().await.take() {
            Some(session) => {
                session.link.close().await;
                true
            }
            None => false,
        }
    }

    async fn try_connect(
        &self,
        central: &dyn BleCentral,
        address: &str,
        attempt: u32,
    ) -> Result<BleSession, RemoteError> {
        let timeout = self.policy.connect_timeout.timeout_for(attempt);
        let link = match tokio::time::timeout(timeout, central.open(address)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RemoteError::Timeout(format!(
                    "BLE connect to {address} after {}s",
                    timeout.as_secs()
                )))
            }
        };

        self.state.send_replace(ConnectionState::ServiceDiscovery);
        let sd_timeout = self.policy.service_discovery_timeout;
        let services = match tokio::time::timeout(sd_timeout, link.discover_services()).await {
            Ok(Ok(services)) => services,
            Ok(Err(e)) => {
                link.close().await;
                return Err(e);
            }
            Err(_) => {
                link.close().await;
                return Err(RemoteError::ServiceDiscoveryTimeout(sd_timeout.as_secs()));
            }
        };
        debug!("{} GATT service(s) on {address}", services.len());

        let target = resolve_report_target(&services);
        if target.candidates().is_empty() {
            link.close().await;
            return Err(RemoteError::CharacteristicNotFound);
        }

        let name = link.read_device_name().await;
        Ok(BleSession {
            address: address.to_string(),
            name,
            link,
            target,
            accepted: None,
        })
    }

    // ── Key send ──────────────────────────────────────────────────────────────

    /// Sends a key by name.
    ///
    /// # Errors
    ///
    /// [`RemoteError::UnknownKey`] without any write, [`RemoteError::NotConnected`],
    /// or [`RemoteError::WriteFailed`] when no characteristic accepted the press.
    pub async fn send_key(&self, key_name: &str) -> Result<(), RemoteError> {
        let key = RemoteKey::from_name(key_name)
            .ok_or_else(|| RemoteError::UnknownKey(key_name.to_string()))?;
        self.send(key).await
    }

    pub async fn send(&self, key: RemoteKey) -> Result<(), RemoteError> {
        let _guard = self.command_lock.lock().await;
        let mut slot = self.session.lock().await;
        let session = slot.as_mut().ok_or(RemoteError::NotConnected)?;

        let press = ConsumerReport::press(KeyMapper::to_consumer_usage(key)).encode();
        let characteristic = write_press(session, &press).await?;
        debug!("{key} pressed via {}", characteristic.uuid);

        self.sleeper.sleep(self.policy.settle).await;

        if let Err(e) = session.link.write(&characteristic, &RELEASE_REPORT).await {
            warn!("release report for {key} not written: {e}");
        }
        Ok(())
    }
}

/// Writes the press report to the first characteristic that accepts it.
async fn write_press(
    session: &mut BleSession,
    press: &[u8],
) -> Result<GattCharacteristic, RemoteError> {
    let mut last_error = RemoteError::CharacteristicNotFound;
    for characteristic in session.write_order() {
        match session.link.write(&characteristic, press).await {
            Ok(()) => {
                if !session.target.is_hid() {
                    session.accepted = Some(characteristic.clone());
                }
                return Ok(characteristic);
            }
            Err(e) => {
                debug!("write to {} rejected: {e}", characteristic.uuid);
                last_error = e;
            }
        }
    }
    Err(match last_error {
        e @ RemoteError::WriteFailed(_) => e,
        other => RemoteError::WriteFailed(other.to_string()),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::timing::RecordingSleeper;
    use crate::infrastructure::bluetooth::mock::{generic_services, hid_services, MockBleCentral};
    use atv_core::domain::gatt::HID_REPORT_UUID;
    use uuid::Uuid;

    fn manager(central: Arc<MockBleCentral>) -> (BleConnectionManager, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let central: Arc<dyn BleCentral> = central;
        (
            BleConnectionManager::new(Capability::Available(central), sleeper.clone()),
            sleeper,
        )
    }

    #[tokio::test]
    async fn test_connect_with_retry_perpetual_failure_makes_three_attempts() {
        // Arrange
        let central = Arc::new(
            MockBleCentral::new(hid_services())
                .always_failing(RemoteError::cannot_connect("AA:BB", "le-connection-abort")),
        );
        let (mgr, sleeper) = manager(central.clone());

        // Act
        let ok = mgr.connect_with_retry("AA:BB", 3).await;

        // Assert
        assert!(!ok);
        assert_eq!(central.open_calls(), 3);
        assert_eq!(mgr.connection_attempts("AA:BB"), 3);
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(2); 2]);
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_counter_accumulates_across_calls_and_resets_on_success() {
        let central = Arc::new(
            MockBleCentral::new(hid_services())
                .failing_opens(4, RemoteError::cannot_connect("AA:BB", "busy")),
        );
        let (mgr, _) = manager(central.clone());

        assert!(!mgr.connect_with_retry("AA:BB", 3).await);
        assert_eq!(mgr.connection_attempts("AA:BB"), 3);

        assert!(mgr.connect_with_retry("AA:BB", 3).await);
        assert_eq!(mgr.connection_attempts("AA:BB"), 0);
        assert_eq!(mgr.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_grows_per_attempt() {
        let central = Arc::new(MockBleCentral::new(hid_services()).hanging());
        let (mgr, _) = manager(central.clone());
        let started = tokio::time::Instant::now();

        let result = mgr.connect("AA:BB", 2).await;

        assert!(matches!(result, Err(RemoteError::Timeout(_))));
        // 15 s + 20 s of timeouts; the recording sleeper does not advance time.
        assert_eq!(started.elapsed(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_discovery_timeout_closes_partial_link() {
        let central = Arc::new(MockBleCentral::new(hid_services()).hanging_discovery());
        let (mgr, _) = manager(central.clone());

        let result = mgr.connect("AA:BB", 1).await;

        assert_eq!(result, Err(RemoteError::ServiceDiscoveryTimeout(10)));
        assert_eq!(central.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_writable_characteristic_is_not_retried() {
        let central = Arc::new(MockBleCentral::new(generic_services(&[(Uuid::from_u128(7), false)])));
        let (mgr, sleeper) = manager(central.clone());

        let result = mgr.connect("AA:BB", 3).await;

        assert_eq!(result, Err(RemoteError::CharacteristicNotFound));
        assert_eq!(central.open_calls(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_adapter_fails_fast() {
        let mgr = BleConnectionManager::new(
            Capability::Unavailable("no adapter".into()),
            Arc::new(RecordingSleeper::new()),
        );

        let result = mgr.connect("AA:BB", 3).await;

        assert_eq!(result, Err(RemoteError::TransportUnavailable("no adapter".into())));
        assert_eq!(mgr.connection_attempts("AA:BB"), 0);
    }

    #[tokio::test]
    async fn test_send_key_writes_press_then_release_to_hid_report() {
        // Arrange
        let central = Arc::new(MockBleCentral::new(hid_services()));
        let (mgr, sleeper) = manager(central.clone());
        mgr.connect("AA:BB", 1).await.unwrap();

        // Act
        mgr.send_key("HOME").await.unwrap();

        // Assert
        assert_eq!(
            central.writes(),
            vec![
                (HID_REPORT_UUID, vec![0x01, 0x23, 0x02]),
                (HID_REPORT_UUID, vec![0x01, 0x00, 0x00]),
            ]
        );
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(100)]);
    }

    #[tokio::test]
    async fn test_unknown_key_performs_no_writes() {
        let central = Arc::new(MockBleCentral::new(hid_services()));
        let (mgr, _) = manager(central.clone());
        mgr.connect("AA:BB", 1).await.unwrap();

        let result = mgr.send_key("TELEPORT").await;

        assert_eq!(result, Err(RemoteError::UnknownKey("TELEPORT".into())));
        assert!(central.write_attempts().is_empty());
    }

    #[tokio::test]
    async fn test_press_failure_aborts_before_release() {
        let central = Arc::new(MockBleCentral::new(hid_services()).rejecting_writes_to(HID_REPORT_UUID));
        let (mgr, sleeper) = manager(central.clone());
        mgr.connect("AA:BB", 1).await.unwrap();

        let result = mgr.send_key("POWER").await;

        assert!(matches!(result, Err(RemoteError::WriteFailed(_))));
        assert_eq!(central.write_attempts().len(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_release_failure_does_not_fail_the_press() {
        let central = Arc::new(MockBleCentral::new(hid_services()).failing_release());
        let (mgr, _) = manager(central.clone());
        mgr.connect("AA:BB", 1).await.unwrap();

        let result = mgr.send_key("VOLUME_UP").await;

        assert_eq!(result, Ok(()));
        assert_eq!(central.writes(), vec![(HID_REPORT_UUID, vec![0x01, 0xE9, 0x00])]);
    }

    #[tokio::test]
    async fn test_generic_fallback_tries_each_writable_until_one_accepts() {
        let (a, b) = (Uuid::from_u128(0xA), Uuid::from_u128(0xB));
        let central = Arc::new(
            MockBleCentral::new(generic_services(&[(a, true), (b, true)])).rejecting_writes_to(a),
        );
        let (mgr, _) = manager(central.clone());
        mgr.connect("AA:BB", 1).await.unwrap();

        mgr.send_key("BACK").await.unwrap();

        assert_eq!(
            central.writes(),
            vec![(b, vec![0x01, 0x24, 0x02]), (b, vec![0x01, 0x00, 0x00])]
        );
    }

    #[tokio::test]
    async fn test_send_when_disconnected_is_not_connected() {
        let (mgr, _) = manager(Arc::new(MockBleCentral::new(hid_services())));
        assert_eq!(mgr.send_key("HOME").await, Err(RemoteError::NotConnected));
    }

    #[tokio::test]
    async fn test_device_info_prefers_gatt_name() {
        let central = Arc::new(MockBleCentral::new(hid_services()).with_device_name("SHIELD"));
        let (mgr, _) = manager(central.clone());
        mgr.connect("AA:BB", 1).await.unwrap();

        let info = mgr.device_info().await.unwrap();

        assert_eq!(info.name, "SHIELD");
        assert_eq!(info.transport, BLE_TRANSPORT_LABEL);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let central = Arc::new(MockBleCentral::new(hid_services()));
        let (mgr, _) = manager(central.clone());
        mgr.connect("AA:BB", 1).await.unwrap();

        mgr.disconnect().await;
        mgr.disconnect().await;

        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert_eq!(central.close_calls(), 1);
        assert!(mgr.device_info().await.is_none());
    }

    #[tokio::test]
    async fn test_reset_connection_history_clears_one_address() {
        let central = Arc::new(
            MockBleCentral::new(hid_services()).always_failing(RemoteError::cannot_connect("x", "y")),
        );
        let (mgr, _) = manager(central);
        mgr.connect_with_retry("AA", 1).await;
        mgr.connect_with_retry("BB", 2).await;

        mgr.reset_connection_history(Some("AA"));

        assert_eq!(mgr.connection_attempts("AA"), 0);
        assert_eq!(mgr.connection_attempts("BB"), 2);
    }

    #[tokio::test]
    async fn test_disconnect_notifies_only_when_a_link_was_closed() {
        // Arrange
        let central = Arc::new(MockBleCentral::new(hid_services()));
        let (mgr, _) = manager(central.clone());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        mgr.notifier()
            .subscribe(Arc::new(crate::application::status::FnObserver(
                move |up: bool, msg: &str| sink.lock().unwrap().push((up, msg.to_string())),
            )))
            .unwrap();

        // Act
        mgr.disconnect().await;
        mgr.connect("AA:BB", 1).await.unwrap();
        mgr.disconnect().await;
        mgr.disconnect().await;

        // Assert
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2, "{seen:?}");
        assert!(seen[0].0);
        assert_eq!(seen[1], (false, "Disconnected".to_string()));
    }
}
