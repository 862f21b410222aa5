//! Command bridge: exposes application-layer operations to a front end.
//!
//! Each `pub async fn` here is one command a UI (or the CLI) invokes.  They
//! all take the shared [`AppState`] and delegate to the use cases; none of
//! them contain protocol logic.  The Presentation layer is the only consumer
//! of this module; it must NOT be imported by the Application or Domain
//! layers.
//!
//! # Data Transfer Objects (DTOs)
//!
//! Internal types such as [`ConnectionState`] or [`DeviceEntry`] are mapped
//! to flat DTOs ([`DeviceDto`], [`ConnectionStatusDto`]) made only of
//! strings, numbers and options, so any front end can consume them as JSON.
//!
//! # `CommandResult<T>` wrapper (for beginners)
//!
//! All commands return `CommandResult<T>` rather than `Result<T, E>`.
//! Every response has the same shape:
//! `{ success: bool, data: T | null, error: string | null }`.
//! The caller can always safely read `result.success` first.
//!
//! # Side effects worth knowing
//!
//! - A successful connect (either transport) selects that transport in the
//!   dispatcher, marks the device connected in the registry, and upserts
//!   the history file, keeping any existing favorite flag.
//! - `disconnect` drops both transports.

use std::sync::Arc;

use atv_core::{ConnectionState, RemoteError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::application::{
    ble_connection::BleConnectionManager,
    ble_discovery::BluetoothDiscovery,
    dispatch::CommandDispatcher,
    manage_devices::{DeviceEntry, DeviceRegistry, Transport},
    network_discovery::{NetworkDiscovery, ServiceBrowser},
    pair_remote::{CodeProvider, DeviceInfo, PairingPolicy, RemoteConnector, TlsRemoteController, VolumeInfo},
    timing::{Sleeper, TokioSleeper},
};
use crate::infrastructure::{
    bluetooth::{self, BluetoothBackends},
    network::{
        credential::CredentialStore,
        discovery::MdnsBrowser,
        tls_remote::{TlsRemoteConfig, TlsRemoteConnector},
    },
    storage::{
        config::{load_config, AppConfig, ConfigError},
        history::{HistoryEntry, HistoryStore},
    },
};

// ── Shared application state ──────────────────────────────────────────────────

/// Everything the commands operate on, shared as `Arc<AppState>`.
///
/// The controllers manage their own locking; only the registry and the
/// config need an outer async mutex.
pub struct AppState {
    pub config: Mutex<AppConfig>,
    pub registry: Mutex<DeviceRegistry>,
    pub network_discovery: NetworkDiscovery,
    pub bluetooth_discovery: BluetoothDiscovery,
    pub remote: Arc<TlsRemoteController>,
    pub ble: Arc<BleConnectionManager>,
    pub dispatcher: CommandDispatcher,
    pub history: HistoryStore,
}

impl AppState {
    /// Builds production state: config from disk (defaults if absent), the
    /// mDNS browser, the TLS connector, and whatever Bluetooth the machine has.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if the config file exists but cannot be read or
    /// parsed, or the history path cannot be resolved.
    pub async fn new() -> Result<Arc<Self>, ConfigError> {
        Self::with_config(load_config()?).await
    }

    /// Same as [`Self::new`] with an already loaded config.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if the history path cannot be resolved.
    pub async fn with_config(config: AppConfig) -> Result<Arc<Self>, ConfigError> {
        let history = HistoryStore::new(config.history.resolve_path()?);

        let store = Arc::new(CredentialStore::new(
            config.credentials.cert_path.clone(),
            config.credentials.key_path.clone(),
            &config.general.client_name,
        ));
        let connector = Arc::new(TlsRemoteConnector::new(
            store,
            TlsRemoteConfig {
                pairing_port: config.network.pairing_port,
                remote_port: config.network.remote_port,
                client_name: config.general.client_name.clone(),
                reconnect_interval: config.network.reconnect_interval(),
                ..TlsRemoteConfig::default()
            },
        ));

        Ok(Self::from_parts(
            config,
            Arc::new(MdnsBrowser::new()),
            connector,
            bluetooth::probe().await,
            Arc::new(TokioSleeper),
            history,
        ))
    }

    /// Wires state from explicit adapters.
    pub fn from_parts(
        config: AppConfig,
        browser: Arc<dyn ServiceBrowser>,
        connector: Arc<dyn RemoteConnector>,
        bluetooth: BluetoothBackends,
        sleeper: Arc<dyn Sleeper>,
        history: HistoryStore,
    ) -> Arc<Self> {
        let policy = PairingPolicy {
            code_attempts: config.network.code_attempts,
            connect_retries: config.network.connect_retries,
            ..PairingPolicy::default()
        };
        let remote = Arc::new(TlsRemoteController::with_policy(
            connector,
            Arc::clone(&sleeper),
            policy,
        ));
        let ble = Arc::new(BleConnectionManager::new(bluetooth.central, Arc::clone(&sleeper)));
        let dispatcher = CommandDispatcher::new()
            .with_sink(Transport::Network, remote.clone())
            .with_sink(Transport::Bluetooth, ble.clone());

        Arc::new(Self {
            network_discovery: NetworkDiscovery::with_service_types(
                browser,
                config.network.service_types.clone(),
            ),
            bluetooth_discovery: BluetoothDiscovery::new(bluetooth.scanner, sleeper),
            remote,
            ble,
            dispatcher,
            history,
            registry: Mutex::new(DeviceRegistry::new()),
            config: Mutex::new(config),
        })
    }

    async fn record_connection(&self, transport: Transport, address: &str, name: &str) {
        {
            let mut registry = self.registry.lock().await;
            if registry.get(address).is_none() {
                let mut entry = DeviceEntry::network(address);
                entry.transport = transport;
                registry.upsert(entry);
            }
            if let Some(previous) = registry.connected().map(|d| d.address.clone()) {
                registry.set_state(&previous, ConnectionState::Disconnected);
            }
            registry.set_state(address, ConnectionState::Connected);
        }
        self.dispatcher.select(transport);

        let favorite = self
            .history
            .get_history()
            .iter()
            .any(|e| e.ip == address && e.favorite);
        if let Err(e) = self.history.update_history(name, address, favorite) {
            warn!("history not updated: {e}");
        }
    }
}

// ── Data Transfer Objects ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceDto {
    pub address: String,
    pub name: String,
    pub transport: Transport,
    pub quality_score: Option<i32>,
    pub connection_state: String,
}

impl From<&DeviceEntry> for DeviceDto {
    fn from(d: &DeviceEntry) -> Self {
        Self {
            address: d.address.clone(),
            name: d.name.clone(),
            transport: d.transport,
            quality_score: d.quality_score,
            connection_state: d.connection_state.to_string(),
        }
    }
}

/// Snapshot of the active connection for the status bar.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectionStatusDto {
    pub connected: bool,
    pub transport: Option<Transport>,
    pub address: Option<String>,
    pub state: String,
    pub device_name: Option<String>,
    pub device_info: Option<DeviceInfo>,
    pub is_on: Option<bool>,
    pub current_app: Option<String>,
    pub volume: Option<VolumeInfo>,
}

/// Unified response wrapper used by every command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

impl<T: Serialize> From<Result<T, RemoteError>> for CommandResult<T> {
    fn from(result: Result<T, RemoteError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Browses mDNS and replaces the network devices in the registry.
pub async fn discover_network_devices(state: Arc<AppState>) -> CommandResult<Vec<DeviceDto>> {
    let timeout = state.config.lock().await.network.discovery_timeout();
    let found = state.network_discovery.discover(timeout).await;
    info!("network discovery found {} device(s)", found.len());

    let mut registry = state.registry.lock().await;
    registry.replace_transport(
        Transport::Network,
        found.iter().map(|ip| DeviceEntry::network(ip.to_string())).collect(),
    );
    CommandResult::ok(dtos_for(&registry, Transport::Network))
}

/// Runs the multi-attempt BLE scan and replaces the Bluetooth devices in
/// the registry.  Without an adapter this succeeds with an empty list.
pub async fn discover_bluetooth_devices(state: Arc<AppState>) -> CommandResult<Vec<DeviceDto>> {
    let (timeout, attempts) = {
        let cfg = state.config.lock().await;
        (cfg.bluetooth.scan_timeout(), cfg.bluetooth.scan_attempts)
    };
    let found = state.bluetooth_discovery.discover(timeout, attempts).await;

    let mut registry = state.registry.lock().await;
    registry.replace_transport(
        Transport::Bluetooth,
        found.iter().map(DeviceEntry::bluetooth).collect(),
    );
    CommandResult::ok(dtos_for(&registry, Transport::Bluetooth))
}

fn dtos_for(registry: &DeviceRegistry, transport: Transport) -> Vec<DeviceDto> {
    registry
        .all()
        .iter()
        .filter(|d| d.transport == transport)
        .map(DeviceDto::from)
        .collect()
}

// ── Connect ───────────────────────────────────────────────────────────────────

/// Pairs with the TV at `address`, asking `codes` for the on-screen code,
/// then connects.
pub async fn pair_network_device(
    state: Arc<AppState>,
    address: String,
    codes: &dyn CodeProvider,
) -> CommandResult<ConnectionStatusDto> {
    state.ble.disconnect().await;
    if let Err(e) = state.remote.pair(&address, codes).await {
        return CommandResult::err(e.to_string());
    }
    after_network_connect(&state, &address).await
}

/// Connects to an already paired TV.
pub async fn connect_network_device(state: Arc<AppState>, address: String) -> CommandResult<ConnectionStatusDto> {
    state.ble.disconnect().await;
    if let Err(e) = state.remote.connect(&address).await {
        return CommandResult::err(e.to_string());
    }
    after_network_connect(&state, &address).await
}

async fn after_network_connect(state: &Arc<AppState>, address: &str) -> CommandResult<ConnectionStatusDto> {
    let name = match state.remote.device_info() {
        Some(info) if !info.model.is_empty() => info.model,
        _ => registry_name(state, address).await,
    };
    state.record_connection(Transport::Network, address, &name).await;
    CommandResult::ok(status_snapshot(state).await)
}

/// Connects to a TV over BLE using the configured attempt count.
pub async fn connect_bluetooth_device(state: Arc<AppState>, address: String) -> CommandResult<ConnectionStatusDto> {
    let attempts = state.config.lock().await.bluetooth.connect_attempts;
    state.remote.disconnect().await;
    if let Err(e) = state.ble.connect(&address, attempts).await {
        return CommandResult::err(e.to_string());
    }

    let name = match state.ble.device_info().await {
        Some(info) => info.name,
        None => registry_name(&state, &address).await,
    };
    state.record_connection(Transport::Bluetooth, &address, &name).await;
    CommandResult::ok(status_snapshot(&state).await)
}

async fn registry_name(state: &AppState, address: &str) -> String {
    state
        .registry
        .lock()
        .await
        .get(address)
        .map(|d| d.name.clone())
        .unwrap_or_else(|| address.to_string())
}

// ── Commands on the connection ────────────────────────────────────────────────

/// Sends one logical key (e.g. `"HOME"`, `"mute"`) on the active transport.
pub async fn send_key(state: Arc<AppState>, key: String) -> CommandResult<()> {
    state.dispatcher.dispatch(&key).await.into()
}

/// Drops whichever transport is connected.  Always succeeds.
pub async fn disconnect(state: Arc<AppState>) -> CommandResult<()> {
    state.remote.disconnect().await;
    state.ble.disconnect().await;

    let mut registry = state.registry.lock().await;
    if let Some(address) = registry.connected().map(|d| d.address.clone()) {
        registry.set_state(&address, ConnectionState::Disconnected);
    }
    CommandResult::ok(())
}

pub async fn get_connection_status(state: Arc<AppState>) -> CommandResult<ConnectionStatusDto> {
    CommandResult::ok(status_snapshot(&state).await)
}

async fn status_snapshot(state: &AppState) -> ConnectionStatusDto {
    match state.dispatcher.active() {
        Some(Transport::Bluetooth) => {
            let info = state.ble.device_info().await;
            let ble_state = state.ble.state();
            ConnectionStatusDto {
                connected: ble_state.is_connected(),
                transport: Some(Transport::Bluetooth),
                address: info.as_ref().map(|i| i.address.clone()),
                state: ble_state.to_string(),
                device_name: info.map(|i| i.name),
                ..ConnectionStatusDto::default()
            }
        }
        Some(Transport::Network) => {
            let status = state.remote.status();
            let tls_state = state.remote.state();
            ConnectionStatusDto {
                connected: tls_state.is_connected(),
                transport: Some(Transport::Network),
                address: state.remote.connected_address().await,
                state: tls_state.to_string(),
                device_name: status.device_info.as_ref().map(|d| d.model.clone()),
                device_info: status.device_info,
                is_on: status.is_on,
                current_app: status.current_app,
                volume: status.volume,
            }
        }
        None => ConnectionStatusDto {
            state: ConnectionState::Disconnected.to_string(),
            ..ConnectionStatusDto::default()
        },
    }
}

// ── History ───────────────────────────────────────────────────────────────────

pub async fn get_history(state: Arc<AppState>) -> CommandResult<Vec<HistoryEntry>> {
    CommandResult::ok(state.history.get_history())
}

pub async fn get_favorites(state: Arc<AppState>) -> CommandResult<Vec<HistoryEntry>> {
    CommandResult::ok(state.history.get_favorites())
}

/// Returns `false` in `data` if the address has never been connected.
pub async fn set_favorite(state: Arc<AppState>, address: String, favorite: bool) -> CommandResult<bool> {
    match state.history.set_favorite(&address, favorite) {
        Ok(found) => CommandResult::ok(found),
        Err(e) => CommandResult::err(format!("failed to save history: {e}")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::capability::Capability;
    use crate::application::network_discovery::ResolvedService;
    use crate::application::timing::RecordingSleeper;
    use crate::infrastructure::bluetooth::mock::{hid_services, MockBleCentral};
    use crate::infrastructure::network::mock::{MockRemoteConnector, MockRemoteSession, MockServiceBrowser};
    use std::net::Ipv4Addr;
    use std::path::PathBuf;
    use uuid::Uuid;

    struct Fixture {
        state: Arc<AppState>,
        session: Arc<MockRemoteSession>,
        dir: PathBuf,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    /// Builds isolated state: mocks for every adapter and a temp history file,
    /// so tests never touch the real config directory.
    fn fixture(services: Vec<ResolvedService>, bluetooth: bool) -> Fixture {
        let dir = std::env::temp_dir().join(format!("atv-bridge-{}", Uuid::new_v4()));
        let mut config = AppConfig::default();
        config.network.discovery_timeout_secs = 1;

        let session = Arc::new(MockRemoteSession::new());
        let backends = if bluetooth {
            let central: Arc<dyn crate::application::ble_connection::BleCentral> =
                Arc::new(MockBleCentral::new(hid_services()));
            BluetoothBackends {
                scanner: Capability::Unavailable("scanner not under test".into()),
                central: Capability::Available(central),
            }
        } else {
            BluetoothBackends {
                scanner: Capability::Unavailable("no adapter".into()),
                central: Capability::Unavailable("no adapter".into()),
            }
        };

        let state = AppState::from_parts(
            config,
            Arc::new(MockServiceBrowser::with_results(services)),
            Arc::new(MockRemoteConnector::new(session.clone())),
            backends,
            Arc::new(RecordingSleeper::new()),
            HistoryStore::new(dir.join("connection_history.json")),
        );
        Fixture { state, session, dir }
    }

    #[tokio::test]
    async fn test_discover_network_devices_fills_registry() {
        // Arrange
        let fx = fixture(
            vec![ResolvedService {
                service_type: "_androidtvremote2._tcp.local.".into(),
                instance_name: "TV".into(),
                addresses: vec![Ipv4Addr::new(192, 168, 1, 20)],
            }],
            false,
        );

        // Act
        let result = discover_network_devices(fx.state.clone()).await;

        // Assert
        assert!(result.success);
        let devices = result.data.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, "192.168.1.20");
        assert_eq!(devices[0].connection_state, "Disconnected");
    }

    #[tokio::test]
    async fn test_discover_bluetooth_without_adapter_is_empty_success() {
        let fx = fixture(vec![], false);

        let result = discover_bluetooth_devices(fx.state.clone()).await;

        assert!(result.success);
        assert!(result.data.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_network_updates_status_history_and_dispatcher() {
        // Arrange
        let fx = fixture(vec![], false);

        // Act
        let result = connect_network_device(fx.state.clone(), "10.0.0.5".into()).await;
        let sent = send_key(fx.state.clone(), "HOME".into()).await;

        // Assert
        assert!(result.success, "{:?}", result.error);
        let status = result.data.unwrap();
        assert!(status.connected);
        assert_eq!(status.transport, Some(Transport::Network));
        assert_eq!(status.address.as_deref(), Some("10.0.0.5"));
        assert!(sent.success);
        assert_eq!(fx.session.sent_keys(), vec!["HOME".to_string()]);
        let history = get_history(fx.state.clone()).await.data.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].ip, "10.0.0.5");
    }

    #[tokio::test]
    async fn test_connect_keeps_existing_favorite_flag() {
        let fx = fixture(vec![], false);
        fx.state.history.update_history("TV", "10.0.0.5", true).unwrap();

        connect_network_device(fx.state.clone(), "10.0.0.5".into()).await;

        let favorites = get_favorites(fx.state.clone()).await.data.unwrap();
        assert_eq!(favorites.len(), 1);
    }

    #[tokio::test]
    async fn test_connect_bluetooth_without_adapter_reports_unavailable() {
        let fx = fixture(vec![], false);

        let result = connect_bluetooth_device(fx.state.clone(), "AA:BB".into()).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_connect_bluetooth_routes_keys_over_ble() {
        let fx = fixture(vec![], true);

        let result = connect_bluetooth_device(fx.state.clone(), "AA:BB".into()).await;
        let sent = send_key(fx.state.clone(), "VOLUME_UP".into()).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.data.unwrap().transport, Some(Transport::Bluetooth));
        assert!(sent.success);
        assert!(fx.session.sent_keys().is_empty());
    }

    #[tokio::test]
    async fn test_send_key_when_nothing_connected_fails() {
        let fx = fixture(vec![], false);

        let result = send_key(fx.state.clone(), "HOME".into()).await;

        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_send_unknown_key_fails_without_io() {
        let fx = fixture(vec![], false);
        connect_network_device(fx.state.clone(), "10.0.0.5".into()).await;

        let result = send_key(fx.state.clone(), "WARP".into()).await;

        assert!(!result.success);
        assert!(fx.session.sent_keys().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_clears_connected_device() {
        let fx = fixture(vec![], false);
        connect_network_device(fx.state.clone(), "10.0.0.5".into()).await;

        let result = disconnect(fx.state.clone()).await;
        let status = get_connection_status(fx.state.clone()).await.data.unwrap();

        assert!(result.success);
        assert!(!status.connected);
        assert!(fx.state.registry.lock().await.connected().is_none());
    }

    #[tokio::test]
    async fn test_set_favorite_unknown_address_reports_false() {
        let fx = fixture(vec![], false);

        let result = set_favorite(fx.state.clone(), "10.9.9.9".into(), true).await;

        assert!(result.success);
        assert_eq!(result.data, Some(false));
    }

    #[test]
    fn test_command_result_ok_sets_success_true() {
        let r: CommandResult<i32> = CommandResult::ok(42);
        assert!(r.success);
        assert_eq!(r.data.unwrap(), 42);
        assert!(r.error.is_none());
    }

    #[test]
    fn test_command_result_err_sets_success_false() {
        let r: CommandResult<i32> = CommandResult::err("something went wrong");
        assert!(!r.success);
        assert!(r.data.is_none());
        assert_eq!(r.error.unwrap(), "something went wrong");
    }
}
