//! Integration tests for pairing and the network remote lifecycle.
//!
//! # Purpose
//!
//! These tests exercise pairing end to end through the public API: the
//! `ui_bridge` commands on top of [`TlsRemoteController`], with either a
//! scripted session or the real TLS connector pointed at a closed port.
//! They verify:
//!
//! - The happy path: a rejected code is retried, the accepted one pairs,
//!   keys flow to the TV and the connection lands in the history file.
//! - Pushed TV state (model, power, app, volume) reaches the status snapshot.
//! - Cancelling at the prompt leaves nothing behind.
//! - Against a real socket that refuses connections, the TLS connector
//!   still creates the client credential, classifies the failure as
//!   `CannotConnect`, and the controller backs off between attempts.
//!
//! # The pairing exchange
//!
//! ```text
//! Remote                              TV
//! ──────                              ──
//! ensure credential (RSA 2048 cert)
//! TLS connect :6467  ───────────────► shows a 6-hex-digit code
//! prompt user for code
//! SHA-256(client key, server key, code) ──► accepts / BadSecret
//! TLS connect :6466  ───────────────► RemoteConfigure, then pushes state
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use atv_core::{ConnectionState, RemoteError};
use atv_remote::application::capability::Capability;
use atv_remote::application::pair_remote::{
    DeviceInfo, PairingPolicy, RemoteUpdate, TlsRemoteController, VolumeInfo,
};
use atv_remote::application::timing::RecordingSleeper;
use atv_remote::infrastructure::bluetooth::BluetoothBackends;
use atv_remote::infrastructure::network::credential::CredentialStore;
use atv_remote::infrastructure::network::mock::{
    MockRemoteConnector, MockRemoteSession, MockServiceBrowser, ScriptedCodes,
};
use atv_remote::infrastructure::network::tls_remote::{TlsRemoteConfig, TlsRemoteConnector};
use atv_remote::infrastructure::storage::config::AppConfig;
use atv_remote::infrastructure::storage::history::HistoryStore;
use atv_remote::infrastructure::ui_bridge::{self, AppState};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

const TV: &str = "192.168.1.20";

struct TempDir(PathBuf);

impl TempDir {
    fn new(prefix: &str) -> Self {
        Self(std::env::temp_dir().join(format!("{prefix}-{}", Uuid::new_v4())))
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn bridge(session: Arc<MockRemoteSession>, dir: &TempDir) -> Arc<AppState> {
    AppState::from_parts(
        AppConfig::default(),
        Arc::new(MockServiceBrowser::silent()),
        Arc::new(MockRemoteConnector::new(session)),
        BluetoothBackends {
            scanner: Capability::Unavailable("no adapter".into()),
            central: Capability::Unavailable("no adapter".into()),
        },
        Arc::new(RecordingSleeper::new()),
        HistoryStore::new(dir.0.join("connection_history.json")),
    )
}

/// Waits for the controller's listener task to apply pushed updates.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ── Scripted session ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pair_retry_code_then_send_keys_and_record_history() {
    // Arrange: the first code is mistyped, the second is right.
    let dir = TempDir::new("atv-pairing");
    let session = Arc::new(MockRemoteSession::new());
    session.script_finish_pairing(vec![
        Err(RemoteError::InvalidPairingCode("the TV rejected the code".into())),
        Ok(()),
    ]);
    let state = bridge(session.clone(), &dir);
    let codes = ScriptedCodes::new(&[("A1B2C4", true), ("A1B2C3", true)]);

    // Act
    let paired = ui_bridge::pair_network_device(state.clone(), TV.into(), &codes).await;
    let home = ui_bridge::send_key(state.clone(), "HOME".into()).await;
    let select = ui_bridge::send_key(state.clone(), "dpad_center".into()).await;

    // Assert
    assert!(paired.success, "pairing failed: {:?}", paired.error);
    let status = paired.data.expect("status");
    assert!(status.connected);
    assert_eq!(status.address.as_deref(), Some(TV));
    assert_eq!(session.submitted_codes(), vec!["A1B2C4", "A1B2C3"]);
    assert!(session.keep_reconnecting_enabled());

    assert!(home.success && select.success);
    assert_eq!(session.sent_keys(), vec!["HOME", "DPAD_CENTER"]);

    let history = ui_bridge::get_history(state.clone()).await.data.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].ip, TV);
    assert!(!history[0].favorite);
}

#[tokio::test]
async fn test_pushed_tv_state_reaches_connection_status() {
    // Arrange
    let dir = TempDir::new("atv-pairing");
    let session = Arc::new(MockRemoteSession::new());
    let state = bridge(session.clone(), &dir);
    assert!(ui_bridge::connect_network_device(state.clone(), TV.into()).await.success);

    // Act
    session.push(RemoteUpdate::DeviceInfo(DeviceInfo {
        manufacturer: "Google".into(),
        model: "Chromecast HD".into(),
    }));
    session.push(RemoteUpdate::PowerState(true));
    session.push(RemoteUpdate::CurrentApp("com.google.android.youtube.tv".into()));
    session.push(RemoteUpdate::Volume(VolumeInfo {
        level: 12,
        max: 100,
        muted: false,
    }));
    settle().await;

    // Assert
    let status = ui_bridge::get_connection_status(state.clone())
        .await
        .data
        .expect("status");
    assert_eq!(status.device_name.as_deref(), Some("Chromecast HD"));
    assert_eq!(status.is_on, Some(true));
    assert_eq!(status.current_app.as_deref(), Some("com.google.android.youtube.tv"));
    assert_eq!(status.volume.map(|v| v.level), Some(12));
}

#[tokio::test]
async fn test_cancel_at_prompt_leaves_no_connection_or_history() {
    let dir = TempDir::new("atv-pairing");
    let session = Arc::new(MockRemoteSession::new());
    let state = bridge(session.clone(), &dir);
    let codes = ScriptedCodes::new(&[("", false)]);

    let result = ui_bridge::pair_network_device(state.clone(), TV.into(), &codes).await;

    assert!(!result.success);
    assert!(session.submitted_codes().is_empty());
    assert_eq!(state.remote.state(), ConnectionState::Disconnected);
    assert!(ui_bridge::get_history(state.clone()).await.data.expect("history").is_empty());
    assert!(!ui_bridge::send_key(state.clone(), "HOME".into()).await.success);
}

#[tokio::test]
async fn test_reconnect_after_disconnect_reuses_pairing() {
    // Arrange
    let dir = TempDir::new("atv-pairing");
    let session = Arc::new(MockRemoteSession::new());
    let state = bridge(session.clone(), &dir);
    let codes = ScriptedCodes::repeating("A1B2C3");
    assert!(ui_bridge::pair_network_device(state.clone(), TV.into(), &codes).await.success);
    assert!(ui_bridge::disconnect(state.clone()).await.success);

    // Act
    let reconnected = ui_bridge::connect_network_device(state.clone(), TV.into()).await;

    // Assert: the code was asked for exactly once across both sessions.
    assert!(reconnected.success);
    assert_eq!(codes.calls(), 1);
    assert_eq!(session.start_pairing_calls(), 1);
    assert_eq!(session.connect_calls(), 2);
}

// ── Real TLS connector ────────────────────────────────────────────────────────

/// A localhost port with nothing listening on it.
async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

fn tls_connector(dir: &TempDir, port: u16) -> Arc<TlsRemoteConnector> {
    let store = Arc::new(CredentialStore::new(
        dir.0.join("keys").join("cert.pem"),
        dir.0.join("keys").join("key.pem"),
        "integration test",
    ));
    Arc::new(TlsRemoteConnector::new(
        store,
        TlsRemoteConfig {
            pairing_port: port,
            remote_port: port,
            io_timeout: Duration::from_secs(5),
            ..TlsRemoteConfig::default()
        },
    ))
}

#[tokio::test]
async fn test_connect_to_closed_port_creates_credential_and_backs_off() {
    // Arrange
    let dir = TempDir::new("atv-tls");
    let port = closed_port().await;
    let sleeper = Arc::new(RecordingSleeper::new());
    let controller =
        TlsRemoteController::with_policy(tls_connector(&dir, port), sleeper.clone(), PairingPolicy::default());

    // Act
    let result = controller.connect("127.0.0.1").await;

    // Assert
    let err = assert_err!(result);
    assert!(matches!(err, RemoteError::CannotConnect { .. }), "got {err:?}");
    assert_eq!(controller.state(), ConnectionState::Failed);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(2), Duration::from_secs(2)]
    );
    assert!(dir.0.join("keys").join("cert.pem").exists());
    assert!(dir.0.join("keys").join("key.pem").exists());
}

#[tokio::test]
async fn test_pair_with_closed_port_fails_before_prompting() {
    let dir = TempDir::new("atv-tls");
    let port = closed_port().await;
    let controller = TlsRemoteController::new(tls_connector(&dir, port), Arc::new(RecordingSleeper::new()));
    let codes = ScriptedCodes::repeating("A1B2C3");

    let err = assert_err!(controller.pair("127.0.0.1", &codes).await);

    assert!(matches!(err, RemoteError::CannotConnect { .. }), "got {err:?}");
    assert_eq!(codes.calls(), 0);
    assert_eq!(controller.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_credential_is_generated_once_and_reused() {
    // Arrange
    let dir = TempDir::new("atv-tls");
    let store = CredentialStore::new(
        dir.0.join("cert.pem"),
        dir.0.join("key.pem"),
        "integration test",
    );

    // Act
    let first = assert_ok!(store.ensure());
    let pem = std::fs::read_to_string(store.cert_path()).expect("cert written");
    let second = assert_ok!(store.ensure());

    // Assert
    assert!(first);
    assert!(!second);
    assert_eq!(std::fs::read_to_string(store.cert_path()).expect("cert kept"), pem);
    assert_ok!(store.load());
}
