//! PairRemoteUseCase: the TLS remote's pairing and connection state machine.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! Disconnected ─► GeneratingCredential ─► Pairing ─► Connecting ─► Connected ⇄ Reconnecting
//!       ▲                                                               │
//!       └───────────────────────── disconnect() ◄──────────────────────┘
//! ```
//!
//! - **GeneratingCredential**: on first use a self-signed client certificate
//!   is created and persisted; later runs reuse it.
//! - **Pairing**: the TV shows a code; the [`CodeProvider`] (usually a UI
//!   dialog) is asked for it up to `code_attempts` times.  A wrong code uses
//!   up an attempt; `confirmed == false` cancels the whole pairing at once.
//! - **Connecting**: up to `connect_retries` attempts.  If the TV rejects the
//!   certificate the code exchange is repeated before the next attempt; a
//!   network error just waits out the backoff.
//! - **Connected / Reconnecting**: the session reconnects by itself after a
//!   drop and pushes state (device info, power, app, volume) which this
//!   controller mirrors in read-only fields.
//!
//! Any unrecoverable error lands in `Failed`.  A cancelled pairing and
//! `disconnect()` land in `Disconnected`.
//!
//! # Seams
//!
//! The wire protocol sits behind [`RemoteConnector`] / [`RemoteSession`].
//! Sessions translate their I/O failures into [`RemoteError`] before
//! returning, so callers of this controller only ever see that taxonomy
//! (use [`RemoteError::pairing_failure`] for the six-way classification).

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use atv_core::{BackoffSchedule, ConnectionState, KeyMapper, RemoteError, RemoteKey};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::status::StatusNotifier;
use crate::application::timing::Sleeper;

// ── Observable device state ───────────────────────────────────────────────────

/// Manufacturer and model reported by the TV.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub level: u32,
    pub max: u32,
    pub muted: bool,
}

/// State pushed by the TV over an established session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUpdate {
    DeviceInfo(DeviceInfo),
    PowerState(bool),
    CurrentApp(String),
    Volume(VolumeInfo),
    /// `false` when the link dropped, `true` once it is re-established.
    Availability(bool),
}

/// Snapshot of everything the TV has told us.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteStatus {
    pub device_info: Option<DeviceInfo>,
    pub is_on: Option<bool>,
    pub current_app: Option<String>,
    pub volume: Option<VolumeInfo>,
}

// ── Ports ─────────────────────────────────────────────────────────────────────

/// One TV's protocol session.
///
/// Implementations classify every failure into [`RemoteError`]:
/// a rejected certificate is `InvalidCredential`, a rejected code is
/// `InvalidPairingCode`, refused/unreachable is `CannotConnect`, a peer
/// hang-up is `ConnectionClosed`.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Whether a client credential is already on disk.
    fn has_credential(&self) -> bool;

    /// Makes sure a client credential exists.  Returns `true` if one was
    /// generated by this call.
    async fn ensure_credential(&self) -> Result<bool, RemoteError>;

    /// Opens the pairing channel and runs the exchange up to the point where
    /// the TV displays its code.
    async fn start_pairing(&self) -> Result<(), RemoteError>;

    /// Submits a code.  On `InvalidPairingCode` the session stays ready for
    /// another code.
    async fn finish_pairing(&self, code: &str) -> Result<(), RemoteError>;

    /// Opens the remote-control channel.
    async fn connect(&self) -> Result<(), RemoteError>;

    /// Enables automatic reconnection after the link drops.
    fn keep_reconnecting(&self);

    /// Sends one key press by canonical key name.
    async fn send_key(&self, key_name: &str) -> Result<(), RemoteError>;

    /// Subscribes to state pushed by the TV.
    fn updates(&self) -> broadcast::Receiver<RemoteUpdate>;

    /// Closes every channel and stops reconnecting.  Idempotent.
    async fn disconnect(&self);
}

/// Creates sessions for a TV address.
pub trait RemoteConnector: Send + Sync {
    fn open(&self, address: &str) -> Arc<dyn RemoteSession>;
}

/// Supplies the code shown on the TV.
///
/// The `(code, confirmed)` shape is part of the pairing contract:
/// `confirmed == false` means the user cancelled, regardless of `code`.
#[async_trait]
pub trait CodeProvider: Send + Sync {
    async fn provide_code(&self) -> (String, bool);
}

/// Adapts a closure into a [`CodeProvider`].
pub struct FnCodeProvider<F>(pub F);

#[async_trait]
impl<F> CodeProvider for FnCodeProvider<F>
where
    F: Fn() -> (String, bool) + Send + Sync,
{
    async fn provide_code(&self) -> (String, bool) {
        (self.0)()
    }
}

// ── Policy ────────────────────────────────────────────────────────────────────

/// Attempt bounds and delay tables.
#[derive(Debug, Clone)]
pub struct PairingPolicy {
    /// Codes the user may enter before pairing fails.
    pub code_attempts: u32,
    /// Connect attempts after pairing.
    pub connect_retries: u32,
    /// Delay after the TV rejects the credential.
    pub auth_backoff: BackoffSchedule,
    /// Delay after a network failure.
    pub transport_backoff: BackoffSchedule,
}

impl Default for PairingPolicy {
    fn default() -> Self {
        Self {
            code_attempts: 3,
            connect_retries: 3,
            auth_backoff: BackoffSchedule::fixed(std::time::Duration::from_secs(1)),
            transport_backoff: BackoffSchedule::fixed(std::time::Duration::from_secs(2)),
        }
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

struct ActiveSession {
    address: String,
    session: Arc<dyn RemoteSession>,
    listener: JoinHandle<()>,
}

/// The TLS remote controller.
///
/// Holds at most one session.  `pair` and `connect` tear down any existing
/// session before starting.
pub struct TlsRemoteController {
    connector: Arc<dyn RemoteConnector>,
    sleeper: Arc<dyn Sleeper>,
    policy: PairingPolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    status: Arc<RwLock<RemoteStatus>>,
    notifier: Arc<StatusNotifier>,
    active: Mutex<Option<ActiveSession>>,
    /// One in-flight command per controller.
    command_lock: Mutex<()>,
}

impl TlsRemoteController {
    pub fn new(connector: Arc<dyn RemoteConnector>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self::with_policy(connector, sleeper, PairingPolicy::default())
    }

    pub fn with_policy(
        connector: Arc<dyn RemoteConnector>,
        sleeper: Arc<dyn Sleeper>,
        policy: PairingPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            sleeper,
            policy,
            state: Arc::new(state),
            status: Arc::new(RwLock::new(RemoteStatus::default())),
            notifier: Arc::new(StatusNotifier::new()),
            active: Mutex::new(None),
            command_lock: Mutex::new(()),
        }
    }

    // ── Observation ───────────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn notifier(&self) -> &StatusNotifier {
        &self.notifier
    }

    pub fn status(&self) -> RemoteStatus {
        self.status.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.status().device_info
    }

    pub fn is_on(&self) -> Option<bool> {
        self.status().is_on
    }

    pub fn current_app(&self) -> Option<String> {
        self.status().current_app
    }

    pub fn volume_info(&self) -> Option<VolumeInfo> {
        self.status().volume
    }

    /// Address of the current session, if any.
    pub async fn connected_address(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|a| a.address.clone())
    }

    // ── Operations ────────────────────────────────────────────────────────────

    /// Pairs with the TV at `address` and connects.
    ///
    /// # Errors
    ///
    /// - [`RemoteError::PairingCancelled`] if the provider returned
    ///   `confirmed == false`; no code was submitted for that round.
    /// - [`RemoteError::InvalidPairingCode`] after `code_attempts` rejected codes.
    /// - [`RemoteError::CredentialIo`] if the certificate could not be
    ///   created or read.
    /// - The last connect error once `connect_retries` are exhausted.
    pub async fn pair(&self, address: &str, codes: &dyn CodeProvider) -> Result<(), RemoteError> {
        self.teardown().await;
        info!("pairing with {address}");

        let session = self.connector.open(address);
        let updates = session.updates();

        let result = async {
            self.prepare_credential(session.as_ref()).await?;
            self.exchange_code(session.as_ref(), codes).await?;
            self.connect_with_retry(session.as_ref(), Some(codes)).await
        }
        .await;

        self.finish(address, session, updates, result, "Pairing failed").await
    }

    /// Connects to an already-paired TV without running the code exchange.
    ///
    /// # Errors
    ///
    /// Returns the last connect error once `connect_retries` are exhausted.
    /// A rejected credential is not re-paired here; call [`Self::pair`].
    pub async fn connect(&self, address: &str) -> Result<(), RemoteError> {
        self.teardown().await;
        info!("connecting to {address}");

        let session = self.connector.open(address);
        let updates = session.updates();

        let result = async {
            self.prepare_credential(session.as_ref()).await?;
            self.set_state(ConnectionState::Connecting);
            self.connect_with_retry(session.as_ref(), None).await
        }
        .await;

        self.finish(address, session, updates, result, "Connection failed").await
    }

    /// Tears down the session, whatever the current state.  Idempotent.
    pub async fn disconnect(&self) {
        let was_up = self.teardown().await;
        self.set_state(ConnectionState::Disconnected);
        if was_up {
            info!("disconnected");
            self.notifier.notify(false, "Disconnected");
        }
    }

    /// Sends a key by name.
    ///
    /// # Errors
    ///
    /// [`RemoteError::UnknownKey`] without any I/O for unrecognised names,
    /// [`RemoteError::NotConnected`] when no session is up.
    pub async fn send_key(&self, key_name: &str) -> Result<(), RemoteError> {
        let key = RemoteKey::from_name(key_name)
            .ok_or_else(|| RemoteError::UnknownKey(key_name.to_string()))?;
        self.send(key).await
    }

    /// Sends a key.
    ///
    /// # Errors
    ///
    /// [`RemoteError::NotConnected`] when not in the `Connected` state.
    pub async fn send(&self, key: RemoteKey) -> Result<(), RemoteError> {
        let _guard = self.command_lock.lock().await;

        let session = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(a) if self.state().is_connected() => Arc::clone(&a.session),
                _ => return Err(RemoteError::NotConnected),
            }
        };
        debug!("sending {key}");
        session.send_key(KeyMapper::to_remote_key_name(key)).await
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("state {previous} -> {next}");
        }
    }

    /// Drops the current session.  Returns `true` if there was one.
    /// Generates the client credential if it is missing; the state only
    /// shows `GeneratingCredential` while that actually happens.
    async fn prepare_credential(&self, session: &dyn RemoteSession) -> Result<(), RemoteError> {
        if !session.has_credential() {
            self.set_state(ConnectionState::GeneratingCredential);
        }
        if session.ensure_credential().await? {
            info!("generated a new client credential");
        }
        Ok(())
    }

    async fn teardown(&self) -> bool {
        let previous = self.active.lock().await.take();
        if let Ok(mut status) = self.status.write() {
            *status = RemoteStatus::default();
        }
        match previous {
            Some(active) => {
                active.listener.abort();
                active.session.disconnect().await;
                true
            }
            None => false,
        }
    }

    async fn exchange_code(
        &self,
        session: &dyn RemoteSession,
        codes: &dyn CodeProvider,
    ) -> Result<(), RemoteError> {
        self.set_state(ConnectionState::Pairing);
        session.start_pairing().await?;

        let mut last_error = RemoteError::InvalidPairingCode("no code entered".into());
        for attempt in 1..=self.policy.code_attempts {
            let (code, confirmed) = codes.provide_code().await;
            if !confirmed {
                info!("pairing cancelled by user");
                return Err(RemoteError::PairingCancelled);
            }
            match session.finish_pairing(&code).await {
                Ok(()) => {
                    info!("pairing code accepted");
                    return Ok(());
                }
                Err(e @ RemoteError::InvalidPairingCode(_)) => {
                    warn!(
                        "pairing code rejected (attempt {attempt}/{}): {e}",
                        self.policy.code_attempts
                    );
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    async fn connect_with_retry(
        &self,
        session: &dyn RemoteSession,
        codes: Option<&dyn CodeProvider>,
    ) -> Result<(), RemoteError> {
        let retries = self.policy.connect_retries.max(1);
        let mut last_error = RemoteError::Unknown("no connect attempt made".into());

        for attempt in 0..retries {
            self.set_state(ConnectionState::Connecting);
            let is_last = attempt + 1 == retries;

            match session.connect().await {
                Ok(()) => return Ok(()),
                Err(e @ RemoteError::InvalidCredential(_)) => {
                    warn!("credential rejected (attempt {}/{retries}): {e}", attempt + 1);
                    last_error = e;
                    if is_last {
                        break;
                    }
                    if let Some(codes) = codes {
                        self.exchange_code(session, codes).await?;
                    }
                    self.sleeper.sleep(self.policy.auth_backoff.delay_for(attempt)).await;
                }
                Err(e) if e.is_transient() || matches!(e, RemoteError::Timeout(_)) => {
                    warn!("connect failed (attempt {}/{retries}): {e}", attempt + 1);
                    last_error = e;
                    if !is_last {
                        self.sleeper
                            .sleep(self.policy.transport_backoff.delay_for(attempt))
                            .await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    /// Installs a successful session, or cleans up after a failed one.
    async fn finish(
        &self,
        address: &str,
        session: Arc<dyn RemoteSession>,
        updates: broadcast::Receiver<RemoteUpdate>,
        result: Result<(), RemoteError>,
        failure_prefix: &str,
    ) -> Result<(), RemoteError> {
        if let Err(e) = result {
            session.disconnect().await;
            let end_state = if e == RemoteError::PairingCancelled {
                ConnectionState::Disconnected
            } else {
                ConnectionState::Failed
            };
            warn!("{failure_prefix} for {address}: {e}");
            self.set_state(end_state);
            self.notifier.notify(false, &format!("{failure_prefix}: {e}"));
            return Err(e);
        }

        session.keep_reconnecting();
        let listener = tokio::spawn(listen(
            updates,
            Arc::clone(&self.status),
            Arc::clone(&self.state),
            Arc::clone(&self.notifier),
        ));
        *self.active.lock().await = Some(ActiveSession {
            address: address.to_string(),
            session,
            listener,
        });
        self.set_state(ConnectionState::Connected);
        info!("connected to {address}");
        self.notifier.notify(true, &format!("Connected to {address}"));
        Ok(())
    }
}

/// Mirrors pushed updates into the observable fields.
async fn listen(
    mut updates: broadcast::Receiver<RemoteUpdate>,
    status: Arc<RwLock<RemoteStatus>>,
    state: Arc<watch::Sender<ConnectionState>>,
    notifier: Arc<StatusNotifier>,
) {
    loop {
        let update = match updates.recv().await {
            Ok(u) => u,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("dropped {skipped} remote update(s)");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        apply_update(&status, &state, &notifier, update);
    }
}

fn apply_update(
    status: &RwLock<RemoteStatus>,
    state: &watch::Sender<ConnectionState>,
    notifier: &StatusNotifier,
    update: RemoteUpdate,
) {
    match update {
        RemoteUpdate::Availability(false) => {
            if *state.borrow() == ConnectionState::Connected {
                state.send_replace(ConnectionState::Reconnecting);
                warn!("connection lost, reconnecting");
                notifier.notify(false, "Connection lost, reconnecting");
            }
        }
        RemoteUpdate::Availability(true) => {
            if *state.borrow() == ConnectionState::Reconnecting {
                state.send_replace(ConnectionState::Connected);
                info!("reconnected");
                notifier.notify(true, "Reconnected");
            }
        }
        other => {
            let Ok(mut s) = status.write() else { return };
            match other {
                RemoteUpdate::DeviceInfo(info) => s.device_info = Some(info),
                RemoteUpdate::PowerState(on) => s.is_on = Some(on),
                RemoteUpdate::CurrentApp(app) => s.current_app = Some(app),
                RemoteUpdate::Volume(v) => s.volume = Some(v),
                RemoteUpdate::Availability(_) => {}
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
