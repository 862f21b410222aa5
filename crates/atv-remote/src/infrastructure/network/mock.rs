//! Scriptable fakes for the network ports.
//!
//! Lets the discovery and pairing use cases run without multicast sockets,
//! TLS, or a TV on the LAN.  Every fake records what it was asked to do so
//! tests can assert on call counts and arguments.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use atv_core::{ConnectionState, RemoteError};
use tokio::sync::{broadcast, mpsc, watch};

use crate::application::network_discovery::{ResolvedService, ServiceBrowser};
use crate::application::pair_remote::{CodeProvider, RemoteConnector, RemoteSession, RemoteUpdate};

// ── Service browser ───────────────────────────────────────────────────────────

/// A [`ServiceBrowser`] that replays a fixed set of resolved services.
///
/// The stream stays open until `stop()`, like a real browse that simply
/// finds nothing more.
pub struct MockServiceBrowser {
    results: Vec<ResolvedService>,
    failure: Option<String>,
    sender: Mutex<Option<mpsc::Sender<ResolvedService>>>,
    started_with: Mutex<Vec<String>>,
    stop_count: Mutex<u32>,
}

impl MockServiceBrowser {
    pub fn with_results(results: Vec<ResolvedService>) -> Self {
        Self {
            results,
            failure: None,
            sender: Mutex::new(None),
            started_with: Mutex::new(Vec::new()),
            stop_count: Mutex::new(0),
        }
    }

    /// Finds nothing.
    pub fn silent() -> Self {
        Self::with_results(Vec::new())
    }

    /// `start()` fails with [`RemoteError::TransportUnavailable`].
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::silent()
        }
    }

    pub fn stop_count(&self) -> u32 {
        *self.stop_count.lock().expect("lock poisoned")
    }

    /// Service types passed to the most recent `start()`.
    pub fn started_with(&self) -> Vec<String> {
        self.started_with.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ServiceBrowser for MockServiceBrowser {
    async fn start(
        &self,
        service_types: &[String],
    ) -> Result<mpsc::Receiver<ResolvedService>, RemoteError> {
        *self.started_with.lock().expect("lock poisoned") = service_types.to_vec();
        if let Some(reason) = &self.failure {
            return Err(RemoteError::TransportUnavailable(reason.clone()));
        }

        let (tx, rx) = mpsc::channel(self.results.len().max(1));
        for result in &self.results {
            let _ = tx.try_send(result.clone());
        }
        *self.sender.lock().expect("lock poisoned") = Some(tx);
        Ok(rx)
    }

    async fn stop(&self) {
        *self.sender.lock().expect("lock poisoned") = None;
        *self.stop_count.lock().expect("lock poisoned") += 1;
    }
}

// ── Remote session ────────────────────────────────────────────────────────────

#[derive(Default)]
struct SessionLog {
    finish_script: VecDeque<Result<(), RemoteError>>,
    connect_script: VecDeque<Result<(), RemoteError>>,
    credential_failure: Option<RemoteError>,
    credential_missing: bool,
    state_probe: Option<watch::Receiver<ConnectionState>>,
    states_at_credential: Vec<ConnectionState>,
    submitted_codes: Vec<String>,
    sent_keys: Vec<String>,
    start_pairing_calls: u32,
    connect_calls: u32,
    disconnect_calls: u32,
    keep_reconnecting: bool,
}

/// A [`RemoteSession`] whose pairing and connect outcomes are scripted.
///
/// Unscripted calls succeed.  Pushed [`RemoteUpdate`]s are delivered to
/// every receiver obtained from `updates()`.
pub struct MockRemoteSession {
    log: Mutex<SessionLog>,
    updates: broadcast::Sender<RemoteUpdate>,
}

impl MockRemoteSession {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(32);
        Self {
            log: Mutex::new(SessionLog::default()),
            updates,
        }
    }

    /// Outcomes for successive `finish_pairing` calls.
    pub fn script_finish_pairing(&self, outcomes: Vec<Result<(), RemoteError>>) {
        self.log.lock().expect("lock poisoned").finish_script = outcomes.into();
    }

    /// Outcomes for successive `connect` calls.
    pub fn script_connect(&self, outcomes: Vec<Result<(), RemoteError>>) {
        self.log.lock().expect("lock poisoned").connect_script = outcomes.into();
    }

    /// Makes `ensure_credential` fail with `error`.
    pub fn fail_credential(&self, error: RemoteError) {
        self.log.lock().expect("lock poisoned").credential_failure = Some(error);
    }

    /// Starts with no credential on disk; the first `ensure_credential`
    /// generates one.
    pub fn without_credential(self) -> Self {
        self.log.lock().expect("lock poisoned").credential_missing = true;
        self
    }

    /// Records the controller state each time `ensure_credential` runs.
    pub fn track_state(&self, state: watch::Receiver<ConnectionState>) {
        self.log.lock().expect("lock poisoned").state_probe = Some(state);
    }

    pub fn states_at_credential(&self) -> Vec<ConnectionState> {
        self.log.lock().expect("lock poisoned").states_at_credential.clone()
    }

    /// Simulates the TV pushing a state change.
    pub fn push(&self, update: RemoteUpdate) {
        let _ = self.updates.send(update);
    }

    pub fn submitted_codes(&self) -> Vec<String> {
        self.log.lock().expect("lock poisoned").submitted_codes.clone()
    }

    pub fn sent_keys(&self) -> Vec<String> {
        self.log.lock().expect("lock poisoned").sent_keys.clone()
    }

    pub fn start_pairing_calls(&self) -> u32 {
        self.log.lock().expect("lock poisoned").start_pairing_calls
    }

    pub fn connect_calls(&self) -> u32 {
        self.log.lock().expect("lock poisoned").connect_calls
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.log.lock().expect("lock poisoned").disconnect_calls
    }

    pub fn keep_reconnecting_enabled(&self) -> bool {
        self.log.lock().expect("lock poisoned").keep_reconnecting
    }
}

impl Default for MockRemoteSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSession for MockRemoteSession {
    fn has_credential(&self) -> bool {
        !self.log.lock().expect("lock poisoned").credential_missing
    }

    async fn ensure_credential(&self) -> Result<bool, RemoteError> {
        let mut log = self.log.lock().expect("lock poisoned");
        if let Some(state) = log.state_probe.as_ref().map(|rx| *rx.borrow()) {
            log.states_at_credential.push(state);
        }
        if let Some(e) = &log.credential_failure {
            return Err(e.clone());
        }
        Ok(std::mem::take(&mut log.credential_missing))
    }

    async fn start_pairing(&self) -> Result<(), RemoteError> {
        self.log.lock().expect("lock poisoned").start_pairing_calls += 1;
        Ok(())
    }

    async fn finish_pairing(&self, code: &str) -> Result<(), RemoteError> {
        let mut log = self.log.lock().expect("lock poisoned");
        log.submitted_codes.push(code.to_string());
        log.finish_script.pop_front().unwrap_or(Ok(()))
    }

    async fn connect(&self) -> Result<(), RemoteError> {
        let mut log = self.log.lock().expect("lock poisoned");
        log.connect_calls += 1;
        log.connect_script.pop_front().unwrap_or(Ok(()))
    }

    fn keep_reconnecting(&self) {
        self.log.lock().expect("lock poisoned").keep_reconnecting = true;
    }

    async fn send_key(&self, key_name: &str) -> Result<(), RemoteError> {
        self.log
            .lock()
            .expect("lock poisoned")
            .sent_keys
            .push(key_name.to_string());
        Ok(())
    }

    fn updates(&self) -> broadcast::Receiver<RemoteUpdate> {
        self.updates.subscribe()
    }

    async fn disconnect(&self) {
        let mut log = self.log.lock().expect("lock poisoned");
        log.disconnect_calls += 1;
        log.keep_reconnecting = false;
    }
}

/// Hands out the same [`MockRemoteSession`] for every address.
pub struct MockRemoteConnector {
    session: Arc<MockRemoteSession>,
    opened: Mutex<Vec<String>>,
}

impl MockRemoteConnector {
    pub fn new(session: Arc<MockRemoteSession>) -> Self {
        Self {
            session,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().expect("lock poisoned").clone()
    }
}

impl RemoteConnector for MockRemoteConnector {
    fn open(&self, address: &str) -> Arc<dyn RemoteSession> {
        self.opened
            .lock()
            .expect("lock poisoned")
            .push(address.to_string());
        self.session.clone()
    }
}

// ── Code provider ─────────────────────────────────────────────────────────────

/// A [`CodeProvider`] that answers from a script, as a user typing codes.
pub struct ScriptedCodes {
    answers: Mutex<VecDeque<(String, bool)>>,
    repeat: Option<String>,
    calls: Mutex<u32>,
}

impl ScriptedCodes {
    /// Each entry is `(code, confirmed)`; once exhausted the user cancels.
    pub fn new(answers: &[(&str, bool)]) -> Self {
        Self {
            answers: Mutex::new(
                answers
                    .iter()
                    .map(|(code, ok)| (code.to_string(), *ok))
                    .collect(),
            ),
            repeat: None,
            calls: Mutex::new(0),
        }
    }

    /// Confirms `code` every time it is asked.
    pub fn repeating(code: &str) -> Self {
        Self {
            repeat: Some(code.to_string()),
            ..Self::new(&[])
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().expect("lock poisoned")
    }
}

#[async_trait]
impl CodeProvider for ScriptedCodes {
    async fn provide_code(&self) -> (String, bool) {
        *self.calls.lock().expect("lock poisoned") += 1;
        if let Some(code) = &self.repeat {
            return (code.clone(), true);
        }
        self.answers
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or_else(|| (String::new(), false))
    }
}
