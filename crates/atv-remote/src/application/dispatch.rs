//! CommandDispatcher: route logical key names to the active transport.
//!
//! The dispatcher knows two sinks, one per [`Transport`].  The last transport
//! that connected becomes the active one; sending a key parses the name once,
//! then hands the typed [`RemoteKey`] to that sink, which applies its own
//! wire encoding:
//!
//! | Transport | Encoding                                   |
//! |-----------|--------------------------------------------|
//! | Network   | key name string, e.g. `"VOLUME_UP"`        |
//! | Bluetooth | 16-bit HID Consumer usage, e.g. `0x00E9`   |
//!
//! `PAIR` is not special here; over BLE the TV firmware interprets it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use atv_core::{KeyMapper, RemoteError, RemoteKey};
use tracing::debug;

use crate::application::ble_connection::BleConnectionManager;
use crate::application::manage_devices::Transport;
use crate::application::pair_remote::TlsRemoteController;

/// The transport-specific form of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireCommand {
    KeyName(&'static str),
    HidUsage(u16),
}

impl WireCommand {
    pub fn encode(key: RemoteKey, transport: Transport) -> Self {
        match transport {
            Transport::Network => WireCommand::KeyName(KeyMapper::to_remote_key_name(key)),
            Transport::Bluetooth => WireCommand::HidUsage(KeyMapper::to_consumer_usage(key).as_u16()),
        }
    }
}

/// Something keys can be sent to.
#[async_trait]
pub trait KeySink: Send + Sync {
    fn is_connected(&self) -> bool;
    async fn send(&self, key: RemoteKey) -> Result<(), RemoteError>;
}

#[async_trait]
impl KeySink for TlsRemoteController {
    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    async fn send(&self, key: RemoteKey) -> Result<(), RemoteError> {
        TlsRemoteController::send(self, key).await
    }
}

#[async_trait]
impl KeySink for BleConnectionManager {
    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    async fn send(&self, key: RemoteKey) -> Result<(), RemoteError> {
        BleConnectionManager::send(self, key).await
    }
}

pub struct CommandDispatcher {
    sinks: HashMap<Transport, Arc<dyn KeySink>>,
    active: RwLock<Option<Transport>>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self {
            sinks: HashMap::new(),
            active: RwLock::new(None),
        }
    }

    pub fn with_sink(mut self, transport: Transport, sink: Arc<dyn KeySink>) -> Self {
        self.sinks.insert(transport, sink);
        self
    }

    /// Makes `transport` the target for subsequent keys.
    pub fn select(&self, transport: Transport) {
        if let Ok(mut active) = self.active.write() {
            *active = Some(transport);
        }
    }

    pub fn active(&self) -> Option<Transport> {
        self.active.read().ok().and_then(|a| *a)
    }

    /// Sends `key_name` to the active transport.
    ///
    /// # Errors
    ///
    /// [`RemoteError::UnknownKey`] before any I/O for unrecognised names,
    /// [`RemoteError::NotConnected`] when no transport is selected and none
    /// is connected, or whatever the sink returns.
    pub async fn dispatch(&self, key_name: &str) -> Result<(), RemoteError> {
        let key = RemoteKey::from_name(key_name)
            .ok_or_else(|| RemoteError::UnknownKey(key_name.to_string()))?;
        let (transport, sink) = self.target().ok_or(RemoteError::NotConnected)?;
        debug!("dispatch {key} as {:?}", WireCommand::encode(key, transport));
        sink.send(key).await
    }

    fn target(&self) -> Option<(Transport, Arc<dyn KeySink>)> {
        if let Some(t) = self.active() {
            return self.sinks.get(&t).map(|s| (t, Arc::clone(s)));
        }
        self.sinks
            .iter()
            .find(|(_, s)| s.is_connected())
            .map(|(t, s)| (*t, Arc::clone(s)))
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        connected: bool,
        keys: Mutex<Vec<RemoteKey>>,
    }

    #[async_trait]
    impl KeySink for RecordingSink {
        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn send(&self, key: RemoteKey) -> Result<(), RemoteError> {
            self.keys.lock().unwrap().push(key);
            Ok(())
        }
    }

    #[test]
    fn test_encode_uses_usage_table_for_bluetooth_and_names_for_network() {
        assert_eq!(
            WireCommand::encode(RemoteKey::Home, Transport::Bluetooth),
            WireCommand::HidUsage(0x223)
        );
        assert_eq!(
            WireCommand::encode(RemoteKey::VolumeMute, Transport::Network),
            WireCommand::KeyName("VOLUME_MUTE")
        );
        assert_eq!(
            WireCommand::encode(RemoteKey::Pair, Transport::Bluetooth),
            WireCommand::HidUsage(0x225)
        );
    }

    #[tokio::test]
    async fn test_dispatch_goes_to_selected_transport() {
        // Arrange
        let net = Arc::new(RecordingSink { connected: true, ..Default::default() });
        let ble = Arc::new(RecordingSink { connected: true, ..Default::default() });
        let dispatcher = CommandDispatcher::new()
            .with_sink(Transport::Network, net.clone())
            .with_sink(Transport::Bluetooth, ble.clone());
        dispatcher.select(Transport::Bluetooth);

        // Act
        dispatcher.dispatch("dpad_up").await.unwrap();

        // Assert
        assert_eq!(*ble.keys.lock().unwrap(), vec![RemoteKey::DpadUp]);
        assert!(net.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_falls_back_to_connected_sink() {
        let net = Arc::new(RecordingSink { connected: true, ..Default::default() });
        let ble = Arc::new(RecordingSink::default());
        let dispatcher = CommandDispatcher::new()
            .with_sink(Transport::Network, net.clone())
            .with_sink(Transport::Bluetooth, ble);

        dispatcher.dispatch("HOME").await.unwrap();

        assert_eq!(*net.keys.lock().unwrap(), vec![RemoteKey::Home]);
    }

    #[tokio::test]
    async fn test_unknown_key_reaches_no_sink() {
        let net = Arc::new(RecordingSink { connected: true, ..Default::default() });
        let dispatcher = CommandDispatcher::new().with_sink(Transport::Network, net.clone());

        let result = dispatcher.dispatch("SELF_DESTRUCT").await;

        assert_eq!(result, Err(RemoteError::UnknownKey("SELF_DESTRUCT".into())));
        assert!(net.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_connected_is_not_connected() {
        let dispatcher =
            CommandDispatcher::new().with_sink(Transport::Network, Arc::new(RecordingSink::default()));
        assert_eq!(dispatcher.dispatch("HOME").await, Err(RemoteError::NotConnected));
    }
}
