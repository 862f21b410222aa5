//! Logical remote keys and their transport-specific encodings.
//!
//! Every command the remote can issue is one of the closed set of
//! [`RemoteKey`] variants.  Each transport has its own wire encoding:
//!
//! - **BLE**: a HID Consumer Control usage code ([`consumer::ConsumerUsage`]).
//! - **TLS**: an Android keycode ([`android::keycode_for`]) injected through
//!   the remote protocol.
//!
//! [`KeyMapper`] is the single place that performs these translations.

pub mod android;
pub mod consumer;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::RemoteError;

pub use consumer::ConsumerUsage;

/// Logical remote-control key, independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteKey {
    Power,
    Home,
    Back,
    Menu,
    VolumeUp,
    VolumeDown,
    VolumeMute,
    ChannelUp,
    ChannelDown,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    DpadCenter,
    PlayPause,
    Stop,
    FastForward,
    Rewind,
    /// Asks an already-connected TV to enter pairing mode.
    Pair,
}

impl RemoteKey {
    /// Every key, in the order the UI lays them out.
    pub const ALL: &'static [RemoteKey] = &[
        RemoteKey::Power,
        RemoteKey::Home,
        RemoteKey::Back,
        RemoteKey::Menu,
        RemoteKey::VolumeUp,
        RemoteKey::VolumeDown,
        RemoteKey::VolumeMute,
        RemoteKey::ChannelUp,
        RemoteKey::ChannelDown,
        RemoteKey::DpadUp,
        RemoteKey::DpadDown,
        RemoteKey::DpadLeft,
        RemoteKey::DpadRight,
        RemoteKey::DpadCenter,
        RemoteKey::PlayPause,
        RemoteKey::Stop,
        RemoteKey::FastForward,
        RemoteKey::Rewind,
        RemoteKey::Pair,
    ];

    /// Canonical upper-case name, e.g. `"VOLUME_UP"`.
    pub fn name(self) -> &'static str {
        match self {
            RemoteKey::Power => "POWER",
            RemoteKey::Home => "HOME",
            RemoteKey::Back => "BACK",
            RemoteKey::Menu => "MENU",
            RemoteKey::VolumeUp => "VOLUME_UP",
            RemoteKey::VolumeDown => "VOLUME_DOWN",
            RemoteKey::VolumeMute => "VOLUME_MUTE",
            RemoteKey::ChannelUp => "CHANNEL_UP",
            RemoteKey::ChannelDown => "CHANNEL_DOWN",
            RemoteKey::DpadUp => "DPAD_UP",
            RemoteKey::DpadDown => "DPAD_DOWN",
            RemoteKey::DpadLeft => "DPAD_LEFT",
            RemoteKey::DpadRight => "DPAD_RIGHT",
            RemoteKey::DpadCenter => "DPAD_CENTER",
            RemoteKey::PlayPause => "PLAY_PAUSE",
            RemoteKey::Stop => "STOP",
            RemoteKey::FastForward => "FAST_FORWARD",
            RemoteKey::Rewind => "REWIND",
            RemoteKey::Pair => "PAIR",
        }
    }

    /// Parses a key name case-insensitively.
    ///
    /// Accepts the canonical names plus the short alias `MUTE`.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        if upper == "MUTE" {
            return Some(RemoteKey::VolumeMute);
        }
        RemoteKey::ALL.iter().copied().find(|k| k.name() == upper)
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RemoteKey {
    type Err = RemoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RemoteKey::from_name(s).ok_or_else(|| RemoteError::UnknownKey(s.to_string()))
    }
}

/// Unified key mapper providing all translation directions.
pub struct KeyMapper;

impl KeyMapper {
    /// Returns the BLE Consumer Control usage for `key`.
    pub fn to_consumer_usage(key: RemoteKey) -> ConsumerUsage {
        match key {
            RemoteKey::Power => ConsumerUsage::Power,
            RemoteKey::Home => ConsumerUsage::Home,
            RemoteKey::Back => ConsumerUsage::Back,
            RemoteKey::Menu => ConsumerUsage::Menu,
            RemoteKey::VolumeUp => ConsumerUsage::VolumeUp,
            RemoteKey::VolumeDown => ConsumerUsage::VolumeDown,
            RemoteKey::VolumeMute => ConsumerUsage::Mute,
            RemoteKey::ChannelUp => ConsumerUsage::ChannelUp,
            RemoteKey::ChannelDown => ConsumerUsage::ChannelDown,
            RemoteKey::DpadUp => ConsumerUsage::DpadUp,
            RemoteKey::DpadDown => ConsumerUsage::DpadDown,
            RemoteKey::DpadLeft => ConsumerUsage::DpadLeft,
            RemoteKey::DpadRight => ConsumerUsage::DpadRight,
            RemoteKey::DpadCenter => ConsumerUsage::DpadCenter,
            RemoteKey::PlayPause => ConsumerUsage::PlayPause,
            RemoteKey::Stop => ConsumerUsage::Stop,
            RemoteKey::FastForward => ConsumerUsage::FastForward,
            RemoteKey::Rewind => ConsumerUsage::Rewind,
            RemoteKey::Pair => ConsumerUsage::Pair,
        }
    }

    /// Returns the key name sent over the TLS transport.
    pub fn to_remote_key_name(key: RemoteKey) -> &'static str {
        key.name()
    }

    /// Returns the Android keycode injected over the TLS transport.
    pub fn to_android_keycode(key: RemoteKey) -> i32 {
        android::keycode_for(key)
    }
}
