//! Android `KeyEvent` keycodes used by the TLS remote protocol.
//!
//! The network remote does not speak HID.  It injects Android keycodes
//! directly (`KEYCODE_HOME = 3`, `KEYCODE_VOLUME_UP = 24`, ...), the same
//! values found in `android.view.KeyEvent`.

use super::RemoteKey;

/// Returns the Android keycode for `key`.
pub fn keycode_for(key: RemoteKey) -> i32 {
    match key {
        RemoteKey::Home => 3,
        RemoteKey::Back => 4,
        RemoteKey::DpadUp => 19,
        RemoteKey::DpadDown => 20,
        RemoteKey::DpadLeft => 21,
        RemoteKey::DpadRight => 22,
        RemoteKey::DpadCenter => 23,
        RemoteKey::VolumeUp => 24,
        RemoteKey::VolumeDown => 25,
        RemoteKey::Power => 26,
        RemoteKey::Menu => 82,
        RemoteKey::PlayPause => 85,
        RemoteKey::Stop => 86,
        RemoteKey::Rewind => 89,
        RemoteKey::FastForward => 90,
        RemoteKey::VolumeMute => 164,
        RemoteKey::ChannelUp => 166,
        RemoteKey::ChannelDown => 167,
        RemoteKey::Pair => 225,
    }
}

/// Reverse lookup, used when logging keys echoed back by the TV.
pub fn key_for_keycode(code: i32) -> Option<RemoteKey> {
    RemoteKey::ALL.iter().copied().find(|k| keycode_for(*k) == code)
}
