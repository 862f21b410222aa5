//! Remote-control channel messages (port 6466).
//!
//! Once paired, the client holds a long-lived TLS connection over which the
//! TV pushes state (power, volume, foreground app) and the client injects
//! key presses.  Every frame is a [`RemoteMessage`] with exactly one field
//! set.
//!
//! Only the subset of the protocol this remote uses is declared; prost skips
//! unknown fields when decoding.

/// Feature bitmask this client advertises in `RemoteConfigure`.
pub const ACTIVE_FEATURES: i32 = 622;

/// Key direction: a complete press-and-release.
pub const DIRECTION_SHORT: i32 = 3;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoteDeviceInfo {
    #[prost(string, tag = "1")]
    pub model: String,
    #[prost(string, tag = "2")]
    pub vendor: String,
    #[prost(int32, tag = "3")]
    pub unknown1: i32,
    #[prost(string, tag = "4")]
    pub unknown2: String,
    #[prost(string, tag = "5")]
    pub package_name: String,
    #[prost(string, tag = "6")]
    pub app_version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoteConfigure {
    #[prost(int32, tag = "1")]
    pub code1: i32,
    #[prost(message, optional, tag = "2")]
    pub device_info: Option<RemoteDeviceInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoteSetActive {
    #[prost(int32, tag = "1")]
    pub active: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoteErrorReport {
    #[prost(bool, tag = "1")]
    pub value: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemotePingRequest {
    #[prost(int32, tag = "1")]
    pub val1: i32,
    #[prost(int32, tag = "2")]
    pub val2: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemotePingResponse {
    #[prost(int32, tag = "1")]
    pub val1: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoteKeyInject {
    #[prost(int32, tag = "1")]
    pub key_code: i32,
    #[prost(int32, tag = "2")]
    pub direction: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoteAppInfo {
    #[prost(int32, tag = "1")]
    pub counter: i32,
    #[prost(string, tag = "10")]
    pub label: String,
    #[prost(string, tag = "12")]
    pub app_package: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoteImeKeyInject {
    #[prost(message, optional, tag = "1")]
    pub app_info: Option<RemoteAppInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoteStart {
    #[prost(bool, tag = "1")]
    pub started: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoteSetVolumeLevel {
    #[prost(string, tag = "3")]
    pub player_model: String,
    #[prost(uint32, tag = "6")]
    pub volume_max: u32,
    #[prost(uint32, tag = "7")]
    pub volume_level: u32,
    #[prost(bool, tag = "8")]
    pub volume_muted: bool,
}

/// Envelope for every remote-channel frame.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoteMessage {
    #[prost(message, optional, tag = "1")]
    pub remote_configure: Option<RemoteConfigure>,
    #[prost(message, optional, tag = "2")]
    pub remote_set_active: Option<RemoteSetActive>,
    #[prost(message, optional, tag = "3")]
    pub remote_error: Option<RemoteErrorReport>,
    #[prost(message, optional, tag = "8")]
    pub remote_ping_request: Option<RemotePingRequest>,
    #[prost(message, optional, tag = "9")]
    pub remote_ping_response: Option<RemotePingResponse>,
    #[prost(message, optional, tag = "10")]
    pub remote_key_inject: Option<RemoteKeyInject>,
    #[prost(message, optional, tag = "20")]
    pub remote_ime_key_inject: Option<RemoteImeKeyInject>,
    #[prost(message, optional, tag = "40")]
    pub remote_start: Option<RemoteStart>,
    #[prost(message, optional, tag = "50")]
    pub remote_set_volume_level: Option<RemoteSetVolumeLevel>,
}

impl RemoteMessage {
    /// Reply to the TV's `RemoteConfigure`, announcing this client.
    pub fn configure(model: &str, vendor: &str, package_name: &str, app_version: &str) -> Self {
        Self {
            remote_configure: Some(RemoteConfigure {
                code1: ACTIVE_FEATURES,
                device_info: Some(RemoteDeviceInfo {
                    model: model.to_string(),
                    vendor: vendor.to_string(),
                    unknown1: 1,
                    unknown2: "1".to_string(),
                    package_name: package_name.to_string(),
                    app_version: app_version.to_string(),
                }),
            }),
            ..Default::default()
        }
    }

    pub fn set_active() -> Self {
        Self {
            remote_set_active: Some(RemoteSetActive {
                active: ACTIVE_FEATURES,
            }),
            ..Default::default()
        }
    }

    pub fn ping_response(val1: i32) -> Self {
        Self {
            remote_ping_response: Some(RemotePingResponse { val1 }),
            ..Default::default()
        }
    }

    /// A short key press of the Android keycode `key_code`.
    pub fn key_press(key_code: i32) -> Self {
        Self {
            remote_key_inject: Some(RemoteKeyInject {
                key_code,
                direction: DIRECTION_SHORT,
            }),
            ..Default::default()
        }
    }
}
