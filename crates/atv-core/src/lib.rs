//! # atv-core
//!
//! Shared library for the Android TV remote containing the logical key
//! table, both transports' wire formats, the discovered-device model with
//! quality scoring, connection state and retry tables, and the error
//! taxonomy.
//!
//! It has zero dependencies on Bluetooth stacks, sockets, TLS or async
//! runtimes.
//!
//! # Architecture overview (for beginners)
//!
//! The remote controls an Android TV over one of two transports:
//!
//! - **TLS**: the TV is found with mDNS, paired once with a code shown on
//!   screen, then driven over a long-lived TLS connection.
//! - **BLE**: the TV is found with a Bluetooth scan and driven by writing
//!   HID Consumer Control reports, the same bytes a physical remote sends.
//!
//! This crate (`atv-core`) is the shared foundation:
//!
//! - **`keymap`** – The closed set of [`RemoteKey`]s and their encodings:
//!   HID consumer usages for BLE and Android keycodes for TLS.
//!
//! - **`protocol`** – The 3-byte HID report, varint framing, and the
//!   protobuf messages for pairing and the remote channel.
//!
//! - **`domain`** – Device scoring and deduplication, connection state,
//!   attempt history, backoff tables, and [`RemoteError`].

pub mod domain;
pub mod keymap;
pub mod protocol;

pub use domain::connection::{
    BackoffSchedule, ConnectionAttemptHistory, ConnectionState, TimeoutRamp,
};
pub use domain::device::{DeviceMetadata, DeviceTable, DiscoveredDevice};
pub use domain::error::{PairingFailure, RemoteError};
pub use domain::gatt::{GattCharacteristic, GattService, ReportTarget};
pub use keymap::{ConsumerUsage, KeyMapper, RemoteKey};
pub use protocol::{ConsumerReport, ProtocolError};
