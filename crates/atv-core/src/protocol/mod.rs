//! Wire formats: the BLE HID report and the TLS remote protocol messages.

pub mod framing;
pub mod hid_report;
pub mod pairing;
pub mod remote;

pub use framing::{decode_frame, encode_frame, ProtocolError};
pub use hid_report::{ConsumerReport, RELEASE_REPORT};
