//! Infrastructure layer for the remote.
//!
//! Contains OS-facing adapters: Bluetooth LE, mDNS and TLS sockets,
//! file-system storage, and the command bridge a UI calls into.
//!
//! **Dependency rule**: this layer may depend on `application` and `atv_core`,
//! but MUST NOT be imported by the `application` or domain layers.

pub mod bluetooth;
pub mod network;
pub mod storage;
pub mod ui_bridge;
