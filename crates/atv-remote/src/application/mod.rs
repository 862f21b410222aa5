//! Application layer use cases for the remote.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `atv-core`) and the infrastructure (sockets, Bluetooth,
//! files).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a user goal (e.g., "pair with
//!   the TV at 192.168.1.20").
//! - **Depend on abstractions** (traits such as [`pair_remote::RemoteSession`]
//!   or [`ble_connection::BleCentral`]) rather than concrete implementations,
//!   so tests can swap in recording fakes.
//! - **Contain no direct I/O**: every sleep goes through
//!   [`timing::Sleeper`] so retry timing is testable.
//!
//! # Sub-modules
//!
//! - **`network_discovery`** – mDNS browse for Android TV endpoints.
//! - **`ble_discovery`**     – Multi-attempt BLE scan with quality ranking.
//! - **`pair_remote`**       – TLS pairing / connect / keep-alive state machine.
//! - **`ble_connection`**    – BLE GATT connect with retry and HID key writes.
//! - **`dispatch`**          – Routes logical key names to the active transport.
//! - **`manage_devices`**    – In-memory registry of discovered devices.
//! - **`status`**, **`capability`**, **`timing`** – shared seams.

pub mod ble_connection;
pub mod ble_discovery;
pub mod capability;
pub mod dispatch;
pub mod manage_devices;
pub mod network_discovery;
pub mod pair_remote;
pub mod status;
pub mod timing;
