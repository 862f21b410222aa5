//! Domain entities for the Android TV remote.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of the design.  Domain code holds the rules that make
//! this system what it is (how a discovered device is scored, which errors
//! are worth retrying, how long to wait between attempts) and has no imports
//! from Bluetooth stacks, sockets, TLS libraries or UI frameworks.  It can be
//! compiled and unit-tested anywhere.
//!
//! Outer layers (`atv-remote`'s application and infrastructure modules)
//! depend on these types; the domain never depends on them.

/// Connection state, attempt history and backoff tables.
pub mod connection;
/// Discovered devices, quality scoring and deduplication.
pub mod device;
/// Error taxonomy shared by every component.
pub mod error;
/// GATT model and report-characteristic resolution.
pub mod gatt;
