//! Storage infrastructure: configuration and connection history files.
//!
//! - **`config`** reads and writes the TOML configuration in the platform
//!   config directory, falling back to defaults on first run.
//! - **`history`** keeps the JSON list of previously connected devices with
//!   their favorite flags.
//!
//! Both are thin adapters over the file system; nothing else in the crate
//! touches these files directly.

pub mod config;
pub mod history;
