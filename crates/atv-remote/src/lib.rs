//! atv-remote library entry point.
//!
//! Re-exports the module tree so that integration tests in `tests/` and the
//! headless binary in `main.rs` drive the same code.

pub mod application;
pub mod infrastructure;
