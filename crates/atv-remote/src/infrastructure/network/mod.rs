//! Network infrastructure for the remote.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Browses mDNS for Android TV service instances and
//!   forwards resolved IPv4 addresses to the discovery use case.
//!
//! - **`credential`** – Generates, persists and loads the client certificate
//!   the TV uses to recognise this remote.
//!
//! - **`tls_remote`** – The remote protocol itself: the pairing exchange on
//!   port 6467 and the long-lived command channel on port 6466.
//!
//! - **`mock`** – Scriptable fakes of the ports above, for tests.

pub mod credential;
pub mod discovery;
pub mod mock;
pub mod tls_remote;
