//! Connection lifecycle state, attempt bookkeeping and retry delay tables.
//!
//! # Connection lifecycle (for beginners)
//!
//! Both controllers share one state enum but walk different paths through it.
//!
//! TLS remote:
//!
//! ```text
//! Disconnected ──► GeneratingCredential ──► Pairing ──► Connecting ──► Connected
//!                                                                        │  ▲
//!                                                                        ▼  │
//!                                                                    Reconnecting
//! ```
//!
//! BLE HID:
//!
//! ```text
//! Disconnected ──► Connecting ──► ServiceDiscovery ──► Connected
//! ```
//!
//! `Failed` is reachable from every TLS state on an unrecoverable error.  The
//! BLE controller never rests in `Failed`; a failed connect resolves back to
//! `Disconnected` with the reason reported through the status observer.
//! `disconnect()` always ends in `Disconnected`.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Current state of a controller's single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    /// Creating the client certificate on first use (TLS only).
    GeneratingCredential,
    /// Interactive code exchange in progress (TLS only).
    Pairing,
    Connecting,
    /// Enumerating GATT services (BLE only).
    ServiceDiscovery,
    Connected,
    /// The link dropped and the transport is re-establishing it (TLS only).
    Reconnecting,
    Failed,
}

impl ConnectionState {
    /// Returns `true` when commands may be sent.
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Returns `true` while a connect or pairing sequence is running.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            ConnectionState::GeneratingCredential
                | ConnectionState::Pairing
                | ConnectionState::Connecting
                | ConnectionState::ServiceDiscovery
        )
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Attempt history ───────────────────────────────────────────────────────────

/// Failed connection attempts per address, kept for the process lifetime.
///
/// Counters accumulate across separate connect calls and reset to zero on
/// the first success.  They are informational only; nothing trips a
/// circuit breaker on them.
#[derive(Debug, Default, Clone)]
pub struct ConnectionAttemptHistory {
    failures: HashMap<String, u32>,
}

impl ConnectionAttemptHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments and returns the failure counter for `address`.
    pub fn record_failure(&mut self, address: &str) -> u32 {
        let count = self.failures.entry(address.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn record_success(&mut self, address: &str) {
        self.failures.insert(address.to_string(), 0);
    }

    /// Failure count for `address`; zero for never-seen addresses.
    pub fn failures(&self, address: &str) -> u32 {
        self.failures.get(address).copied().unwrap_or(0)
    }

    /// Snapshot of every tracked address.
    pub fn snapshot(&self) -> HashMap<String, u32> {
        self.failures.clone()
    }

    /// Clears one address, or every address when `address` is `None`.
    pub fn reset(&mut self, address: Option<&str>) {
        match address {
            Some(addr) => {
                self.failures.remove(addr);
            }
            None => self.failures.clear(),
        }
    }
}

// ── Backoff tables ────────────────────────────────────────────────────────────

/// Delay table indexed by zero-based attempt number.
///
/// Attempts past the end of the table reuse the last entry, so a
/// single-entry table is a fixed backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    /// The same delay after every attempt.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delays: vec![delay],
        }
    }

    /// An explicit table.  An empty table means "no delay".
    pub fn from_table(delays: &[Duration]) -> Self {
        Self {
            delays: delays.to_vec(),
        }
    }

    /// Doubling delays `base, 2·base, 4·base, ...` for `len` entries.
    pub fn exponential(base: Duration, len: u32) -> Self {
        let delays = (0..len).map(|i| base * 2u32.saturating_pow(i)).collect();
        Self { delays }
    }

    /// Delay to wait after the attempt with index `attempt` fails.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).min(self.delays.len().saturating_sub(1));
        self.delays.get(idx).copied().unwrap_or(Duration::ZERO)
    }
}

/// Per-attempt connect timeout that grows linearly: `base + step × attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutRamp {
    pub base: Duration,
    pub step: Duration,
}

impl TimeoutRamp {
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        self.base + self.step * attempt
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_only_connected_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Reconnecting.is_connected());
        assert!(!ConnectionState::ServiceDiscovery.is_connected());
    }

    #[test]
    fn test_busy_states() {
        assert!(ConnectionState::Pairing.is_busy());
        assert!(ConnectionState::ServiceDiscovery.is_busy());
        assert!(!ConnectionState::Connected.is_busy());
        assert!(!ConnectionState::Failed.is_busy());
    }

    #[test]
    fn test_attempt_history_accumulates_and_resets_on_success() {
        // Arrange
        let mut history = ConnectionAttemptHistory::new();

        // Act
        history.record_failure("AA:BB");
        history.record_failure("AA:BB");
        let third = history.record_failure("AA:BB");

        // Assert
        assert_eq!(third, 3);
        assert_eq!(history.failures("AA:BB"), 3);

        history.record_success("AA:BB");
        assert_eq!(history.failures("AA:BB"), 0);
    }

    #[test]
    fn test_attempt_history_reset_single_and_all() {
        let mut history = ConnectionAttemptHistory::new();
        history.record_failure("A");
        history.record_failure("B");

        history.reset(Some("A"));
        assert_eq!(history.failures("A"), 0);
        assert_eq!(history.failures("B"), 1);

        history.reset(None);
        assert!(history.snapshot().is_empty());
    }

    #[test]
    fn test_fixed_backoff_repeats_delay() {
        let schedule = BackoffSchedule::fixed(Duration::from_secs(2));
        assert_eq!(schedule.delay_for(0), Duration::from_secs(2));
        assert_eq!(schedule.delay_for(7), Duration::from_secs(2));
    }

    #[test]
    fn test_exponential_backoff_doubles_then_clamps() {
        let schedule = BackoffSchedule::exponential(Duration::from_secs(1), 3);
        assert_eq!(schedule.delay_for(0), Duration::from_secs(1));
        assert_eq!(schedule.delay_for(1), Duration::from_secs(2));
        assert_eq!(schedule.delay_for(2), Duration::from_secs(4));
        assert_eq!(schedule.delay_for(9), Duration::from_secs(4));
    }

    #[test]
    fn test_empty_table_means_no_delay() {
        assert_eq!(BackoffSchedule::from_table(&[]).delay_for(0), Duration::ZERO);
    }

    #[test]
    fn test_timeout_ramp_grows_per_attempt() {
        let ramp = TimeoutRamp {
            base: Duration::from_secs(15),
            step: Duration::from_secs(5),
        };
        assert_eq!(ramp.timeout_for(0), Duration::from_secs(15));
        assert_eq!(ramp.timeout_for(2), Duration::from_secs(25));
    }
}
