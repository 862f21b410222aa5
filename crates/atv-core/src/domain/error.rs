//! Error taxonomy shared by both transports.
//!
//! Every failure that crosses a component boundary is one of the
//! [`RemoteError`] variants.  Adapters translate raw I/O, TLS and Bluetooth
//! errors into this enum at the edge, so application code and callers never
//! see transport-specific exception types.
//!
//! # Retry policy
//!
//! | Class                                   | Policy                                   |
//! |-----------------------------------------|------------------------------------------|
//! | `CannotConnect`, `ConnectionClosed`, `WriteFailed`, `ServiceDiscoveryTimeout` | transient: retried locally with backoff |
//! | `InvalidPairingCode`                    | retried only inside the code-entry loop  |
//! | `PairingCancelled`, `UnknownKey`, `CredentialIo` | surfaced immediately             |

use thiserror::Error;

/// Errors surfaced by discovery, pairing, connection and dispatch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("discovery timed out")]
    DiscoveryTimeout,

    #[error("no device found")]
    NoDeviceFound,

    #[error("invalid pairing code: {0}")]
    InvalidPairingCode(String),

    #[error("pairing cancelled by user")]
    PairingCancelled,

    /// The remote rejected the stored client certificate.
    #[error("remote rejected the client credential: {0}")]
    InvalidCredential(String),

    #[error("cannot connect to {address}: {reason}")]
    CannotConnect { address: String, reason: String },

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("service discovery timed out after {0}s")]
    ServiceDiscoveryTimeout(u64),

    #[error("no writable characteristic found")]
    CharacteristicNotFound,

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("credential file error at {path}: {reason}")]
    CredentialIo { path: String, reason: String },

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("not connected")]
    NotConnected,

    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("{0}")]
    Unknown(String),
}

/// The six failure kinds a pairing caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairingFailure {
    InvalidCredentialOrCode,
    CannotConnect,
    ConnectionClosedDuringHandshake,
    UserCancelled,
    Timeout,
    Unknown,
}

impl RemoteError {
    /// Returns `true` for errors that are retried locally before surfacing.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::CannotConnect { .. }
                | RemoteError::ConnectionClosed(_)
                | RemoteError::WriteFailed(_)
                | RemoteError::ServiceDiscoveryTimeout(_)
        )
    }

    /// Classifies this error into the pairing failure kind shown to callers.
    pub fn pairing_failure(&self) -> PairingFailure {
        match self {
            RemoteError::InvalidPairingCode(_) | RemoteError::InvalidCredential(_) => {
                PairingFailure::InvalidCredentialOrCode
            }
            RemoteError::CannotConnect { .. } | RemoteError::TransportUnavailable(_) => {
                PairingFailure::CannotConnect
            }
            RemoteError::ConnectionClosed(_) => PairingFailure::ConnectionClosedDuringHandshake,
            RemoteError::PairingCancelled => PairingFailure::UserCancelled,
            RemoteError::Timeout(_)
            | RemoteError::DiscoveryTimeout
            | RemoteError::ServiceDiscoveryTimeout(_) => PairingFailure::Timeout,
            _ => PairingFailure::Unknown,
        }
    }

    /// Shorthand for [`RemoteError::CannotConnect`].
    pub fn cannot_connect(address: impl Into<String>, reason: impl ToString) -> Self {
        RemoteError::CannotConnect {
            address: address.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classes_are_exactly_the_retryable_four() {
        assert!(RemoteError::cannot_connect("1.2.3.4", "refused").is_transient());
        assert!(RemoteError::ConnectionClosed("eof".into()).is_transient());
        assert!(RemoteError::WriteFailed("gatt".into()).is_transient());
        assert!(RemoteError::ServiceDiscoveryTimeout(10).is_transient());

        assert!(!RemoteError::PairingCancelled.is_transient());
        assert!(!RemoteError::UnknownKey("X".into()).is_transient());
        assert!(!RemoteError::InvalidPairingCode("bad".into()).is_transient());
        assert!(!RemoteError::CredentialIo {
            path: "keys/cert.pem".into(),
            reason: "denied".into()
        }
        .is_transient());
    }

    #[test]
    fn test_pairing_failure_classification() {
        assert_eq!(
            RemoteError::InvalidPairingCode("x".into()).pairing_failure(),
            PairingFailure::InvalidCredentialOrCode
        );
        assert_eq!(
            RemoteError::InvalidCredential("x".into()).pairing_failure(),
            PairingFailure::InvalidCredentialOrCode
        );
        assert_eq!(
            RemoteError::cannot_connect("a", "b").pairing_failure(),
            PairingFailure::CannotConnect
        );
        assert_eq!(
            RemoteError::ConnectionClosed("x".into()).pairing_failure(),
            PairingFailure::ConnectionClosedDuringHandshake
        );
        assert_eq!(
            RemoteError::PairingCancelled.pairing_failure(),
            PairingFailure::UserCancelled
        );
        assert_eq!(
            RemoteError::Timeout("x".into()).pairing_failure(),
            PairingFailure::Timeout
        );
        assert_eq!(
            RemoteError::CredentialIo {
                path: "p".into(),
                reason: "r".into()
            }
            .pairing_failure(),
            PairingFailure::Unknown
        );
    }

    #[test]
    fn test_display_includes_context() {
        let err = RemoteError::cannot_connect("192.168.1.20", "connection refused");
        assert_eq!(
            err.to_string(),
            "cannot connect to 192.168.1.20: connection refused"
        );
    }
}
