//! Result of probing for an optional transport at startup.
//!
//! A machine without a Bluetooth adapter must still be able to use the TLS
//! remote.  Instead of a global "is Bluetooth available" flag, the probe
//! result is handed to each Bluetooth component when it is constructed.

use atv_core::RemoteError;

/// Whether a transport backend is usable.
pub enum Capability<T> {
    Available(T),
    /// The backend could not be initialised; the string says why.
    Unavailable(String),
}

impl<T> Capability<T> {
    /// Borrows the backend, or fails with [`RemoteError::TransportUnavailable`].
    pub fn require(&self) -> Result<&T, RemoteError> {
        match self {
            Capability::Available(inner) => Ok(inner),
            Capability::Unavailable(reason) => {
                Err(RemoteError::TransportUnavailable(reason.clone()))
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Capability<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(inner) => Capability::Available(inner),
            Err(e) => Capability::Unavailable(e.to_string()),
        }
    }
}
