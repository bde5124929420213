//! Engine-wide error taxonomy
//!
//! Layer errors (`StorageError`, `RemoteError`) keep their detail and map onto
//! [`ErrorKind`] through their `kind()` methods; the coordinator only needs
//! the class of failure to pick a fallback and a status message.

use std::fmt;

use serde::Serialize;

/// Class of a recovered failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Local write exceeds capacity
    StorageFull,
    /// Stored JSON is unparseable
    StorageCorrupt,
    /// Local slot unreadable or unwritable for another reason
    StorageUnavailable,
    /// Request rejected, timed out or failed in transport
    NetworkFailure,
    /// Remote answered with an authorization error
    AuthFailure,
    /// No matching remote document
    DocumentNotFound,
}

impl ErrorKind {
    /// True for failures of the remote store
    pub fn is_remote(self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkFailure | ErrorKind::AuthFailure | ErrorKind::DocumentNotFound
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::StorageFull => "storage full",
            ErrorKind::StorageCorrupt => "storage corrupt",
            ErrorKind::StorageUnavailable => "storage unavailable",
            ErrorKind::NetworkFailure => "network failure",
            ErrorKind::AuthFailure => "authorization failure",
            ErrorKind::DocumentNotFound => "document not found",
        };
        f.write_str(name)
    }
}
