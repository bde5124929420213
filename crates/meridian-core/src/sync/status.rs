//! Sync status machine
//!
//! Tracks what the engine is doing for display. Transitions are driven only by
//! the coordinator; the machine owns no timers. `saved` and `error` are
//! transient and decay back to the quiescent status through [`StatusMachine::decay`],
//! which refuses to act if anything newer has replaced the transient status.
//!
//! ```text
//!              begin_saving            succeed
//!   local  ───────────────▶ saving ───────────▶ saved ──┐
//!     ▲                       │                         │ decay
//!     │                       ▼ fail                    │
//!     └──────────────────── error ◀─────────────────────┘
//! ```
//!
//! With remote sync enabled the quiescent status is `syncing` instead of
//! `local`.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;

use crate::error::ErrorKind;

/// Current synchronization state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No remote configured, nothing pending
    Local,
    /// Local write in flight
    Saving,
    /// Remote read or write in flight; quiescent state when sync is enabled
    Syncing,
    /// Last operation succeeded
    Saved,
    /// Last operation failed
    Error,
}

impl SyncStatus {
    /// `saved` and `error` decay after a dwell time
    pub fn is_transient(self) -> bool {
        matches!(self, SyncStatus::Saved | SyncStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Local => "local",
            SyncStatus::Saving => "saving",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Saved => "saved",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status plus the short human-readable message shown with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub status: SyncStatus,
    pub message: String,
    /// Class of the failure when `status` is `error`
    pub error: Option<ErrorKind>,
}

impl StatusSnapshot {
    fn quiescent(remote_enabled: bool) -> Self {
        if remote_enabled {
            Self {
                status: SyncStatus::Syncing,
                message: "Remote sync enabled".to_string(),
                error: None,
            }
        } else {
            Self {
                status: SyncStatus::Local,
                message: "Local mode".to_string(),
                error: None,
            }
        }
    }
}

/// Observable status state machine
#[derive(Debug)]
pub struct StatusMachine {
    current: StatusSnapshot,
    remote_enabled: bool,
    tx: watch::Sender<StatusSnapshot>,
}

impl StatusMachine {
    /// Start in the quiescent state for the given mode
    pub fn new(remote_enabled: bool) -> Self {
        let current = StatusSnapshot::quiescent(remote_enabled);
        let (tx, _rx) = watch::channel(current.clone());
        Self {
            current,
            remote_enabled,
            tx,
        }
    }

    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.current
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    /// Switch between local and remote mode
    ///
    /// If the machine is resting in the old quiescent state it moves to the new
    /// one; otherwise the change applies at the next settle.
    pub fn set_remote_enabled(&mut self, enabled: bool) {
        if self.remote_enabled == enabled {
            return;
        }
        let was_resting = self.is_resting();
        self.remote_enabled = enabled;
        if was_resting {
            self.settle();
        }
    }

    fn is_resting(&self) -> bool {
        self.current == StatusSnapshot::quiescent(self.remote_enabled)
    }

    pub fn begin_saving(&mut self, message: impl Into<String>) {
        self.set(SyncStatus::Saving, message.into(), None);
    }

    pub fn begin_syncing(&mut self, message: impl Into<String>) {
        self.set(SyncStatus::Syncing, message.into(), None);
    }

    pub fn succeed(&mut self, message: impl Into<String>) {
        self.set(SyncStatus::Saved, message.into(), None);
    }

    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.set(SyncStatus::Error, message.into(), Some(kind));
    }

    /// Return to the quiescent state unconditionally
    pub fn settle(&mut self) {
        let next = StatusSnapshot::quiescent(self.remote_enabled);
        self.publish(next);
    }

    /// Dwell-time decay: settle only if the status is still `expected`
    ///
    /// Returns false when a newer transition has already replaced it.
    pub fn decay(&mut self, expected: SyncStatus) -> bool {
        if self.current.status != expected || !expected.is_transient() {
            return false;
        }
        self.settle();
        true
    }

    fn set(&mut self, status: SyncStatus, message: String, error: Option<ErrorKind>) {
        self.publish(StatusSnapshot {
            status,
            message,
            error,
        });
    }

    fn publish(&mut self, next: StatusSnapshot) {
        self.current = next;
        self.tx.send_replace(self.current.clone());
    }
}
