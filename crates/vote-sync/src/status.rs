//! Sync status reporting
//!
//! Tracks whether the engine is talking to the remote store, exposed as a
//! tri-state plus the last user-facing error text. Updated after every remote
//! outcome; observers receive changes through a `watch` channel.
//!
//! ```text
//! remote outcome
//!   ├─ success                 → online  (detail cleared)
//!   ├─ connectivity failure    → offline (detail = user message)
//!   └─ store / logic failure   → error   (detail = user message)
//! ```
//!
//! Local rejections (permission, validation) never reach the reporter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{ErrorClass, SyncError};

/// Note shown when an optimistic vote could not be sent
pub const LOCAL_ONLY_NOTE: &str =
    "Your change is saved locally only and may be lost if you reload before the connection returns.";

/// Connectivity tri-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Last remote operation succeeded.
    Online,
    /// The store could not be reached.
    Offline,
    /// The store rejected an operation.
    Error,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Current sync status as shown to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Human-readable cause, present when not online
    pub detail: Option<String>,
    /// Failed operations since the last success
    pub consecutive_failures: u32,
    pub total_operations: u64,
    pub total_failures: u64,
    /// When `state` last changed
    pub last_change: DateTime<Utc>,
}

impl SyncStatus {
    fn new() -> Self {
        Self {
            state: SyncState::Online,
            detail: None,
            consecutive_failures: 0,
            total_operations: 0,
            total_failures: 0,
            last_change: Utc::now(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.state == SyncState::Online
    }

    /// Failure rate as a fraction (0.0–1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_operations as f64
        }
    }

    fn transition(&mut self, state: SyncState, detail: Option<String>) {
        if state != self.state {
            self.state = state;
            self.last_change = Utc::now();
        }
        self.detail = detail;
    }
}

/// Sink for remote outcomes; cannot fail
#[derive(Debug)]
pub struct StatusReporter {
    tx: watch::Sender<SyncStatus>,
}

impl StatusReporter {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SyncStatus::new());
        Self { tx }
    }

    /// Copy of the current status
    pub fn current(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn watch(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    /// Record a successful remote operation.
    pub fn record_success(&self) {
        self.tx.send_if_modified(|status| {
            let before = status.clone();
            status.total_operations += 1;
            status.consecutive_failures = 0;
            if status.state != SyncState::Online {
                info!(previous = %status.state, "Vote store reachable again");
            }
            status.transition(SyncState::Online, None);
            *status != before
        });
    }

    /// Record a failed remote operation.
    pub fn record_failure(&self, err: &SyncError) {
        self.record(err, err.user_message());
    }

    /// Record a vote write that could not leave this machine.
    pub fn record_local_only(&self, err: &SyncError) {
        self.record(err, format!("{} {}", err.user_message(), LOCAL_ONLY_NOTE));
    }

    fn record(&self, err: &SyncError, detail: String) {
        let state = match err.class() {
            ErrorClass::Connectivity => SyncState::Offline,
            ErrorClass::Store => SyncState::Error,
            ErrorClass::Local => return,
        };
        warn!(state = %state, error = %err, "Remote operation failed");

        self.tx.send_modify(|status| {
            status.total_operations += 1;
            status.total_failures += 1;
            status.consecutive_failures += 1;
            status.transition(state, Some(detail));
        });
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}
