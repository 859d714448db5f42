//! Error taxonomy for vote synchronization
//!
//! Remote failures are classified once, by the remote sync client, into the
//! variants below. Callers act on [`SyncError::class`] and show end users only
//! [`SyncError::user_message`]; the raw `detail` text is for logs.

use std::fmt;

/// Structural reason a store rejected a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The payload named a column the table does not have
    MissingColumn { column: Option<String> },
    /// The vote table does not exist
    MissingTable,
    /// A not-null / unique / check constraint was violated
    Constraint,
    /// The store refused the caller (auth or row-level policy)
    Permission,
    /// Anything else the store reported
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingColumn {
                column: Some(column),
            } => write!(f, "missing column '{}'", column),
            Self::MissingColumn { column: None } => write!(f, "missing column"),
            Self::MissingTable => write!(f, "missing table"),
            Self::Constraint => write!(f, "constraint"),
            Self::Permission => write!(f, "permission"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Coarse category that drives the reconciliation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The store could not be reached; local state is kept.
    Connectivity,
    /// The store answered with a rejection; local state is rolled back.
    Store,
    /// Rejected locally before any network call.
    Local,
}

/// Errors surfaced by the sync engine
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    // ── Remote ────────────────────────────────────────────────────────────
    /// The remote store could not be reached (DNS, connect, timeout, TLS).
    #[error("Transport error: {detail}")]
    Transport { detail: String },

    /// The store rejected the request for a structural reason.
    #[error("Store error ({kind}): {detail}")]
    Store { kind: StoreErrorKind, detail: String },

    // ── Local ─────────────────────────────────────────────────────────────
    /// The actor does not own the cell and is not allowed to override it.
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Criterion index or score outside the accepted range.
    #[error("Invalid cell: {0}")]
    InvalidCell(String),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport {
            detail: detail.into(),
        }
    }

    pub fn store(kind: StoreErrorKind, detail: impl Into<String>) -> Self {
        Self::Store {
            kind,
            detail: detail.into(),
        }
    }

    /// Classify this error for the reconciliation policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Transport { .. } => ErrorClass::Connectivity,
            Self::Store { .. } => ErrorClass::Store,
            Self::Permission(_) | Self::InvalidCell(_) => ErrorClass::Local,
        }
    }

    /// Returns `true` if the store was unreachable.
    pub fn is_connectivity(&self) -> bool {
        self.class() == ErrorClass::Connectivity
    }

    /// Text safe to show an end user. Never includes raw transport output.
    pub fn user_message(&self) -> String {
        let text = match self {
            Self::Transport { .. } => "Cannot reach the vote store. Working offline.",
            Self::Store { kind, .. } => match kind {
                StoreErrorKind::MissingColumn { .. } => {
                    "The vote store schema is out of date. Ask an administrator to update it."
                }
                StoreErrorKind::MissingTable => "The vote table is missing from the store.",
                StoreErrorKind::Constraint => "The vote store rejected this change as invalid.",
                StoreErrorKind::Permission => "The vote store refused this change.",
                StoreErrorKind::Other => "The vote store reported an unexpected error.",
            },
            Self::Permission(_) => "You can only change your own votes.",
            Self::InvalidCell(_) => "Scores must be between 1 and 5 on one of the 4 criteria.",
        };
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_is_connectivity() {
        let err = SyncError::transport("error sending request: connection refused");
        assert!(err.is_connectivity());
        assert_eq!(err.class(), ErrorClass::Connectivity);
    }

    #[test]
    fn user_message_hides_raw_detail() {
        let err = SyncError::transport("dns error: failed to lookup address efg.supabase.co");
        assert!(!err.user_message().contains("dns"));

        let err = SyncError::store(
            StoreErrorKind::MissingColumn {
                column: Some("updated_at".into()),
            },
            "PGRST204: Could not find the 'updated_at' column",
        );
        assert!(!err.user_message().contains("PGRST204"));
        assert_eq!(err.class(), ErrorClass::Store);
    }

    #[test]
    fn local_errors_are_local() {
        assert_eq!(
            SyncError::Permission("ana cannot vote for bruno".into()).class(),
            ErrorClass::Local
        );
        assert_eq!(
            SyncError::InvalidCell("score 9".into()).class(),
            ErrorClass::Local
        );
    }

    #[test]
    fn store_kind_display() {
        let kind = StoreErrorKind::MissingColumn {
            column: Some("updated_at".into()),
        };
        assert_eq!(kind.to_string(), "missing column 'updated_at'");
        assert_eq!(StoreErrorKind::MissingTable.to_string(), "missing table");
    }
}
