//! Remote sync client
//!
//! Wraps a [`VoteStore`] with the engine's write policy and failure
//! classification:
//!
//! ```text
//! write_cell
//!   ├─ upsert succeeds                         → Ok
//!   ├─ rejected: optional column missing       → drop column, retry once
//!   │     ├─ retry succeeds                    → Ok (column stays dropped)
//!   │     └─ retry fails                       → classified error
//!   └─ any other failure                       → classified error
//! ```
//!
//! Payload columns are either required (the natural key plus `score`) or
//! optional. Only optional columns are ever dropped.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::store::{RawStoreError, RowPayload, VoteStore};
use crate::codec::{self, CRITERION_INDEX, PROPOSAL_ID, SCORE, VOTER_ID};
use crate::error::{StoreErrorKind, SyncError, SyncResult};
use crate::state::{CellKey, Score, VotesSnapshot};

/// Optional column carrying the client-side write time
pub const UPDATED_AT: &str = "updated_at";

/// Columns every write carries
pub const REQUIRED_COLUMNS: [&str; 4] = [VOTER_ID, PROPOSAL_ID, CRITERION_INDEX, SCORE];

/// Optional columns sent unless configured otherwise
pub fn default_optional_columns() -> Vec<String> {
    vec![UPDATED_AT.to_string()]
}

/// Client for fetching and writing vote cells
pub struct RemoteSyncClient<S> {
    store: S,
    optional_columns: Vec<String>,
    /// Optional columns the store turned out not to have
    unsupported: Mutex<HashSet<String>>,
}

impl<S: VoteStore> RemoteSyncClient<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            optional_columns: default_optional_columns(),
            unsupported: Mutex::new(HashSet::new()),
        }
    }

    /// Replace the set of optional columns sent with each write
    pub fn with_optional_columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.optional_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch every cell and decode it into a fresh snapshot
    pub async fn fetch_all(&self) -> SyncResult<VotesSnapshot> {
        let rows = self.store.fetch_rows().await.map_err(classify)?;
        let decoded = codec::decode_rows(rows);
        if decoded.dropped > 0 {
            warn!(
                rows = decoded.rows,
                dropped = decoded.dropped,
                "Fetched snapshot contained malformed rows"
            );
        }
        Ok(decoded.snapshot)
    }

    /// Set one cell. Idempotent: writing the same value twice leaves one row.
    pub async fn write_cell(&self, key: &CellKey, score: Score) -> SyncResult<()> {
        let mut payload = self.payload(key, score);

        let err = match self.store.upsert_row(payload.clone()).await {
            Ok(()) => {
                debug!(cell = %key, score = score.get(), "Cell written");
                return Ok(());
            }
            Err(raw) => classify(raw),
        };

        let Some(column) = self.narrowable_column(&err) else {
            return Err(err);
        };

        payload.remove(&column);
        self.mark_unsupported(&column);
        warn!(
            cell = %key,
            column = %column,
            "Store lacks optional column; retrying write without it"
        );

        self.store.upsert_row(payload).await.map_err(classify)?;
        info!(cell = %key, column = %column, "Narrowed write succeeded");
        Ok(())
    }

    /// Delete every cell of a proposal
    pub async fn delete_proposal(&self, proposal_id: &str) -> SyncResult<u64> {
        let removed = self
            .store
            .delete_proposal(proposal_id)
            .await
            .map_err(classify)?;
        info!(proposal_id, removed, "Proposal cells deleted");
        Ok(removed)
    }

    /// Delete every cell in the table
    pub async fn delete_all(&self) -> SyncResult<u64> {
        let removed = self.store.delete_all().await.map_err(classify)?;
        info!(removed, "All vote cells deleted");
        Ok(removed)
    }

    /// Optional columns still being sent
    pub fn active_optional_columns(&self) -> Vec<String> {
        let unsupported = self.unsupported();
        self.optional_columns
            .iter()
            .filter(|c| !unsupported.contains(c.as_str()))
            .cloned()
            .collect()
    }

    fn payload(&self, key: &CellKey, score: Score) -> RowPayload {
        let mut payload = RowPayload::new();
        payload.insert(VOTER_ID.into(), Value::from(key.participant_id.clone()));
        payload.insert(PROPOSAL_ID.into(), Value::from(key.proposal_id.clone()));
        payload.insert(CRITERION_INDEX.into(), Value::from(key.criterion.get()));
        payload.insert(SCORE.into(), Value::from(score.get()));

        for column in self.active_optional_columns() {
            match optional_value(&column) {
                Some(value) => {
                    payload.insert(column, value);
                }
                None => debug!(column = %column, "No value source for optional column"),
            }
        }
        payload
    }

    /// The optional column a missing-column rejection names, if it can be dropped
    fn narrowable_column(&self, err: &SyncError) -> Option<String> {
        let SyncError::Store {
            kind: StoreErrorKind::MissingColumn {
                column: Some(column),
            },
            ..
        } = err
        else {
            return None;
        };
        let droppable = self.optional_columns.iter().any(|c| c == column)
            && !REQUIRED_COLUMNS.contains(&column.as_str());
        droppable.then(|| column.clone())
    }

    fn mark_unsupported(&self, column: &str) {
        self.unsupported().insert(column.to_string());
    }

    fn unsupported(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.unsupported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn optional_value(column: &str) -> Option<Value> {
    match column {
        UPDATED_AT => Some(Value::from(Utc::now().to_rfc3339())),
        _ => None,
    }
}

/// Map a raw store failure onto the engine's error taxonomy
pub fn classify(raw: RawStoreError) -> SyncError {
    match raw {
        RawStoreError::Network { detail } => SyncError::transport(detail),
        RawStoreError::Rejected {
            status,
            code,
            message,
        } => {
            let kind = rejection_kind(status, code.as_deref(), &message);
            let detail = match code {
                Some(code) => format!("{code}: {message}"),
                None => message,
            };
            SyncError::store(kind, detail)
        }
    }
}

fn rejection_kind(status: Option<u16>, code: Option<&str>, message: &str) -> StoreErrorKind {
    match code {
        Some("PGRST204") | Some("42703") => StoreErrorKind::MissingColumn {
            column: quoted_name(message),
        },
        Some("PGRST205") | Some("42P01") => StoreErrorKind::MissingTable,
        Some("42501") => StoreErrorKind::Permission,
        Some(code) if code.starts_with("23") => StoreErrorKind::Constraint,
        _ => match status {
            Some(401) | Some(403) => StoreErrorKind::Permission,
            Some(404) => StoreErrorKind::MissingTable,
            _ => StoreErrorKind::Other,
        },
    }
}

/// First name quoted with `'` or `"` in a store message
fn quoted_name(message: &str) -> Option<String> {
    let start = message.find(['\'', '"'])?;
    let quote = message[start..].chars().next()?;
    let rest = &message[start + 1..];
    let end = rest.find(quote)?;
    let name = &rest[..end];
    (!name.is_empty()).then(|| name.to_string())
}
