//! In-process vote store
//!
//! Keeps rows keyed on the natural key and publishes a [`ChangeNotice`] for
//! every write, the way a realtime-capable store would. Serves local-only
//! sessions and tests. An optional column whitelist makes it reject unknown
//! columns like a schema-bound table does. Criterion indexes outside the
//! rubric are refused the way the table's check constraint refuses them.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::store::{RawStoreError, RowPayload, VoteStore};
use crate::codec::{CRITERION_INDEX, PROPOSAL_ID, SCORE, VOTER_ID};
use crate::events::{ChangeBus, ChangeNotice};
use crate::state::CRITERIA_COUNT;

type RowKey = (String, String, u8);

/// Table name used in schema error messages
const TABLE: &str = "votes";

/// Rows held in memory, one per natural key
#[derive(Debug, Default)]
pub struct MemoryVoteStore {
    rows: Mutex<BTreeMap<RowKey, RowPayload>>,
    columns: Option<HashSet<String>>,
    bus: ChangeBus,
}

impl MemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict accepted columns; writes naming any other column are rejected
    pub fn with_columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Subscribe to change notices
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.bus.subscribe()
    }

    /// The bus notices are published on
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Number of stored rows
    pub fn row_count(&self) -> usize {
        self.rows().len()
    }

    /// Stored payload for a key, if any
    pub fn row(&self, voter_id: &str, proposal_id: &str, criterion_index: u8) -> Option<RowPayload> {
        self.rows()
            .get(&(voter_id.to_string(), proposal_id.to_string(), criterion_index))
            .cloned()
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, BTreeMap<RowKey, RowPayload>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_columns(&self, row: &RowPayload) -> Result<(), RawStoreError> {
        let Some(columns) = &self.columns else {
            return Ok(());
        };
        match row.keys().find(|name| !columns.contains(name.as_str())) {
            Some(unknown) => Err(RawStoreError::rejected(
                Some(400),
                Some("PGRST204"),
                format!(
                    "Could not find the '{}' column of '{}' in the schema cache",
                    unknown, TABLE
                ),
            )),
            None => Ok(()),
        }
    }
}

fn row_key(row: &RowPayload) -> Result<RowKey, RawStoreError> {
    let text = |column: &str| {
        row.get(column)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| not_null(column))
    };
    let criterion = row
        .get(CRITERION_INDEX)
        .and_then(Value::as_u64)
        .ok_or_else(|| not_null(CRITERION_INDEX))?;
    let criterion = u8::try_from(criterion)
        .ok()
        .filter(|c| usize::from(*c) < CRITERIA_COUNT)
        .ok_or_else(|| check_violation(CRITERION_INDEX))?;
    if row.get(SCORE).map_or(true, Value::is_null) {
        return Err(not_null(SCORE));
    }
    Ok((text(VOTER_ID)?, text(PROPOSAL_ID)?, criterion))
}

fn not_null(column: &str) -> RawStoreError {
    RawStoreError::rejected(
        Some(400),
        Some("23502"),
        format!(
            "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
            column, TABLE
        ),
    )
}

fn check_violation(column: &str) -> RawStoreError {
    RawStoreError::rejected(
        Some(400),
        Some("23514"),
        format!(
            "new row for relation \"{}\" violates check constraint \"{}_{}_check\"",
            TABLE, TABLE, column
        ),
    )
}

#[async_trait]
impl VoteStore for MemoryVoteStore {
    async fn fetch_rows(&self) -> Result<Vec<Value>, RawStoreError> {
        Ok(self.rows().values().cloned().map(Value::Object).collect())
    }

    async fn upsert_row(&self, row: RowPayload) -> Result<(), RawStoreError> {
        self.check_columns(&row)?;
        let key = row_key(&row)?;

        let notice = ChangeNotice::CellUpserted {
            participant_id: key.0.clone(),
            proposal_id: key.1.clone(),
            criterion_index: key.2,
            timestamp: Utc::now(),
        };
        let replaced = self.rows().insert(key, row).is_some();
        debug!(replaced, "Memory store upsert");

        self.bus.publish(notice);
        Ok(())
    }

    async fn delete_proposal(&self, proposal_id: &str) -> Result<u64, RawStoreError> {
        let removed = {
            let mut rows = self.rows();
            let before = rows.len();
            rows.retain(|(_, proposal, _), _| proposal != proposal_id);
            (before - rows.len()) as u64
        };

        self.bus.publish(ChangeNotice::ProposalPurged {
            proposal_id: proposal_id.to_string(),
            removed,
            timestamp: Utc::now(),
        });
        Ok(removed)
    }

    async fn delete_all(&self) -> Result<u64, RawStoreError> {
        let removed = {
            let mut rows = self.rows();
            let removed = rows.len() as u64;
            rows.clear();
            removed
        };

        self.bus.publish(ChangeNotice::VotesReset {
            removed,
            timestamp: Utc::now(),
        });
        Ok(removed)
    }
}
