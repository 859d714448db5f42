//! Vote cell codec
//!
//! Converts between the nested [`VotesSnapshot`] and the flat row shape the
//! remote store keeps (`voter_id`, `proposal_id`, `criterion_index`,
//! `score`). Remote rows are loosely typed, so decoding coerces what it can
//! and drops what it cannot: a malformed row never reaches the aggregator and
//! never fails the whole fetch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::state::{CellKey, CriterionIndex, Score, VotesSnapshot};

/// Column holding the participant id
pub const VOTER_ID: &str = "voter_id";
/// Column holding the proposal id
pub const PROPOSAL_ID: &str = "proposal_id";
/// Column holding the criterion index (0..=3)
pub const CRITERION_INDEX: &str = "criterion_index";
/// Column holding the score (1..=5)
pub const SCORE: &str = "score";

/// Columns forming the natural key of a row
pub const NATURAL_KEY: [&str; 3] = [VOTER_ID, PROPOSAL_ID, CRITERION_INDEX];

/// One vote cell as the remote store keeps it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRow {
    pub voter_id: String,
    pub proposal_id: String,
    pub criterion_index: u8,
    pub score: u8,
}

impl VoteRow {
    pub fn new(key: &CellKey, score: Score) -> Self {
        Self {
            voter_id: key.participant_id.clone(),
            proposal_id: key.proposal_id.clone(),
            criterion_index: key.criterion.get(),
            score: score.get(),
        }
    }
}

/// Why a remote row was dropped during decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowDefect {
    #[error("row is not an object")]
    NotAnObject,

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("field '{0}' is empty")]
    EmptyField(&'static str),

    #[error("field '{0}' is not a small non-negative integer")]
    NotAnInteger(&'static str),

    #[error("criterion index {0} out of range")]
    CriterionOutOfRange(u8),

    #[error("score {0} out of range")]
    ScoreOutOfRange(u8),
}

/// Result of decoding a batch of remote rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub snapshot: VotesSnapshot,
    /// Rows received
    pub rows: usize,
    /// Rows dropped as malformed
    pub dropped: usize,
}

/// Flatten a snapshot into one row per present cell, in key order
pub fn to_flat_records(snapshot: &VotesSnapshot) -> Vec<VoteRow> {
    snapshot
        .cells()
        .map(|(key, score)| VoteRow::new(&key, score))
        .collect()
}

/// Build a fresh snapshot from flat rows.
///
/// Starts from an empty mapping so cells deleted remotely come back absent.
/// Duplicate keys resolve to the last row; a score of 0 clears the cell.
/// Out-of-range rows are dropped.
pub fn from_flat_records<I>(rows: I) -> VotesSnapshot
where
    I: IntoIterator<Item = VoteRow>,
{
    let mut snapshot = VotesSnapshot::new();
    for row in rows {
        if let Err(defect) = apply_row(&mut snapshot, row) {
            warn!(%defect, "Dropping vote row");
        }
    }
    snapshot
}

/// Coerce and decode loosely-typed remote rows
pub fn decode_rows(values: Vec<Value>) -> Decoded {
    let rows = values.len();
    let mut snapshot = VotesSnapshot::new();
    let mut dropped = 0;

    for (position, value) in values.iter().enumerate() {
        let outcome = coerce_row(value).and_then(|row| apply_row(&mut snapshot, row));
        if let Err(defect) = outcome {
            dropped += 1;
            warn!(position, %defect, "Dropping malformed vote row");
        }
    }

    debug!(rows, dropped, cells = snapshot.len(), "Decoded vote rows");
    Decoded {
        snapshot,
        rows,
        dropped,
    }
}

fn apply_row(snapshot: &mut VotesSnapshot, row: VoteRow) -> Result<(), RowDefect> {
    let criterion = CriterionIndex::new(row.criterion_index)
        .ok_or(RowDefect::CriterionOutOfRange(row.criterion_index))?;
    let score = match row.score {
        0 => None,
        value => Some(Score::new(value).ok_or(RowDefect::ScoreOutOfRange(value))?),
    };

    let key = CellKey::new(row.voter_id, row.proposal_id, criterion);
    snapshot.set(&key, score);
    Ok(())
}

/// Coerce one JSON row, accepting `snake_case` or `camelCase` columns and
/// integers given as numbers or numeric strings.
fn coerce_row(value: &Value) -> Result<VoteRow, RowDefect> {
    let object = value.as_object().ok_or(RowDefect::NotAnObject)?;

    Ok(VoteRow {
        voter_id: text(field(object, VOTER_ID, "voterId")?, VOTER_ID)?,
        proposal_id: text(field(object, PROPOSAL_ID, "proposalId")?, PROPOSAL_ID)?,
        criterion_index: small_int(
            field(object, CRITERION_INDEX, "criterionIndex")?,
            CRITERION_INDEX,
        )?,
        score: small_int(field(object, SCORE, "score")?, SCORE)?,
    })
}

fn field<'a>(
    object: &'a Map<String, Value>,
    snake: &'static str,
    camel: &str,
) -> Result<&'a Value, RowDefect> {
    object
        .get(snake)
        .or_else(|| object.get(camel))
        .filter(|v| !v.is_null())
        .ok_or(RowDefect::MissingField(snake))
}

/// Ids are kept exactly as stored so a written cell reads back under the
/// same key; only blank ids are refused.
fn text(value: &Value, name: &'static str) -> Result<String, RowDefect> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(RowDefect::EmptyField(name)),
    };
    if text.trim().is_empty() {
        return Err(RowDefect::EmptyField(name));
    }
    Ok(text)
}

fn small_int(value: &Value, name: &'static str) -> Result<u8, RowDefect> {
    let number = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    number
        .and_then(|n| u8::try_from(n).ok())
        .ok_or(RowDefect::NotAnInteger(name))
}
