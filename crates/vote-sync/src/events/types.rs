//! Change notifications for the vote table
//!
//! A notice says "the remote vote table may have changed". Receivers do not
//! patch their state from the payload; they re-fetch, so the payload is only
//! informational (logging, filtering).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{ParticipantId, ProposalId};

/// A remote-change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeNotice {
    /// A cell was inserted or updated
    CellUpserted {
        participant_id: ParticipantId,
        proposal_id: ProposalId,
        criterion_index: u8,
        timestamp: DateTime<Utc>,
    },

    /// Every cell of a proposal was deleted
    ProposalPurged {
        proposal_id: ProposalId,
        removed: u64,
        timestamp: DateTime<Utc>,
    },

    /// Every cell of the table was deleted
    VotesReset { removed: u64, timestamp: DateTime<Utc> },

    /// Periodic poll tick from a store without push notifications
    Poll { timestamp: DateTime<Utc> },
}

impl ChangeNotice {
    pub fn poll() -> Self {
        Self::Poll {
            timestamp: Utc::now(),
        }
    }

    /// Get the timestamp of the notice
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ChangeNotice::CellUpserted { timestamp, .. } => *timestamp,
            ChangeNotice::ProposalPurged { timestamp, .. } => *timestamp,
            ChangeNotice::VotesReset { timestamp, .. } => *timestamp,
            ChangeNotice::Poll { timestamp } => *timestamp,
        }
    }

    /// Get the notice type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            ChangeNotice::CellUpserted { .. } => "cell_upserted",
            ChangeNotice::ProposalPurged { .. } => "proposal_purged",
            ChangeNotice::VotesReset { .. } => "votes_reset",
            ChangeNotice::Poll { .. } => "poll",
        }
    }

    /// Proposal the notice concerns, if any
    pub fn proposal_id(&self) -> Option<&str> {
        match self {
            ChangeNotice::CellUpserted { proposal_id, .. }
            | ChangeNotice::ProposalPurged { proposal_id, .. } => Some(proposal_id),
            ChangeNotice::VotesReset { .. } | ChangeNotice::Poll { .. } => None,
        }
    }
}
