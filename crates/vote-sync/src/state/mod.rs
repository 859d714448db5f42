//! Vote state model
//!
//! - `types`: identifiers, validated `Score` / `CriterionIndex`, the
//!   `CellKey` natural key, participants, proposals and actors
//! - `snapshot`: the nested `VotesSnapshot` owned by the reconciliation
//!   controller and handed to readers as an immutable `Arc`

pub mod snapshot;
pub mod types;

// Re-export core types
pub use snapshot::{ProposalScores, VotesSnapshot};
pub use types::{
    Actor, CellKey, CriterionIndex, OutOfRange, Participant, ParticipantId, Proposal, ProposalId,
    Role, Score, CRITERIA_COUNT,
};
