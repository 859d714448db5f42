//! Aggregation over a votes snapshot
//!
//! Pure functions computing per-participant sums, team averages and the
//! proposal ranking. Nothing here performs I/O, so results views may call
//! them on every render.
//!
//! Ranking ties are broken by the order proposals were given in: the sort is
//! stable and never consults participant order.

use serde::{Deserialize, Serialize};

use crate::state::{
    CriterionIndex, Participant, ParticipantId, Proposal, ProposalId, VotesSnapshot,
    CRITERIA_COUNT,
};

/// Highest sum a participant can give a proposal
pub const MAX_PROPOSAL_SUM: u32 = 5 * CRITERIA_COUNT as u32;

/// A proposal and its team average
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedProposal {
    pub proposal_id: ProposalId,
    pub average: f64,
}

/// How many of a participant's cells are scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub cast: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.cast == self.total
    }
}

/// Score of one cell, 0 when not voted
pub fn cell_score(
    snapshot: &VotesSnapshot,
    participant_id: &str,
    proposal_id: &str,
    criterion: CriterionIndex,
) -> u8 {
    snapshot
        .score(participant_id, proposal_id, criterion)
        .map_or(0, |s| s.get())
}

/// Sum of a participant's criterion scores for a proposal (0..=20)
pub fn participant_proposal_sum(
    snapshot: &VotesSnapshot,
    participant_id: &str,
    proposal_id: &str,
) -> u32 {
    snapshot
        .proposal_scores(participant_id, proposal_id)
        .map_or(0, |scores| scores.values().map(|s| s.get() as u32).sum())
}

/// Mean of the participants' sums for a proposal.
///
/// Participants who have not voted count as 0. Returns 0.0 for an empty
/// participant list.
pub fn proposal_team_average(
    snapshot: &VotesSnapshot,
    participants: &[Participant],
    proposal_id: &str,
) -> f64 {
    if participants.is_empty() {
        return 0.0;
    }
    let total: u32 = participants
        .iter()
        .map(|p| participant_proposal_sum(snapshot, &p.id, proposal_id))
        .sum();
    total as f64 / participants.len() as f64
}

/// Proposals ordered by team average, highest first, ties in input order
pub fn rank_proposals(
    snapshot: &VotesSnapshot,
    participants: &[Participant],
    proposals: &[Proposal],
) -> Vec<RankedProposal> {
    let mut ranked: Vec<RankedProposal> = proposals
        .iter()
        .map(|p| RankedProposal {
            proposal_id: p.id.clone(),
            average: proposal_team_average(snapshot, participants, &p.id),
        })
        .collect();

    // `sort_by` is stable, which is what keeps ties in input order
    ranked.sort_by(|a, b| b.average.total_cmp(&a.average));
    ranked
}

/// Top-ranked proposal, `None` when there are no proposals
pub fn winner(
    snapshot: &VotesSnapshot,
    participants: &[Participant],
    proposals: &[Proposal],
) -> Option<ProposalId> {
    rank_proposals(snapshot, participants, proposals)
        .into_iter()
        .next()
        .map(|r| r.proposal_id)
}

/// Number of participants with at least one scored criterion for a proposal
pub fn voters_for_proposal(
    snapshot: &VotesSnapshot,
    participants: &[Participant],
    proposal_id: &str,
) -> usize {
    participants
        .iter()
        .filter(|p| {
            snapshot
                .proposal_scores(&p.id, proposal_id)
                .is_some_and(|scores| !scores.is_empty())
        })
        .count()
}

/// Voting progress of one participant across the given proposals
pub fn participant_progress(
    snapshot: &VotesSnapshot,
    participant_id: &str,
    proposals: &[Proposal],
) -> Progress {
    let cast = proposals
        .iter()
        .filter_map(|p| snapshot.proposal_scores(participant_id, &p.id))
        .map(|scores| scores.len())
        .sum();
    Progress {
        cast,
        total: proposals.len() * CRITERIA_COUNT,
    }
}

/// Per-participant scores of one matrix cell, in participant order
pub fn criterion_scores(
    snapshot: &VotesSnapshot,
    participants: &[Participant],
    proposal_id: &str,
    criterion: CriterionIndex,
) -> Vec<(ParticipantId, u8)> {
    participants
        .iter()
        .map(|p| (p.id.clone(), cell_score(snapshot, &p.id, proposal_id, criterion)))
        .collect()
}

/// Standings of one proposal, as handed to report and analysis consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalStanding {
    pub proposal_id: ProposalId,
    pub name: String,
    pub average: f64,
    /// Participants that scored at least one criterion
    pub voters: usize,
    /// Sum per participant, in participant order
    pub sums: Vec<(ParticipantId, u32)>,
}

/// Full aggregated view of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standings {
    /// Proposals in rank order
    pub proposals: Vec<ProposalStanding>,
    pub winner: Option<ProposalId>,
}

impl Standings {
    pub fn compute(
        snapshot: &VotesSnapshot,
        participants: &[Participant],
        proposals: &[Proposal],
    ) -> Self {
        let ranked = rank_proposals(snapshot, participants, proposals);
        let standings: Vec<ProposalStanding> = ranked
            .into_iter()
            .filter_map(|r| {
                let proposal = proposals.iter().find(|p| p.id == r.proposal_id)?;
                Some(ProposalStanding {
                    name: proposal.name.clone(),
                    average: r.average,
                    voters: voters_for_proposal(snapshot, participants, &proposal.id),
                    sums: participants
                        .iter()
                        .map(|m| {
                            (
                                m.id.clone(),
                                participant_proposal_sum(snapshot, &m.id, &proposal.id),
                            )
                        })
                        .collect(),
                    proposal_id: r.proposal_id,
                })
            })
            .collect();

        Self {
            winner: standings.first().map(|s| s.proposal_id.clone()),
            proposals: standings,
        }
    }
}
