//! The reconciled vote state at a point in time
//!
//! A `VotesSnapshot` maps participant → proposal → criterion → score. It is
//! kept in canonical form: a key path exists only while it holds a score, and
//! empty inner maps are pruned. Absence of a path means "not voted".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{CellKey, CriterionIndex, ParticipantId, ProposalId, Score};

/// Scores one participant gave one proposal, keyed by criterion
pub type ProposalScores = BTreeMap<CriterionIndex, Score>;

/// Nested vote mapping in canonical form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VotesSnapshot {
    votes: BTreeMap<ParticipantId, BTreeMap<ProposalId, ProposalScores>>,
}

impl VotesSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score stored at `key`, if any
    pub fn get(&self, key: &CellKey) -> Option<Score> {
        self.score(&key.participant_id, &key.proposal_id, key.criterion)
    }

    pub fn score(
        &self,
        participant_id: &str,
        proposal_id: &str,
        criterion: CriterionIndex,
    ) -> Option<Score> {
        self.proposal_scores(participant_id, proposal_id)?
            .get(&criterion)
            .copied()
    }

    /// All scores a participant gave a proposal
    pub fn proposal_scores(&self, participant_id: &str, proposal_id: &str) -> Option<&ProposalScores> {
        self.votes.get(participant_id)?.get(proposal_id)
    }

    /// Set or clear one cell, returning the previous score.
    ///
    /// `None` removes the path and prunes any map left empty.
    pub fn set(&mut self, key: &CellKey, score: Option<Score>) -> Option<Score> {
        match score {
            Some(score) => self
                .votes
                .entry(key.participant_id.clone())
                .or_default()
                .entry(key.proposal_id.clone())
                .or_default()
                .insert(key.criterion, score),
            None => self.clear(key),
        }
    }

    fn clear(&mut self, key: &CellKey) -> Option<Score> {
        let proposals = self.votes.get_mut(&key.participant_id)?;
        let scores = proposals.get_mut(&key.proposal_id)?;
        let previous = scores.remove(&key.criterion);

        if scores.is_empty() {
            proposals.remove(&key.proposal_id);
        }
        if proposals.is_empty() {
            self.votes.remove(&key.participant_id);
        }
        previous
    }

    /// Drop every cell belonging to `proposal_id`, returning how many were removed
    pub fn remove_proposal(&mut self, proposal_id: &str) -> usize {
        let mut removed = 0;
        self.votes.retain(|_, proposals| {
            if let Some(scores) = proposals.remove(proposal_id) {
                removed += scores.len();
            }
            !proposals.is_empty()
        });
        removed
    }

    /// Iterate over every present cell in key order
    pub fn cells(&self) -> impl Iterator<Item = (CellKey, Score)> + '_ {
        self.votes.iter().flat_map(|(participant_id, proposals)| {
            proposals.iter().flat_map(move |(proposal_id, scores)| {
                scores.iter().map(move |(criterion, score)| {
                    (
                        CellKey::new(participant_id.clone(), proposal_id.clone(), *criterion),
                        *score,
                    )
                })
            })
        })
    }

    /// Participants that have at least one cell
    pub fn participants(&self) -> impl Iterator<Item = &ParticipantId> {
        self.votes.keys()
    }

    /// Number of present cells
    pub fn len(&self) -> usize {
        self.votes
            .values()
            .flat_map(|proposals| proposals.values())
            .map(|scores| scores.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}
