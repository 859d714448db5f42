//! Participants, proposals and criterion descriptions
//!
//! The roster is edited by admins only. Removing a participant leaves their
//! cells in the store; aggregation ignores them because it iterates the
//! roster, not the snapshot. Removing a proposal here does not touch votes;
//! use `ReconciliationController::purge_proposal` for that.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::Standings;
use crate::state::{Actor, Participant, Proposal, VotesSnapshot, CRITERIA_COUNT};

/// Criterion titles a fresh roster starts with
pub const DEFAULT_CRITERIA: [&str; CRITERIA_COUNT] = [
    "Problem strength and justification",
    "MVP clarity and feasibility",
    "Sprint compatibility",
    "Final presentation potential",
];

/// Error type for roster edits
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("{0} is not allowed to edit the roster")]
    Unauthorized(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Criterion index out of range: {0}")]
    InvalidCriterion(usize),

    #[error("Invalid roster JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for roster edits
pub type RosterResult<T> = Result<T, RosterError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub criteria: [String; CRITERIA_COUNT],
    pub participants: Vec<Participant>,
    /// In display order; ranking ties keep this order
    pub proposals: Vec<Proposal>,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            criteria: DEFAULT_CRITERIA.map(String::from),
            participants: Vec::new(),
            proposals: Vec::new(),
        }
    }
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn proposal(&self, id: &str) -> Option<&Proposal> {
        self.proposals.iter().find(|p| p.id == id)
    }

    /// Ranked results for this roster over `snapshot`
    pub fn standings(&self, snapshot: &VotesSnapshot) -> Standings {
        Standings::compute(snapshot, &self.participants, &self.proposals)
    }

    // ── Participants ──────────────────────────────────────────────────────

    pub fn add_participant(&mut self, actor: &Actor, participant: Participant) -> RosterResult<()> {
        authorize(actor)?;
        if self.participant(&participant.id).is_some() {
            return Err(RosterError::DuplicateId(participant.id));
        }
        info!(participant_id = %participant.id, "Participant added");
        self.participants.push(participant);
        Ok(())
    }

    pub fn rename_participant(
        &mut self,
        actor: &Actor,
        id: &str,
        display_name: impl Into<String>,
    ) -> RosterResult<()> {
        authorize(actor)?;
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| RosterError::NotFound(id.to_string()))?;
        participant.display_name = display_name.into();
        Ok(())
    }

    /// Remove a participant. Their stored votes are left orphaned.
    pub fn remove_participant(&mut self, actor: &Actor, id: &str) -> RosterResult<Participant> {
        authorize(actor)?;
        let index = self
            .participants
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| RosterError::NotFound(id.to_string()))?;
        info!(participant_id = id, "Participant removed");
        Ok(self.participants.remove(index))
    }

    // ── Proposals ─────────────────────────────────────────────────────────

    pub fn add_proposal(&mut self, actor: &Actor, proposal: Proposal) -> RosterResult<()> {
        authorize(actor)?;
        if self.proposal(&proposal.id).is_some() {
            return Err(RosterError::DuplicateId(proposal.id));
        }
        info!(proposal_id = %proposal.id, "Proposal added");
        self.proposals.push(proposal);
        Ok(())
    }

    pub fn update_proposal_name(
        &mut self,
        actor: &Actor,
        id: &str,
        name: impl Into<String>,
    ) -> RosterResult<()> {
        authorize(actor)?;
        self.proposal_mut(id)?.name = name.into();
        Ok(())
    }

    /// Set the per-proposal description of one criterion
    pub fn update_criterion_description(
        &mut self,
        actor: &Actor,
        id: &str,
        criterion: usize,
        description: impl Into<String>,
    ) -> RosterResult<()> {
        authorize(actor)?;
        if criterion >= CRITERIA_COUNT {
            return Err(RosterError::InvalidCriterion(criterion));
        }
        self.proposal_mut(id)?.criterion_descriptions[criterion] = description.into();
        Ok(())
    }

    /// Set or clear (with `None` or an empty string) the external link
    pub fn set_proposal_link(
        &mut self,
        actor: &Actor,
        id: &str,
        link: Option<String>,
    ) -> RosterResult<()> {
        authorize(actor)?;
        self.proposal_mut(id)?.external_link = link.filter(|l| !l.trim().is_empty());
        Ok(())
    }

    pub fn remove_proposal(&mut self, actor: &Actor, id: &str) -> RosterResult<Proposal> {
        authorize(actor)?;
        let index = self
            .proposals
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| RosterError::NotFound(id.to_string()))?;
        info!(proposal_id = id, "Proposal removed from roster");
        Ok(self.proposals.remove(index))
    }

    fn proposal_mut(&mut self, id: &str) -> RosterResult<&mut Proposal> {
        self.proposals
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| RosterError::NotFound(id.to_string()))
    }

    // ── Import / export ───────────────────────────────────────────────────

    pub fn to_json(&self) -> RosterResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse an exported roster, rejecting duplicate ids
    pub fn from_json(json: &str) -> RosterResult<Self> {
        let roster: Roster = serde_json::from_str(json)?;

        let duplicate = first_duplicate(roster.participants.iter().map(|p| p.id.as_str()))
            .or_else(|| first_duplicate(roster.proposals.iter().map(|p| p.id.as_str())));
        if let Some(id) = duplicate {
            return Err(RosterError::DuplicateId(id));
        }
        Ok(roster)
    }
}

fn first_duplicate<'a>(ids: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Some(id.to_string());
        }
    }
    None
}

fn authorize(actor: &Actor) -> RosterResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(RosterError::Unauthorized(actor.participant_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Actor {
        Actor::admin("carla")
    }

    fn seeded() -> Roster {
        let mut roster = Roster::new();
        roster
            .add_participant(&admin(), Participant::new("ana", "Ana"))
            .unwrap();
        roster
            .add_proposal(&admin(), Proposal::new("p1", "Portfolio tracker"))
            .unwrap();
        roster
    }

    #[test]
    fn test_default_criteria() {
        let roster = Roster::default();
        assert_eq!(roster.criteria[0], "Problem strength and justification");
        assert!(roster.participants.is_empty());
        assert!(roster.proposals.is_empty());
    }

    #[test]
    fn test_member_cannot_edit() {
        let mut roster = seeded();
        let err = roster
            .add_participant(&Actor::member("ana"), Participant::new("bruno", "Bruno"))
            .unwrap_err();
        assert!(matches!(err, RosterError::Unauthorized(ref id) if id == "ana"));
        assert!(matches!(
            roster.remove_proposal(&Actor::member("ana"), "p1"),
            Err(RosterError::Unauthorized(_))
        ));
        assert_eq!(roster.proposals.len(), 1);
    }

    #[test]
    fn test_duplicate_and_missing_ids() {
        let mut roster = seeded();
        assert!(matches!(
            roster.add_participant(&admin(), Participant::new("ana", "Other Ana")),
            Err(RosterError::DuplicateId(_))
        ));
        assert!(matches!(
            roster.add_proposal(&admin(), Proposal::new("p1", "Again")),
            Err(RosterError::DuplicateId(_))
        ));
        assert!(matches!(
            roster.rename_participant(&admin(), "zoe", "Zoe"),
            Err(RosterError::NotFound(_))
        ));
        assert!(matches!(
            roster.update_proposal_name(&admin(), "p9", "x"),
            Err(RosterError::NotFound(_))
        ));
    }

    #[test]
    fn test_edit_proposal() {
        let mut roster = seeded();
        roster
            .update_proposal_name(&admin(), "p1", "Budget tracker")
            .unwrap();
        roster
            .update_criterion_description(&admin(), "p1", 3, "Live demo")
            .unwrap();
        roster
            .set_proposal_link(&admin(), "p1", Some("https://example.com/deck".into()))
            .unwrap();

        let proposal = roster.proposal("p1").unwrap();
        assert_eq!(proposal.name, "Budget tracker");
        assert_eq!(proposal.criterion_descriptions[3], "Live demo");
        assert_eq!(proposal.external_link.as_deref(), Some("https://example.com/deck"));

        roster
            .set_proposal_link(&admin(), "p1", Some("  ".into()))
            .unwrap();
        assert!(roster.proposal("p1").unwrap().external_link.is_none());

        assert!(matches!(
            roster.update_criterion_description(&admin(), "p1", 4, "x"),
            Err(RosterError::InvalidCriterion(4))
        ));
    }

    #[test]
    fn test_remove_entries() {
        let mut roster = seeded();
        let removed = roster.remove_participant(&admin(), "ana").unwrap();
        assert_eq!(removed.display_name, "Ana");
        assert!(roster.participant("ana").is_none());

        roster.remove_proposal(&admin(), "p1").unwrap();
        assert!(roster.proposals.is_empty());
    }

    #[test]
    fn test_standings_ignore_removed_participant() {
        use crate::state::{CellKey, CriterionIndex, Score};

        let mut roster = seeded();
        roster
            .add_participant(&admin(), Participant::new("bruno", "Bruno"))
            .unwrap();
        let mut snapshot = VotesSnapshot::new();
        for (voter, value) in [("ana", 5), ("bruno", 1)] {
            for criterion in CriterionIndex::all() {
                snapshot.set(&CellKey::new(voter, "p1", criterion), Score::new(value));
            }
        }
        assert_eq!(roster.standings(&snapshot).proposals[0].average, 12.0);

        roster.remove_participant(&admin(), "bruno").unwrap();
        assert_eq!(roster.standings(&snapshot).proposals[0].average, 20.0);
    }

    #[test]
    fn test_json_export_import() {
        let roster = seeded();
        let json = roster.to_json().unwrap();
        assert_eq!(Roster::from_json(&json).unwrap(), roster);
    }

    #[test]
    fn test_import_rejects_bad_input() {
        let three_criteria = r#"{"criteria":["a","b","c"],"participants":[],"proposals":[]}"#;
        assert!(matches!(
            Roster::from_json(three_criteria),
            Err(RosterError::Json(_))
        ));

        let duplicate = r#"{
            "criteria": ["a","b","c","d"],
            "participants": [
                {"id": "ana", "display_name": "Ana"},
                {"id": "ana", "display_name": "Ana again"}
            ],
            "proposals": []
        }"#;
        assert!(matches!(
            Roster::from_json(duplicate),
            Err(RosterError::DuplicateId(ref id)) if id == "ana"
        ));
    }
}
