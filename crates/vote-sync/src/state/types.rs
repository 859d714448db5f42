//! Core domain types for vote synchronization
//!
//! Identifiers, the validated score and criterion newtypes, the natural key
//! of a vote cell, and the participant/proposal records shared by every
//! other module.

use serde::{Deserialize, Serialize};

/// Stable identifier of a participant (the join key for votes)
pub type ParticipantId = String;

/// Identifier of a proposal
pub type ProposalId = String;

/// Number of rubric dimensions every proposal is scored on
pub const CRITERIA_COUNT: usize = 4;

/// A value fell outside the range its type accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{what} out of range: {value}")]
pub struct OutOfRange {
    pub what: &'static str,
    pub value: u64,
}

/// Index of a rubric criterion, always in `0..CRITERIA_COUNT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CriterionIndex(u8);

impl CriterionIndex {
    /// Build a criterion index, `None` when outside `0..CRITERIA_COUNT`
    pub fn new(index: u8) -> Option<Self> {
        ((index as usize) < CRITERIA_COUNT).then_some(Self(index))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// All criteria in rubric order
    pub fn all() -> impl Iterator<Item = CriterionIndex> {
        (0..CRITERIA_COUNT as u8).map(CriterionIndex)
    }
}

impl TryFrom<u8> for CriterionIndex {
    type Error = OutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(OutOfRange {
            what: "criterion index",
            value: value as u64,
        })
    }
}

impl From<CriterionIndex> for u8 {
    fn from(index: CriterionIndex) -> Self {
        index.0
    }
}

impl std::fmt::Display for CriterionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cast score in `1..=5`.
///
/// "Not voted" is modelled as the absence of a `Score`, never as a zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Build a score, `None` when outside `1..=5`
    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = OutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(OutOfRange {
            what: "score",
            value: value as u64,
        })
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Natural key of a vote cell: at most one score exists per key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub participant_id: ParticipantId,
    pub proposal_id: ProposalId,
    pub criterion: CriterionIndex,
}

impl CellKey {
    pub fn new(
        participant_id: impl Into<ParticipantId>,
        proposal_id: impl Into<ProposalId>,
        criterion: CriterionIndex,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            proposal_id: proposal_id.into(),
            criterion,
        }
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/#{}",
            self.participant_id, self.proposal_id, self.criterion
        )
    }
}

/// A person who scores proposals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
}

impl Participant {
    pub fn new(id: impl Into<ParticipantId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A proposal under evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub name: String,
    /// Per-criterion analysis text, in rubric order
    pub criterion_descriptions: [String; CRITERIA_COUNT],
    /// Link to an external document (PDF, slides, drive folder)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_link: Option<String>,
}

impl Proposal {
    /// Create a proposal with empty criterion descriptions
    pub fn new(id: impl Into<ProposalId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            criterion_descriptions: Default::default(),
            external_link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.external_link = Some(link.into());
        self
    }

    pub fn with_descriptions(mut self, descriptions: [String; CRITERIA_COUNT]) -> Self {
        self.criterion_descriptions = descriptions;
        self
    }
}

/// Role of the authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May only cast their own votes
    Member,
    /// May vote on behalf of anyone and edit the roster
    Admin,
}

/// The authenticated caller on whose behalf operations run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub participant_id: ParticipantId,
    pub role: Role,
}

impl Actor {
    pub fn member(participant_id: impl Into<ParticipantId>) -> Self {
        Self {
            participant_id: participant_id.into(),
            role: Role::Member,
        }
    }

    pub fn admin(participant_id: impl Into<ParticipantId>) -> Self {
        Self {
            participant_id: participant_id.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether this actor owns (or may override) the votes of `participant_id`
    pub fn can_vote_for(&self, participant_id: &str) -> bool {
        self.is_admin() || self.participant_id == participant_id
    }
}
