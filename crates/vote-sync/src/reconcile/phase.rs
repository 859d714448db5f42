//! Per-cell write phases
//!
//! ```text
//!            cast_vote             refresh after write settles
//!   Unset ─────────────▶ Pending ─────────────────────────────┬─▶ Confirmed
//!                           ▲                                 └─▶ Reverted
//!                           └──────── next cast_vote ◀────────────┘
//! ```
//!
//! A cell stays `Pending` while any write for it is in flight, and for every
//! refresh that was issued before its last write finished. Only a refresh
//! issued afterwards can observe the write and resolve the phase.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::state::{CellKey, Score, VotesSnapshot};

/// Observable write state of one cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum CellPhase {
    /// Never written from this controller
    #[default]
    Unset,
    /// Optimistically applied, not yet seen in remote truth
    Pending { value: Score },
    /// Remote truth matched the optimistic value
    Confirmed { value: Score },
    /// Remote truth differed; the snapshot shows `remote`
    Reverted { local: Score, remote: Option<Score> },
}

impl CellPhase {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Confirmed and reverted cells only leave their phase on the next cast.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Confirmed { .. } | Self::Reverted { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Pending { .. } => "pending",
            Self::Confirmed { .. } => "confirmed",
            Self::Reverted { .. } => "reverted",
        }
    }
}

#[derive(Debug, Clone)]
struct TrackedCell {
    phase: CellPhase,
    /// Last optimistically applied value
    local: Score,
    /// Writes started but not yet finished
    in_flight: u32,
    /// Highest refresh generation issued when a write last finished
    settled_at: u64,
}

/// Phase bookkeeping for every cell this controller has written
#[derive(Debug, Default)]
pub(crate) struct PhaseTracker {
    cells: HashMap<CellKey, TrackedCell>,
}

impl PhaseTracker {
    pub(crate) fn phase(&self, key: &CellKey) -> CellPhase {
        self.cells.get(key).map_or(CellPhase::Unset, |c| c.phase)
    }

    /// Record an optimistic write about to be sent
    pub(crate) fn begin(&mut self, key: &CellKey, value: Score) {
        let cell = self.cells.entry(key.clone()).or_insert(TrackedCell {
            phase: CellPhase::Unset,
            local: value,
            in_flight: 0,
            settled_at: 0,
        });
        cell.phase = CellPhase::Pending { value };
        cell.local = value;
        cell.in_flight += 1;
    }

    /// Record that a write returned, successfully or not
    pub(crate) fn finish(&mut self, key: &CellKey, issued_generation: u64) {
        if let Some(cell) = self.cells.get_mut(key) {
            cell.in_flight = cell.in_flight.saturating_sub(1);
            cell.settled_at = cell.settled_at.max(issued_generation);
        }
    }

    /// Overlay still-pending values onto a fetched snapshot and resolve the
    /// cells the fetch can vouch for. Returns how many cells resolved.
    pub(crate) fn reconcile(&mut self, generation: u64, fetched: &mut VotesSnapshot) -> usize {
        let mut resolved = 0;
        for (key, cell) in self.cells.iter_mut() {
            if !cell.phase.is_pending() {
                continue;
            }
            if cell.in_flight > 0 || generation <= cell.settled_at {
                fetched.set(key, Some(cell.local));
                continue;
            }

            let remote = fetched.get(key);
            cell.phase = if remote == Some(cell.local) {
                CellPhase::Confirmed { value: cell.local }
            } else {
                CellPhase::Reverted {
                    local: cell.local,
                    remote,
                }
            };
            resolved += 1;
        }
        resolved
    }

    /// Drop tracking for every cell of a proposal
    pub(crate) fn forget_proposal(&mut self, proposal_id: &str) -> usize {
        let before = self.cells.len();
        self.cells.retain(|key, _| key.proposal_id != proposal_id);
        before - self.cells.len()
    }

    /// Drop tracking for every cell
    pub(crate) fn clear(&mut self) -> usize {
        let forgotten = self.cells.len();
        self.cells.clear();
        forgotten
    }

    /// Cells currently pending
    pub(crate) fn pending_count(&self) -> usize {
        self.cells.values().filter(|c| c.phase.is_pending()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CriterionIndex;

    fn key(proposal: &str) -> CellKey {
        CellKey::new("ana", proposal, CriterionIndex::new(0).unwrap())
    }

    fn score(v: u8) -> Score {
        Score::new(v).unwrap()
    }

    #[test]
    fn test_untracked_is_unset() {
        let tracker = PhaseTracker::default();
        assert_eq!(tracker.phase(&key("p1")), CellPhase::Unset);
    }

    #[test]
    fn test_in_flight_overlays() {
        let mut tracker = PhaseTracker::default();
        tracker.begin(&key("p1"), score(4));

        let mut fetched = VotesSnapshot::new();
        assert_eq!(tracker.reconcile(1, &mut fetched), 0);
        assert_eq!(fetched.get(&key("p1")), Some(score(4)));
        assert!(tracker.phase(&key("p1")).is_pending());
    }

    #[test]
    fn test_refresh_issued_before_finish_overlays() {
        let mut tracker = PhaseTracker::default();
        tracker.begin(&key("p1"), score(4));
        tracker.finish(&key("p1"), 3);

        let mut fetched = VotesSnapshot::new();
        tracker.reconcile(3, &mut fetched);
        assert_eq!(fetched.get(&key("p1")), Some(score(4)));
        assert!(tracker.phase(&key("p1")).is_pending());
    }

    #[test]
    fn test_confirm_and_revert() {
        let mut tracker = PhaseTracker::default();
        tracker.begin(&key("p1"), score(4));
        tracker.begin(&key("p2"), score(4));
        tracker.finish(&key("p1"), 0);
        tracker.finish(&key("p2"), 0);

        let mut fetched = VotesSnapshot::new();
        fetched.set(&key("p1"), Some(score(4)));
        fetched.set(&key("p2"), Some(score(3)));

        assert_eq!(tracker.reconcile(1, &mut fetched), 2);
        assert_eq!(tracker.phase(&key("p1")), CellPhase::Confirmed { value: score(4) });
        assert_eq!(
            tracker.phase(&key("p2")),
            CellPhase::Reverted {
                local: score(4),
                remote: Some(score(3))
            }
        );
        // Remote truth stands for reverted cells
        assert_eq!(fetched.get(&key("p2")), Some(score(3)));
    }

    #[test]
    fn test_settled_phase_is_terminal_until_next_cast() {
        let mut tracker = PhaseTracker::default();
        tracker.begin(&key("p1"), score(2));
        tracker.finish(&key("p1"), 0);
        let mut fetched = VotesSnapshot::new();
        tracker.reconcile(1, &mut fetched);
        assert!(tracker.phase(&key("p1")).is_settled());

        // A later refresh with different data does not touch it
        let mut later = VotesSnapshot::new();
        later.set(&key("p1"), Some(score(2)));
        assert_eq!(tracker.reconcile(2, &mut later), 0);
        assert_eq!(
            tracker.phase(&key("p1")),
            CellPhase::Reverted {
                local: score(2),
                remote: None
            }
        );

        tracker.begin(&key("p1"), score(5));
        assert_eq!(tracker.phase(&key("p1")), CellPhase::Pending { value: score(5) });
    }

    #[test]
    fn test_overlapping_writes_stay_pending() {
        let mut tracker = PhaseTracker::default();
        tracker.begin(&key("p1"), score(2));
        tracker.begin(&key("p1"), score(3));
        tracker.finish(&key("p1"), 0);

        let mut fetched = VotesSnapshot::new();
        fetched.set(&key("p1"), Some(score(2)));
        tracker.reconcile(1, &mut fetched);

        assert_eq!(fetched.get(&key("p1")), Some(score(3)));
        assert_eq!(tracker.pending_count(), 1);
    }

    #[test]
    fn test_forget_proposal() {
        let mut tracker = PhaseTracker::default();
        tracker.begin(&key("p1"), score(2));
        tracker.begin(&key("p2"), score(2));
        assert_eq!(tracker.forget_proposal("p1"), 1);
        assert_eq!(tracker.phase(&key("p1")), CellPhase::Unset);
        assert!(tracker.phase(&key("p2")).is_pending());
    }

    #[test]
    fn test_clear_forgets_everything() {
        let mut tracker = PhaseTracker::default();
        tracker.begin(&key("p1"), score(2));
        tracker.begin(&key("p2"), score(5));
        assert_eq!(tracker.clear(), 2);
        assert_eq!(tracker.pending_count(), 0);
        assert_eq!(tracker.phase(&key("p2")), CellPhase::Unset);
    }

    #[test]
    fn test_phase_serializes_tagged() {
        let json = serde_json::to_value(CellPhase::Confirmed { value: score(4) }).unwrap();
        assert_eq!(json["phase"], "confirmed");
        assert_eq!(json["value"], 4);
    }
}
