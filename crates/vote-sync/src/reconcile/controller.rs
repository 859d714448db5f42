//! Reconciliation controller - owns the votes snapshot and keeps it in step
//! with the remote store
//!
//! Writes are applied optimistically, sent, then confirmed by a full refresh.
//! Refreshes are tagged with a generation number; an older response arriving
//! after a newer one has been applied is discarded.
//!
//! The authoritative snapshot lives under the `inner` lock and is mirrored
//! into a `watch` channel for readers. Every change is stamped with a version
//! under the lock and published after the lock is released; the publisher
//! skips versions older than the last one sent, so readers never see the
//! snapshot move backwards and a held `watch` borrow never blocks the lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ErrorClass, SyncError, SyncResult};
use crate::events::ChangeNotice;
use crate::remote::{RemoteSyncClient, VoteStore};
use crate::state::{Actor, CellKey, CriterionIndex, Score, VotesSnapshot};
use crate::status::{StatusReporter, SyncStatus};

use super::phase::{CellPhase, PhaseTracker};
use super::subscription::Subscription;

/// Shared reference to a ReconciliationController
pub type SharedController<S> = Arc<ReconciliationController<S>>;

/// What a refresh did with its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The fetched snapshot replaced the local one
    Applied {
        /// Cells in the new snapshot
        cells: usize,
        /// Pending cells that became confirmed or reverted
        resolved: usize,
    },
    /// A newer refresh had already been applied
    Stale,
}

#[derive(Debug, Default)]
struct Inner {
    phases: PhaseTracker,
    applied_generation: u64,
    snapshot: Arc<VotesSnapshot>,
    /// Bumped on every snapshot change
    version: u64,
}

impl Inner {
    /// Stamp the current snapshot for publishing
    fn stamp(&mut self) -> (u64, Arc<VotesSnapshot>) {
        self.version += 1;
        (self.version, self.snapshot.clone())
    }
}

/// Single owner of the votes snapshot
pub struct ReconciliationController<S> {
    client: RemoteSyncClient<S>,
    snapshot: watch::Sender<Arc<VotesSnapshot>>,
    inner: Mutex<Inner>,
    /// Highest snapshot version sent on the watch channel
    published: AtomicU64,
    next_generation: AtomicU64,
    status: StatusReporter,
    active: Mutex<Option<CancellationToken>>,
}

impl<S: VoteStore + 'static> ReconciliationController<S> {
    /// Create a controller with an empty snapshot
    pub fn new(client: RemoteSyncClient<S>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(VotesSnapshot::new()));
        Self {
            client,
            snapshot,
            inner: Mutex::new(Inner::default()),
            published: AtomicU64::new(0),
            next_generation: AtomicU64::new(0),
            status: StatusReporter::new(),
            active: Mutex::new(None),
        }
    }

    pub fn shared(self) -> SharedController<S> {
        Arc::new(self)
    }

    pub fn client(&self) -> &RemoteSyncClient<S> {
        &self.client
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<VotesSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified whenever the snapshot changes
    pub fn watch_snapshot(&self) -> watch::Receiver<Arc<VotesSnapshot>> {
        self.snapshot.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.current()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.watch()
    }

    pub fn cell_phase(&self, key: &CellKey) -> CellPhase {
        self.lock_inner().phases.phase(key)
    }

    /// Cells with a write not yet confirmed or reverted
    pub fn pending_cells(&self) -> usize {
        self.lock_inner().phases.pending_count()
    }

    // ── Writes ────────────────────────────────────────────────────────────

    /// Cast (or change) one score.
    ///
    /// The snapshot reflects the new score before this first suspends. On a
    /// transport failure the optimistic value is kept; on a store rejection
    /// the snapshot is rolled back to remote truth.
    pub async fn cast_vote(
        &self,
        actor: &Actor,
        participant_id: &str,
        proposal_id: &str,
        criterion: u8,
        score: u8,
    ) -> SyncResult<CellPhase> {
        if !actor.can_vote_for(participant_id) {
            debug!(
                actor = %actor.participant_id,
                participant_id,
                "Vote rejected: not the cell owner"
            );
            return Err(SyncError::Permission(format!(
                "{} cannot vote for {}",
                actor.participant_id, participant_id
            )));
        }
        let criterion = CriterionIndex::new(criterion)
            .ok_or_else(|| SyncError::InvalidCell(format!("criterion index {criterion}")))?;
        let score =
            Score::new(score).ok_or_else(|| SyncError::InvalidCell(format!("score {score}")))?;
        if participant_id.trim().is_empty() || proposal_id.trim().is_empty() {
            return Err(SyncError::InvalidCell(format!(
                "blank id (participant {participant_id:?}, proposal {proposal_id:?})"
            )));
        }

        let key = CellKey::new(participant_id, proposal_id, criterion);
        self.apply_optimistic(&key, score);
        debug!(cell = %key, score = score.get(), "Optimistic write applied");

        let written = self.client.write_cell(&key, score).await;
        self.finish_write(&key);

        match written {
            Ok(()) => {
                self.status.record_success();
                if let Err(e) = self.refresh().await {
                    debug!(cell = %key, error = %e, "Confirmation refresh failed");
                }
                let phase = self.cell_phase(&key);
                info!(cell = %key, phase = phase.name(), "Vote written");
                Ok(phase)
            }
            Err(e) => match e.class() {
                ErrorClass::Connectivity => {
                    warn!(cell = %key, error = %e, "Vote kept locally; store unreachable");
                    self.status.record_local_only(&e);
                    Err(e)
                }
                ErrorClass::Store | ErrorClass::Local => {
                    warn!(cell = %key, error = %e, "Vote rejected by store; rolling back");
                    if let Err(refresh_err) = self.fetch_and_apply().await {
                        warn!(cell = %key, error = %refresh_err, "Rollback refresh failed");
                    }
                    self.status.record_failure(&e);
                    Err(e)
                }
            },
        }
    }

    /// Delete every cell of a proposal, remotely and locally. Admin only.
    pub async fn purge_proposal(&self, actor: &Actor, proposal_id: &str) -> SyncResult<u64> {
        if !actor.is_admin() {
            return Err(SyncError::Permission(format!(
                "{} cannot remove proposals",
                actor.participant_id
            )));
        }

        let removed = match self.client.delete_proposal(proposal_id).await {
            Ok(removed) => {
                self.status.record_success();
                removed
            }
            Err(e) => {
                self.status.record_failure(&e);
                return Err(e);
            }
        };

        let local = self.forget_proposal(proposal_id);
        info!(proposal_id, removed, local, "Proposal purged");

        if let Err(e) = self.refresh().await {
            debug!(proposal_id, error = %e, "Refresh after purge failed");
        }
        Ok(removed)
    }

    /// Delete every vote, remotely and locally. Admin only.
    pub async fn reset_votes(&self, actor: &Actor) -> SyncResult<u64> {
        if !actor.is_admin() {
            return Err(SyncError::Permission(format!(
                "{} cannot reset votes",
                actor.participant_id
            )));
        }

        let removed = match self.client.delete_all().await {
            Ok(removed) => {
                self.status.record_success();
                removed
            }
            Err(e) => {
                self.status.record_failure(&e);
                return Err(e);
            }
        };

        let local = self.forget_all();
        info!(removed, local, "All votes reset");

        if let Err(e) = self.refresh().await {
            debug!(error = %e, "Refresh after reset failed");
        }
        Ok(removed)
    }

    // ── Refresh ───────────────────────────────────────────────────────────

    /// Fetch remote truth and replace the snapshot with it.
    pub async fn refresh(&self) -> SyncResult<RefreshOutcome> {
        match self.fetch_and_apply().await {
            Ok(outcome) => {
                self.status.record_success();
                Ok(outcome)
            }
            Err(e) => {
                self.status.record_failure(&e);
                Err(e)
            }
        }
    }

    async fn fetch_and_apply(&self) -> SyncResult<RefreshOutcome> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let fetched = self.client.fetch_all().await?;
        Ok(self.apply(generation, fetched))
    }

    fn apply(&self, generation: u64, mut fetched: VotesSnapshot) -> RefreshOutcome {
        let (resolved, cells, stamped) = {
            let mut inner = self.lock_inner();
            if generation <= inner.applied_generation {
                debug!(
                    generation,
                    applied = inner.applied_generation,
                    "Discarding stale refresh"
                );
                return RefreshOutcome::Stale;
            }
            inner.applied_generation = generation;

            let resolved = inner.phases.reconcile(generation, &mut fetched);
            let cells = fetched.len();
            inner.snapshot = Arc::new(fetched);
            (resolved, cells, inner.stamp())
        };
        self.publish(stamped);

        debug!(generation, cells, resolved, "Refresh applied");
        RefreshOutcome::Applied { cells, resolved }
    }

    fn apply_optimistic(&self, key: &CellKey, score: Score) {
        let stamped = {
            let mut inner = self.lock_inner();
            inner.phases.begin(key, score);
            Arc::make_mut(&mut inner.snapshot).set(key, Some(score));
            inner.stamp()
        };
        self.publish(stamped);
    }

    fn finish_write(&self, key: &CellKey) {
        let issued = self.next_generation.load(Ordering::SeqCst);
        self.lock_inner().phases.finish(key, issued);
    }

    fn forget_proposal(&self, proposal_id: &str) -> usize {
        let (removed, stamped) = {
            let mut inner = self.lock_inner();
            inner.phases.forget_proposal(proposal_id);
            let removed = Arc::make_mut(&mut inner.snapshot).remove_proposal(proposal_id);
            (removed, inner.stamp())
        };
        self.publish(stamped);
        removed
    }

    fn forget_all(&self) -> usize {
        let (removed, stamped) = {
            let mut inner = self.lock_inner();
            inner.phases.clear();
            let removed = inner.snapshot.len();
            inner.snapshot = Arc::new(VotesSnapshot::new());
            (removed, inner.stamp())
        };
        self.publish(stamped);
        removed
    }

    /// Send a stamped snapshot to readers unless a newer one already went out.
    /// Must be called without holding `inner`.
    fn publish(&self, (version, snapshot): (u64, Arc<VotesSnapshot>)) {
        self.snapshot.send_if_modified(|current| {
            // Runs under the channel's write lock, so versions are serialized
            if version <= self.published.load(Ordering::Acquire) {
                return false;
            }
            self.published.store(version, Ordering::Release);
            if **current == *snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    // ── Subscription ──────────────────────────────────────────────────────

    /// Refresh on every notice from `feed` until unsubscribed.
    ///
    /// Replaces any earlier subscription on this controller. Lagging behind
    /// the feed counts as a notice; a closed feed ends the listener.
    pub fn subscribe(self: &Arc<Self>, mut feed: broadcast::Receiver<ChangeNotice>) -> Subscription {
        let token = CancellationToken::new();
        if let Some(previous) = self.lock_active().replace(token.clone()) {
            previous.cancel();
            debug!("Previous subscription replaced");
        }

        let controller = Arc::downgrade(self);
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = task_token.cancelled() => break,
                    received = feed.recv() => received,
                };
                match received {
                    Ok(notice) => debug!(event = notice.event_type(), "Change notice"),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change feed lagged; refreshing")
                    }
                    Err(RecvError::Closed) => {
                        info!("Change feed closed");
                        break;
                    }
                }

                let Some(controller) = controller.upgrade() else {
                    break;
                };
                if let Err(e) = controller.refresh().await {
                    debug!(error = %e, "Refresh after change notice failed");
                }
            }
            debug!("Subscription listener exited");
        });

        info!("Subscribed to change feed");
        Subscription::new(token, handle)
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
