//! End-to-end sync tests against the in-memory store.
//!
//! Covers convergence between controllers sharing one store, the narrowed
//! write retry, proposal purges, full resets, polling feeds, stale refresh
//! ordering and offline behaviour.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{oneshot, Notify};
use vote_sync::remote::{RowPayload, REQUIRED_COLUMNS, UPDATED_AT};
use vote_sync::{
    Actor, CellKey, CellPhase, CriterionIndex, MemoryVoteStore, PollingFeed, RawStoreError,
    ReconciliationController, RefreshOutcome, RemoteSyncClient, Score, SyncError, SyncState,
    VoteStore, VotesSnapshot,
};

const WAIT: Duration = Duration::from_secs(5);

fn cell(participant: &str, proposal: &str, criterion: u8) -> CellKey {
    CellKey::new(participant, proposal, CriterionIndex::new(criterion).unwrap())
}

fn score(value: u8) -> Score {
    Score::new(value).unwrap()
}

fn row(voter: &str, proposal: &str, criterion: u8, score: u8) -> RowPayload {
    json!({"voter_id": voter, "proposal_id": proposal, "criterion_index": criterion, "score": score})
        .as_object()
        .cloned()
        .unwrap()
}

fn controller_for<S: VoteStore + 'static>(store: S) -> Arc<ReconciliationController<S>> {
    ReconciliationController::new(RemoteSyncClient::new(store)).shared()
}

/// Wait until `check` holds for the controller's snapshot.
async fn wait_for<S, F>(controller: &ReconciliationController<S>, check: F)
where
    S: VoteStore + 'static,
    F: Fn(&VotesSnapshot) -> bool,
{
    let mut rx = controller.watch_snapshot();
    tokio::time::timeout(WAIT, async {
        loop {
            if check(&rx.borrow_and_update()) {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("snapshot never reached the expected state");
}

// ── Convergence ────────────────────────────────────────────────────

#[tokio::test]
async fn two_controllers_converge_through_notices() {
    let store = MemoryVoteStore::new().shared();
    let ana_view = controller_for(store.clone());
    let bruno_view = controller_for(store.clone());
    let _ana_sub = ana_view.subscribe(store.subscribe());
    let _bruno_sub = bruno_view.subscribe(store.subscribe());

    let phase = ana_view
        .cast_vote(&Actor::member("ana"), "ana", "portfolio", 0, 4)
        .await
        .unwrap();
    assert_eq!(phase, CellPhase::Confirmed { value: score(4) });

    wait_for(&bruno_view, |s| s.get(&cell("ana", "portfolio", 0)) == Some(score(4))).await;

    bruno_view
        .cast_vote(&Actor::member("bruno"), "bruno", "portfolio", 0, 2)
        .await
        .unwrap();
    wait_for(&ana_view, |s| s.get(&cell("bruno", "portfolio", 0)) == Some(score(2))).await;

    assert_eq!(ana_view.snapshot().len(), 2);
    assert_eq!(store.row_count(), 2);
}

#[tokio::test]
async fn later_writer_wins_on_same_cell() {
    let store = MemoryVoteStore::new().shared();
    let first = controller_for(store.clone());
    let second = controller_for(store.clone());
    let admin = Actor::admin("carla");

    first.cast_vote(&admin, "ana", "p1", 1, 4).await.unwrap();
    second.cast_vote(&admin, "ana", "p1", 1, 3).await.unwrap();

    first.refresh().await.unwrap();
    assert_eq!(first.snapshot().get(&cell("ana", "p1", 1)), Some(score(3)));
    assert_eq!(store.row_count(), 1);
}

#[tokio::test]
async fn padded_ids_read_back_verbatim() {
    let store = MemoryVoteStore::new().shared();
    let controller = controller_for(store.clone());

    let phase = controller
        .cast_vote(&Actor::member("ana "), "ana ", "p1", 0, 4)
        .await
        .unwrap();

    assert_eq!(phase, CellPhase::Confirmed { value: score(4) });
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.get(&cell("ana ", "p1", 0)), Some(score(4)));
    assert_eq!(snapshot.get(&cell("ana", "p1", 0)), None);
    assert_eq!(store.row_count(), 1);
}

// ── Narrowed retry ─────────────────────────────────────────────────

#[tokio::test]
async fn write_succeeds_without_optional_column() {
    let store = MemoryVoteStore::new()
        .with_columns(REQUIRED_COLUMNS)
        .shared();
    let controller = controller_for(store.clone());

    let phase = controller
        .cast_vote(&Actor::member("ana"), "ana", "p1", 3, 5)
        .await
        .unwrap();

    assert_eq!(phase, CellPhase::Confirmed { value: score(5) });
    assert!(controller.status().is_online());
    assert!(!store.row("ana", "p1", 3).unwrap().contains_key(UPDATED_AT));

    // Column stays dropped for later writes
    controller
        .cast_vote(&Actor::member("ana"), "ana", "p1", 2, 1)
        .await
        .unwrap();
    assert!(controller.client().active_optional_columns().is_empty());
}

// ── Purge ──────────────────────────────────────────────────────────

#[tokio::test]
async fn purge_reaches_other_controllers() {
    let store = MemoryVoteStore::new().shared();
    let admin_view = controller_for(store.clone());
    let member_view = controller_for(store.clone());
    let _sub = member_view.subscribe(store.subscribe());

    for (voter, proposal) in [("ana", "p1"), ("bruno", "p1"), ("ana", "p2")] {
        store.upsert_row(row(voter, proposal, 0, 3)).await.unwrap();
    }
    wait_for(&member_view, |s| s.len() == 3).await;

    let removed = admin_view
        .purge_proposal(&Actor::admin("carla"), "p1")
        .await
        .unwrap();
    assert_eq!(removed, 2);

    wait_for(&member_view, |s| s.len() == 1).await;
    assert_eq!(member_view.snapshot().get(&cell("ana", "p2", 0)), Some(score(3)));
}

// ── Reset ──────────────────────────────────────────────────────────

#[tokio::test]
async fn reset_empties_every_controller() {
    let store = MemoryVoteStore::new().shared();
    let admin_view = controller_for(store.clone());
    let member_view = controller_for(store.clone());
    let _sub = member_view.subscribe(store.subscribe());

    for (voter, proposal, criterion) in [("ana", "p1", 0), ("bruno", "p1", 2), ("ana", "p2", 3)] {
        store.upsert_row(row(voter, proposal, criterion, 4)).await.unwrap();
    }
    wait_for(&member_view, |s| s.len() == 3).await;

    let err = member_view
        .reset_votes(&Actor::member("ana"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Permission(_)));
    assert_eq!(store.row_count(), 3);

    let removed = admin_view
        .reset_votes(&Actor::admin("carla"))
        .await
        .unwrap();
    assert_eq!(removed, 3);
    assert!(admin_view.snapshot().is_empty());

    wait_for(&member_view, |s| s.is_empty()).await;
    assert_eq!(store.row_count(), 0);
}

// ── Polling feed ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn polling_feed_picks_up_foreign_writes() {
    let store = MemoryVoteStore::new().shared();
    let controller = controller_for(store.clone());
    let feed = PollingFeed::spawn(Duration::from_secs(1));
    let subscription = controller.subscribe(feed.subscribe());

    // Written behind the controller's back; only a poll can reveal it
    store.upsert_row(row("bruno", "p1", 2, 4)).await.unwrap();
    assert!(controller.snapshot().is_empty());

    wait_for(&controller, |s| s.get(&cell("bruno", "p1", 2)) == Some(score(4))).await;

    subscription.shutdown().await;
    feed.shutdown().await;
}

#[tokio::test]
async fn closed_feed_ends_subscription() {
    let controller = controller_for(MemoryVoteStore::new().shared());
    let (tx, rx) = tokio::sync::broadcast::channel(4);
    let subscription = controller.subscribe(rx);

    drop(tx);
    tokio::time::timeout(WAIT, async {
        while subscription.is_active() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

// ── Stale refresh ──────────────────────────────────────────────────

/// Memory store whose fetches can be held back after reading their rows.
#[derive(Default)]
struct GatedStore {
    inner: MemoryVoteStore,
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    entered: Notify,
}

impl GatedStore {
    fn hold_next_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }
}

#[async_trait]
impl VoteStore for GatedStore {
    async fn fetch_rows(&self) -> Result<Vec<Value>, RawStoreError> {
        let gate = self.gates.lock().unwrap().pop_front();
        let rows = self.inner.fetch_rows().await;
        self.entered.notify_one();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        rows
    }

    async fn upsert_row(&self, row: RowPayload) -> Result<(), RawStoreError> {
        self.inner.upsert_row(row).await
    }

    async fn delete_proposal(&self, proposal_id: &str) -> Result<u64, RawStoreError> {
        self.inner.delete_proposal(proposal_id).await
    }

    async fn delete_all(&self) -> Result<u64, RawStoreError> {
        self.inner.delete_all().await
    }
}

#[tokio::test]
async fn older_refresh_response_is_discarded() {
    let store = Arc::new(GatedStore::default());
    let controller = controller_for(store.clone());

    store.inner.upsert_row(row("ana", "p1", 0, 1)).await.unwrap();
    let release = store.hold_next_fetch();

    let slow = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.refresh().await })
    };
    // The slow refresh has read the old rows and is parked
    store.entered.notified().await;

    store.inner.upsert_row(row("ana", "p1", 0, 5)).await.unwrap();
    let fast = controller.refresh().await.unwrap();
    assert!(matches!(fast, RefreshOutcome::Applied { .. }));

    release.send(()).unwrap();
    let slow = slow.await.unwrap().unwrap();

    assert_eq!(slow, RefreshOutcome::Stale);
    assert_eq!(controller.snapshot().get(&cell("ana", "p1", 0)), Some(score(5)));
}

#[tokio::test]
async fn refresh_during_write_keeps_optimistic_value() {
    let store = Arc::new(GatedStore::default());
    let controller = controller_for(store.clone());
    let release = store.hold_next_fetch();

    // Refresh issued before the vote reads an empty table
    let early = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.refresh().await })
    };
    store.entered.notified().await;

    let phase = controller
        .cast_vote(&Actor::member("ana"), "ana", "p1", 0, 4)
        .await
        .unwrap();
    assert_eq!(phase, CellPhase::Confirmed { value: score(4) });

    release.send(()).unwrap();
    assert_eq!(early.await.unwrap().unwrap(), RefreshOutcome::Stale);
    assert_eq!(controller.snapshot().get(&cell("ana", "p1", 0)), Some(score(4)));
}

// ── Offline ────────────────────────────────────────────────────────

/// Memory store that can be switched to refuse connections.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryVoteStore,
    offline: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> Result<(), RawStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RawStoreError::network("error sending request: connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VoteStore for FlakyStore {
    async fn fetch_rows(&self) -> Result<Vec<Value>, RawStoreError> {
        self.check()?;
        self.inner.fetch_rows().await
    }

    async fn upsert_row(&self, row: RowPayload) -> Result<(), RawStoreError> {
        self.check()?;
        self.inner.upsert_row(row).await
    }

    async fn delete_proposal(&self, proposal_id: &str) -> Result<u64, RawStoreError> {
        self.check()?;
        self.inner.delete_proposal(proposal_id).await
    }

    async fn delete_all(&self) -> Result<u64, RawStoreError> {
        self.check()?;
        self.inner.delete_all().await
    }
}

#[tokio::test]
async fn offline_vote_kept_until_next_refresh() {
    let store = Arc::new(FlakyStore::default());
    let controller = controller_for(store.clone());
    let mut status = controller.watch_status();

    store.offline.store(true, Ordering::SeqCst);
    let err = controller
        .cast_vote(&Actor::member("ana"), "ana", "p1", 0, 5)
        .await
        .unwrap_err();

    assert!(err.is_connectivity());
    assert!(!err.user_message().contains("refused"));
    assert_eq!(status.borrow_and_update().state, SyncState::Offline);
    assert_eq!(controller.snapshot().get(&cell("ana", "p1", 0)), Some(score(5)));

    // Back online: the unsent vote is not in remote truth and is lost
    store.offline.store(false, Ordering::SeqCst);
    controller.refresh().await.unwrap();

    assert_eq!(status.borrow_and_update().state, SyncState::Online);
    assert_eq!(controller.snapshot().get(&cell("ana", "p1", 0)), None);
    assert_eq!(
        controller.cell_phase(&cell("ana", "p1", 0)),
        CellPhase::Reverted {
            local: score(5),
            remote: None
        }
    );
}
