//! Vote synchronization and aggregation engine
//!
//! Participants score proposals on four fixed criteria (1–5 each). This crate
//! keeps one shared matrix of those scores consistent between many clients
//! and a remote row store, and derives rankings from it.
//!
//! # Components
//!
//! - `state`: validated ids, scores and the nested `VotesSnapshot`
//! - `codec`: snapshot ⇄ flat `{voter_id, proposal_id, criterion_index, score}` rows
//! - `aggregate`: sums, team averages, ranking and winner
//! - `remote`: `VoteStore` trait, PostgREST and in-memory stores, and the
//!   `RemoteSyncClient` that classifies failures
//! - `reconcile`: optimistic writes, refresh ordering and change subscriptions
//! - `status`: online / offline / error reporting
//! - `roster`: admin-edited participants, proposals and criteria
//! - `events`: change notices, broadcast bus and polling feed
//!
//! # Usage
//!
//! ```ignore
//! use vote_sync::{Actor, PollingFeed, ReconciliationController, RemoteSyncClient, RestVoteStore, SyncConfig};
//!
//! let config = SyncConfig::default();
//! let store = RestVoteStore::from_config(&config)?;
//! let client = RemoteSyncClient::new(store).with_optional_columns(config.optional_columns.clone());
//! let controller = ReconciliationController::new(client).shared();
//!
//! let feed = PollingFeed::spawn(config.poll_interval());
//! let _subscription = controller.subscribe(feed.subscribe());
//! controller.refresh().await?;
//!
//! controller.cast_vote(&Actor::member("ana"), "ana", "p1", 0, 4).await?;
//! ```

pub mod aggregate;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod reconcile;
pub mod remote;
pub mod roster;
pub mod state;
pub mod status;
pub mod telemetry;

// Re-export key state types
pub use state::{
    Actor, CellKey, CriterionIndex, Participant, ParticipantId, Proposal, ProposalId, Role, Score,
    VotesSnapshot, CRITERIA_COUNT,
};

// Re-export aggregation types
pub use aggregate::{ProposalStanding, RankedProposal, Standings};

// Re-export error types
pub use error::{ErrorClass, StoreErrorKind, SyncError, SyncResult};

// Re-export remote types
pub use remote::{MemoryVoteStore, RawStoreError, RemoteSyncClient, RestVoteStore, VoteStore};

// Re-export reconciliation types
pub use reconcile::{
    CellPhase, ReconciliationController, RefreshOutcome, SharedController, Subscription,
};

// Re-export event types
pub use events::{ChangeBus, ChangeNotice, PollingFeed};

pub use config::SyncConfig;
pub use roster::{Roster, RosterError, RosterResult};
pub use status::{StatusReporter, SyncState, SyncStatus};
