//! Optimistic write reconciliation
//!
//! ```text
//!  cast_vote ──▶ snapshot (optimistic) ──▶ write_cell ──┬─ ok ──────▶ refresh ─▶ Confirmed / Reverted
//!                                                       ├─ transport ─▶ keep value, status offline
//!                                                       └─ store ─────▶ refresh (rollback), status error
//!
//!  change feed ──▶ Subscription listener ──▶ refresh
//! ```
//!
//! - `controller`: [`ReconciliationController`], the single owner of the
//!   votes snapshot
//! - `phase`: per-cell [`CellPhase`] tracking
//! - `subscription`: cancellable [`Subscription`] handle

pub mod controller;
pub mod phase;
pub mod subscription;

// Re-export core types
pub use controller::{ReconciliationController, RefreshOutcome, SharedController};
pub use phase::CellPhase;
pub use subscription::Subscription;
