//! Remote store access
//!
//! - `store`: the [`VoteStore`] boundary trait and [`RawStoreError`]
//! - `client`: [`RemoteSyncClient`], which fetches, writes, classifies
//!   failures and performs the narrowed-payload retry
//! - `rest`: PostgREST-over-HTTP store (`reqwest`)
//! - `memory`: in-process store with push notifications
//!
//! # Usage
//!
//! ```ignore
//! use vote_sync::config::SyncConfig;
//! use vote_sync::remote::{RemoteSyncClient, RestVoteStore};
//!
//! let config = SyncConfig::default();
//! let store = RestVoteStore::from_config(&config)?;
//! let client = RemoteSyncClient::new(store).with_optional_columns(config.optional_columns.clone());
//!
//! let snapshot = client.fetch_all().await?;
//! ```

pub mod client;
pub mod memory;
pub mod rest;
pub mod store;

// Re-export core types
pub use client::{classify, RemoteSyncClient, REQUIRED_COLUMNS, UPDATED_AT};
pub use memory::MemoryVoteStore;
pub use rest::RestVoteStore;
pub use store::{RawStoreError, RowPayload, VoteStore};
