//! Boundary trait for the remote vote store
//!
//! Implementations speak to the actual store and report failures as
//! [`RawStoreError`]. They do not classify failures; the
//! [`RemoteSyncClient`](super::RemoteSyncClient) does that.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Flat column → value payload of one row
pub type RowPayload = Map<String, Value>;

/// Unclassified failure reported by a store implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RawStoreError {
    /// The request never got an answer (connect, DNS, timeout, TLS)
    #[error("network failure: {detail}")]
    Network { detail: String },

    /// The store answered and refused the request
    #[error("rejected (status {status:?}, code {code:?}): {message}")]
    Rejected {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },
}

impl RawStoreError {
    pub fn network(detail: impl Into<String>) -> Self {
        Self::Network {
            detail: detail.into(),
        }
    }

    pub fn rejected(status: Option<u16>, code: Option<&str>, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            code: code.map(str::to_string),
            message: message.into(),
        }
    }
}

/// The remote collaborator holding the durable vote table
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Read every row of the vote table
    async fn fetch_rows(&self) -> Result<Vec<Value>, RawStoreError>;

    /// Insert or replace the row identified by the natural key
    /// (`voter_id`, `proposal_id`, `criterion_index`)
    async fn upsert_row(&self, row: RowPayload) -> Result<(), RawStoreError>;

    /// Delete every row of a proposal, returning how many were removed
    async fn delete_proposal(&self, proposal_id: &str) -> Result<u64, RawStoreError>;

    /// Delete every row of the table, returning how many were removed
    async fn delete_all(&self) -> Result<u64, RawStoreError>;
}

#[async_trait]
impl<S: VoteStore + ?Sized> VoteStore for Arc<S> {
    async fn fetch_rows(&self) -> Result<Vec<Value>, RawStoreError> {
        (**self).fetch_rows().await
    }

    async fn upsert_row(&self, row: RowPayload) -> Result<(), RawStoreError> {
        (**self).upsert_row(row).await
    }

    async fn delete_proposal(&self, proposal_id: &str) -> Result<u64, RawStoreError> {
        (**self).delete_proposal(proposal_id).await
    }

    async fn delete_all(&self) -> Result<u64, RawStoreError> {
        (**self).delete_all().await
    }
}
