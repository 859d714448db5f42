//! HTTP vote store speaking the PostgREST dialect
//!
//! - read: `GET {url}/rest/v1/{table}?select=*`
//! - upsert: `POST ...?on_conflict=voter_id,proposal_id,criterion_index` with
//!   `Prefer: resolution=merge-duplicates`, so concurrent writers converge on
//!   the last committed value per cell
//! - purge: `DELETE ...?proposal_id=eq.{id}`
//! - reset: `DELETE ...?voter_id=not.is.null` (PostgREST refuses an
//!   unfiltered delete)
//!
//! This store has no push channel; pair it with a
//! [`PollingFeed`](crate::events::PollingFeed).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::store::{RawStoreError, RowPayload, VoteStore};
use crate::codec::{NATURAL_KEY, VOTER_ID};
use crate::config::SyncConfig;

/// Longest slice of an unparseable error body kept in the message
const MAX_BODY_EXCERPT: usize = 200;

/// Error body PostgREST returns on rejection
#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

/// `reqwest`-backed client for a PostgREST vote table
#[derive(Debug, Clone)]
pub struct RestVoteStore {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RestVoteStore {
    /// Build a store for the configured endpoint and table
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client for the vote store")?;

        Ok(Self {
            http,
            endpoint: table_endpoint(&config.store_url, &config.table),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RawStoreError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| RawStoreError::network(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(parse_rejection(status, &body))
    }

    async fn json_rows(response: Response) -> Result<Vec<Value>, RawStoreError> {
        let status = response.status().as_u16();
        response.json::<Vec<Value>>().await.map_err(|e| {
            if e.is_decode() {
                RawStoreError::rejected(Some(status), None, format!("unexpected response body: {e}"))
            } else {
                RawStoreError::network(e.to_string())
            }
        })
    }
}

#[async_trait]
impl VoteStore for RestVoteStore {
    async fn fetch_rows(&self) -> Result<Vec<Value>, RawStoreError> {
        let request = self.http.get(&self.endpoint).query(&[("select", "*")]);
        let rows = Self::json_rows(self.send(request).await?).await?;
        debug!(rows = rows.len(), "Fetched vote rows");
        Ok(rows)
    }

    async fn upsert_row(&self, row: RowPayload) -> Result<(), RawStoreError> {
        let request = self
            .http
            .post(&self.endpoint)
            .query(&[("on_conflict", NATURAL_KEY.join(","))])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&Value::Object(row));
        self.send(request).await?;
        Ok(())
    }

    async fn delete_proposal(&self, proposal_id: &str) -> Result<u64, RawStoreError> {
        let request = self
            .http
            .delete(&self.endpoint)
            .query(&[("proposal_id", format!("eq.{}", proposal_id))])
            .header("Prefer", "return=representation");
        let removed = Self::json_rows(self.send(request).await?).await?;
        Ok(removed.len() as u64)
    }

    async fn delete_all(&self) -> Result<u64, RawStoreError> {
        let request = self
            .http
            .delete(&self.endpoint)
            .query(&[(VOTER_ID, "not.is.null")])
            .header("Prefer", "return=representation");
        let removed = Self::json_rows(self.send(request).await?).await?;
        debug!(removed = removed.len(), "Deleted every vote row");
        Ok(removed.len() as u64)
    }
}

/// `{base}/rest/v1/{table}` without doubled slashes
pub fn table_endpoint(base_url: &str, table: &str) -> String {
    format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table)
}

/// Turn a non-success response into a rejection, keeping the store's code
pub fn parse_rejection(status: u16, body: &str) -> RawStoreError {
    match serde_json::from_str::<PostgrestError>(body) {
        Ok(err) => {
            let mut message = err.message.unwrap_or_default();
            if let Some(details) = err.details.filter(|d| !d.is_empty()) {
                message = format!("{message} ({details})");
            }
            RawStoreError::Rejected {
                status: Some(status),
                code: err.code,
                message,
            }
        }
        Err(_) => {
            let excerpt: String = body.chars().take(MAX_BODY_EXCERPT).collect();
            RawStoreError::rejected(Some(status), None, excerpt)
        }
    }
}
