//! Backlog source backed by the NATS monitoring endpoint
//!
//! Queries `GET {base}/jsz?acc=$G&consumers=1&leader_only=1` and reads the
//! `num_pending` counter of one stream/consumer pair. Only the first account
//! in the response is consulted; the global account is assumed.

use crate::error::FetchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Account the monitoring query is scoped to
pub const GLOBAL_ACCOUNT: &str = "$G";

/// Path of the JetStream monitoring report
pub const JSZ_PATH: &str = "jsz";

/// Top-level `/jsz` response (only the fields read here)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JszResponse {
    #[serde(default)]
    pub account_details: Option<Vec<AccountDetail>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountDetail {
    #[serde(default)]
    pub stream_detail: Option<Vec<StreamDetail>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDetail {
    pub name: String,
    #[serde(default)]
    pub consumer_detail: Option<Vec<ConsumerDetail>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerDetail {
    pub name: String,
    pub num_pending: u64,
}

impl JszResponse {
    /// Pending count for a stream/consumer pair in the first account
    pub fn pending_for(&self, stream: &str, consumer: &str) -> Result<u64, FetchError> {
        let account = self
            .account_details
            .as_deref()
            .and_then(|accounts| accounts.first())
            .ok_or(FetchError::NoAccountFound)?;

        account
            .stream_detail
            .iter()
            .flatten()
            .filter(|s| s.name == stream)
            .flat_map(|s| s.consumer_detail.iter().flatten())
            .find(|c| c.name == consumer)
            .map(|c| c.num_pending)
            .ok_or_else(|| FetchError::NotFound {
                account: GLOBAL_ACCOUNT.to_string(),
                stream: stream.to_string(),
                consumer: consumer.to_string(),
            })
    }
}

/// Source of backlog samples - implement this to read pending counts from
/// somewhere other than the HTTP monitoring endpoint
#[async_trait]
pub trait BacklogSource: Send + Sync {
    /// Number of messages pending for `consumer` on `stream`
    async fn pending_messages(
        &self,
        base_url: &str,
        stream: &str,
        consumer: &str,
    ) -> Result<u64, FetchError>;
}

/// Monitoring endpoint URL for a base URL
pub fn jsz_url(base_url: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), JSZ_PATH)
}

/// HTTP client for the `/jsz` monitoring report
#[derive(Debug, Clone)]
pub struct JszClient {
    client: reqwest::Client,
}

impl JszClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build monitoring HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BacklogSource for JszClient {
    async fn pending_messages(
        &self,
        base_url: &str,
        stream: &str,
        consumer: &str,
    ) -> Result<u64, FetchError> {
        let url = jsz_url(base_url);
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.clone(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(&url)
            .query(&[
                ("acc", GLOBAL_ACCOUNT),
                ("consumers", "1"),
                ("leader_only", "1"),
            ])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .bytes()
                .await
                .map(|raw| String::from_utf8_lossy(&raw).into_owned())
                .unwrap_or_default();
            return Err(FetchError::HttpStatus {
                code: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        let report: JszResponse =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))?;

        let pending = report.pending_for(stream, consumer)?;
        debug!(
            url = %url,
            stream = %stream,
            consumer = %consumer,
            pending = pending,
            "Fetched consumer backlog"
        );
        Ok(pending)
    }
}
