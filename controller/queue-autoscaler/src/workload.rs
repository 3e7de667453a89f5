//! Workload store trait and implementations
//!
//! The workload store owns the replica count of scaled workloads. Reads
//! return the current count with an opaque revision; writes carry that
//! revision back so stores that support it reject stale updates.

use crate::error::StoreError;
use crate::rule::WorkloadId;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

/// Replica count of a workload as last read from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadScale {
    pub replicas: i32,
    #[serde(
        rename = "resourceVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub revision: Option<String>,
}

/// Workload store trait - implement this to scale workloads on different platforms
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    /// Read the current replica count
    async fn get_scale(&self, workload: &WorkloadId) -> Result<WorkloadScale, StoreError>;

    /// Write a new replica count. `observed` is the scale the decision was
    /// based on; its revision is used for conditional updates where supported.
    async fn set_replicas(
        &self,
        workload: &WorkloadId,
        observed: &WorkloadScale,
        replicas: i32,
    ) -> Result<(), StoreError>;

    /// Whether writes are only logged. A logged write never starts a cooldown.
    fn dry_run(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    replicas: i32,
    revision: u64,
}

/// In-memory workload store with revision-checked updates
#[derive(Debug, Default)]
pub struct MemoryWorkloadStore {
    entries: Mutex<HashMap<WorkloadId, Entry>>,
    writes: AtomicU64,
}

impl MemoryWorkloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workload (or overwrite its replica count)
    pub fn insert(&self, workload: WorkloadId, replicas: i32) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let revision = entries.get(&workload).map_or(1, |e| e.revision + 1);
        entries.insert(workload, Entry { replicas, revision });
    }

    pub fn replicas(&self, workload: &WorkloadId) -> Option<i32> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(workload)
            .map(|e| e.replicas)
    }

    /// Number of successful replica writes
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkloadStore for MemoryWorkloadStore {
    async fn get_scale(&self, workload: &WorkloadId) -> Result<WorkloadScale, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get(workload)
            .ok_or_else(|| StoreError::NotFound(format!("workload {}", workload)))?;
        Ok(WorkloadScale {
            replicas: entry.replicas,
            revision: Some(entry.revision.to_string()),
        })
    }

    async fn set_replicas(
        &self,
        workload: &WorkloadId,
        observed: &WorkloadScale,
        replicas: i32,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get_mut(workload)
            .ok_or_else(|| StoreError::NotFound(format!("workload {}", workload)))?;

        if let Some(expected) = &observed.revision {
            let actual = entry.revision.to_string();
            if *expected != actual {
                return Err(StoreError::Conflict {
                    key: workload.to_string(),
                    message: format!("expected revision {}, found {}", expected, actual),
                });
            }
        }

        entry.replicas = replicas;
        entry.revision += 1;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Dry-run store: reads from the wrapped store, logs writes instead of applying them
pub struct DryRunWorkloadStore<S> {
    inner: S,
}

impl<S: WorkloadStore> DryRunWorkloadStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: WorkloadStore> WorkloadStore for DryRunWorkloadStore<S> {
    async fn get_scale(&self, workload: &WorkloadId) -> Result<WorkloadScale, StoreError> {
        self.inner.get_scale(workload).await
    }

    async fn set_replicas(
        &self,
        workload: &WorkloadId,
        observed: &WorkloadScale,
        replicas: i32,
    ) -> Result<(), StoreError> {
        info!(
            workload = %workload,
            current = observed.replicas,
            desired = replicas,
            "Scale recommendation (dry-run mode)"
        );
        Ok(())
    }

    fn dry_run(&self) -> bool {
        true
    }
}

/// HTTP workload store - reads and writes the scale subresource of a workload
/// at `{endpoint}/namespaces/{namespace}/deployments/{name}/scale`
pub struct HttpWorkloadStore {
    endpoint: String,
    client: reqwest::Client,
}

/// Body of a scale update
#[derive(Debug, Serialize)]
struct ScaleUpdate<'a> {
    replicas: i32,
    #[serde(rename = "resourceVersion", skip_serializing_if = "Option::is_none")]
    revision: Option<&'a str>,
}

impl HttpWorkloadStore {
    /// Create a new HTTP workload store
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build workload store HTTP client")?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn scale_url(&self, workload: &WorkloadId) -> String {
        format!(
            "{}/namespaces/{}/deployments/{}/scale",
            self.endpoint, workload.namespace, workload.name
        )
    }

    async fn status_error(workload: &WorkloadId, response: reqwest::Response) -> StoreError {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
            .unwrap_or_else(|_| "<unable to read body>".to_string());
        match status {
            StatusCode::NOT_FOUND => StoreError::NotFound(format!("workload {}", workload)),
            StatusCode::CONFLICT => StoreError::Conflict {
                key: workload.to_string(),
                message: body,
            },
            _ => StoreError::Status {
                code: status.as_u16(),
                body,
            },
        }
    }
}

#[async_trait]
impl WorkloadStore for HttpWorkloadStore {
    async fn get_scale(&self, workload: &WorkloadId) -> Result<WorkloadScale, StoreError> {
        let response = self
            .client
            .get(self.scale_url(workload))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::status_error(workload, response).await);
        }

        response
            .json::<WorkloadScale>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn set_replicas(
        &self,
        workload: &WorkloadId,
        observed: &WorkloadScale,
        replicas: i32,
    ) -> Result<(), StoreError> {
        let update = ScaleUpdate {
            replicas,
            revision: observed.revision.as_deref(),
        };

        let response = self
            .client
            .put(self.scale_url(workload))
            .json(&update)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if response.status().is_success() {
            info!(
                workload = %workload,
                from = observed.replicas,
                to = replicas,
                status = %response.status(),
                "Updated workload replicas"
            );
            Ok(())
        } else {
            let err = Self::status_error(workload, response).await;
            warn!(workload = %workload, error = %err, "Workload scale update rejected");
            Err(err)
        }
    }
}
