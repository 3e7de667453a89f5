//! Per-workload cooldown bookkeeping
//!
//! Holds the timestamp of the last applied scale action for each workload.
//! Every workload has its own async lock; the outer map is only held long
//! enough to look up or create that lock, so unrelated workloads never wait
//! on each other. A pass holds its workload's lock from the cooldown check
//! until the replica write and timestamp update have both finished.

use crate::rule::WorkloadId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<Option<DateTime<Utc>>>>;

#[derive(Debug, Default)]
pub struct CooldownStore {
    slots: Mutex<HashMap<WorkloadId, Slot>>,
}

/// Exclusive access to one workload's cooldown entry
#[derive(Debug)]
pub struct CooldownGuard {
    workload: WorkloadId,
    entry: OwnedMutexGuard<Option<DateTime<Utc>>>,
}

impl CooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, workload: &WorkloadId) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(workload.clone()).or_default())
    }

    /// Wait for exclusive access to a workload's entry
    pub async fn lock(&self, workload: &WorkloadId) -> CooldownGuard {
        let slot = self.slot(workload);
        CooldownGuard {
            workload: workload.clone(),
            entry: slot.lock_owned().await,
        }
    }

    /// Snapshot of the last scale time, waiting for any in-flight update
    pub async fn last_scale(&self, workload: &WorkloadId) -> Option<DateTime<Utc>> {
        *self.lock(workload).await.entry
    }

    /// Number of workloads that have an entry
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CooldownGuard {
    pub fn workload(&self) -> &WorkloadId {
        &self.workload
    }

    pub fn last_scale(&self) -> Option<DateTime<Utc>> {
        *self.entry
    }

    /// Record a confirmed scale action
    pub fn record(&mut self, at: DateTime<Utc>) {
        *self.entry = Some(at);
    }
}
