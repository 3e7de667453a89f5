//! Per-rule scheduling loop
//!
//! Spawns one task per known rule. Each task runs a reconciliation pass,
//! sleeps for the delay the pass returned and repeats, until the rule is
//! deleted or the cancellation signal fires.

use crate::cancel::Cancellation;
use crate::reconciler::{Outcome, Reconciler};
use crate::rule::RuleId;
use crate::rule_store::RuleStore;
use anyhow::{Context, Result};
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct Driver {
    reconciler: Arc<Reconciler>,
    rules: Arc<dyn RuleStore>,
}

impl Driver {
    pub fn new(reconciler: Arc<Reconciler>, rules: Arc<dyn RuleStore>) -> Self {
        Self { reconciler, rules }
    }

    /// Run every rule's loop until all have stopped or `cancel` fires
    pub async fn run(&self, cancel: Cancellation) -> Result<()> {
        let ids = self
            .rules
            .list_rules()
            .await
            .context("Failed to list scaling rules")?;

        info!(rules = ids.len(), "Starting reconciliation loops");

        let tasks = ids.into_iter().map(|id| {
            let reconciler = Arc::clone(&self.reconciler);
            let cancel = cancel.clone();
            let name = id.to_string();
            let handle = tokio::spawn(drive_rule(reconciler, id, cancel));
            async move { (name, handle.await) }
        });

        for (rule, result) in join_all(tasks).await {
            if let Err(e) = result {
                error!(rule = %rule, error = %e, "Reconciliation loop panicked");
            }
        }

        info!("All reconciliation loops exited");
        Ok(())
    }
}

async fn drive_rule(reconciler: Arc<Reconciler>, id: RuleId, cancel: Cancellation) {
    loop {
        if cancel.is_cancelled() {
            debug!(rule = %id, "Shutdown requested, leaving loop");
            return;
        }

        let report = reconciler.reconcile(&id, &cancel).await;
        match report.outcome {
            Outcome::Stop => {
                info!(rule = %id, "Rule removed, stopping its loop");
                return;
            }
            Outcome::RequeueAfter(delay) => {
                debug!(rule = %id, delay_ms = delay.as_millis() as u64, "Next pass scheduled");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
