//! Log-based metrics for the autoscaler
//!
//! Emits one structured event per observation so that log pipelines can
//! aggregate backlog, decision and error counts per rule.

use crate::decision::ScaleDecision;
use crate::error::ErrorKind;
use crate::rule::{RuleId, WorkloadId};
use tracing::{debug, info};

/// Metrics collector for reconciliation passes
#[derive(Debug, Clone, Default)]
pub struct Metrics;

impl Metrics {
    /// Record a backlog sample
    pub fn record_backlog(&self, rule: &RuleId, pending: u64) {
        debug!(
            rule = %rule,
            pending = pending,
            "Recorded backlog sample"
        );
    }

    /// Record the outcome of a scaling decision
    pub fn record_decision(&self, rule: &RuleId, decision: &ScaleDecision) {
        debug!(
            rule = %rule,
            action = decision.action().as_str(),
            current = decision.current,
            desired = decision.desired,
            cooldown_active = decision.cooldown_active,
            "Recorded scale decision"
        );
    }

    /// Record a replica change that was persisted
    pub fn record_scale(&self, workload: &WorkloadId, from: i32, to: i32) {
        info!(
            workload = %workload,
            from = from,
            to = to,
            "Recorded applied scale action"
        );
    }

    /// Record a failed pass
    pub fn record_error(&self, kind: ErrorKind, rule: &RuleId) {
        info!(
            error_type = kind.as_str(),
            rule = %rule,
            "Recorded error"
        );
    }
}
