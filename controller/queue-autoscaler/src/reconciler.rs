//! Reconciliation pass for a single scaling rule
//!
//! A pass walks `Start -> Loaded -> Validated -> MetricFetched -> Decided ->
//! Applied/Skipped -> Scheduled` and always ends in an [`Outcome`]: requeue
//! after the poll interval on success, after the short delay on transient
//! failures, after the long delay on structural failures, or stop when the
//! rule is gone. Failures are logged and converted, never propagated.

use crate::cancel::Cancellation;
use crate::clock::{Clock, SystemClock};
use crate::cooldown::CooldownStore;
use crate::decision::{decide, ScaleDecision};
use crate::error::{ErrorKind, FetchError, ReconcileError, RetryClass, StoreError};
use crate::metrics::Metrics;
use crate::monitor::BacklogSource;
use crate::rule::{RuleId, ScalingRule};
use crate::rule_store::RuleStore;
use crate::workload::WorkloadStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Retry and rate-limit settings injected into the reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Delay after a transient failure (metric fetch, workload read/write)
    pub short_requeue: Duration,
    /// Delay after a structural failure (rule unreadable or invalid)
    pub long_requeue: Duration,
    /// Minimum time between two applied scale actions on one workload
    pub cooldown: Duration,
    /// Upper bound for every outbound call made by a pass
    pub request_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            short_requeue: Duration::from_secs(10),
            long_requeue: Duration::from_secs(60),
            cooldown: Duration::from_secs(15),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    RequeueAfter(Duration),
    Stop,
}

/// Last state a pass reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Loaded,
    Validated,
    MetricFetched,
    Decided,
    Applied,
    Skipped,
    Scheduled,
}

/// Result of one pass
#[derive(Debug, Clone)]
pub struct PassReport {
    pub rule: RuleId,
    pub outcome: Outcome,
    /// Stage reached before finishing; the failing stage on error
    pub stage: Stage,
    pub pending: Option<u64>,
    pub decision: Option<ScaleDecision>,
    /// A replica change was persisted (never set in dry-run mode)
    pub applied: bool,
    pub error: Option<ReconcileError>,
}

impl PassReport {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(ReconcileError::kind)
    }

    /// Whether this pass changed the workload's replica count
    pub fn scaled(&self) -> bool {
        self.error.is_none() && self.applied
    }
}

pub struct Reconciler {
    rules: Arc<dyn RuleStore>,
    workloads: Arc<dyn WorkloadStore>,
    backlog: Arc<dyn BacklogSource>,
    cooldowns: Arc<CooldownStore>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        workloads: Arc<dyn WorkloadStore>,
        backlog: Arc<dyn BacklogSource>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            rules,
            workloads,
            backlog,
            cooldowns: Arc::new(CooldownStore::new()),
            clock: Arc::new(SystemClock),
            metrics: Metrics,
            config,
        }
    }

    /// Share a cooldown store with other reconcilers
    pub fn with_cooldowns(mut self, cooldowns: Arc<CooldownStore>) -> Self {
        self.cooldowns = cooldowns;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cooldowns(&self) -> &Arc<CooldownStore> {
        &self.cooldowns
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run one reconciliation pass for `id`.
    ///
    /// Safe to call concurrently, including for the same rule. Cancelling
    /// (or dropping) the pass before the replica write starts leaves no
    /// change behind; once the write starts it finishes together with the
    /// cooldown update.
    pub async fn reconcile(&self, id: &RuleId, cancel: &Cancellation) -> PassReport {
        let span = info_span!("reconcile", namespace = %id.namespace, name = %id.name);
        self.run_pass(id, cancel).instrument(span).await
    }

    async fn run_pass(&self, id: &RuleId, cancel: &Cancellation) -> PassReport {
        let mut report = PassReport {
            rule: id.clone(),
            outcome: Outcome::RequeueAfter(self.config.short_requeue),
            stage: Stage::Start,
            pending: None,
            decision: None,
            applied: false,
            error: None,
        };

        // Load
        let rule = match self.rules.get_rule(id).await {
            Ok(rule) => rule,
            Err(StoreError::NotFound(_)) => {
                return self.fail(report, ReconcileError::RuleDeleted(id.clone()));
            }
            Err(source) => {
                return self.fail(
                    report,
                    ReconcileError::RuleLoad {
                        rule: id.clone(),
                        source,
                    },
                );
            }
        };
        report.stage = Stage::Loaded;

        // Validate
        if let Err(source) = rule.validate() {
            return self.fail(
                report,
                ReconcileError::Configuration {
                    rule: id.clone(),
                    source,
                },
            );
        }
        report.stage = Stage::Validated;

        // Fetch metric
        let pending = match self.fetch_pending(&rule, cancel).await {
            Ok(pending) => pending,
            Err(source) => {
                return self.fail(
                    report,
                    ReconcileError::Fetch {
                        rule: id.clone(),
                        source,
                    },
                );
            }
        };
        report.pending = Some(pending);
        report.stage = Stage::MetricFetched;
        self.metrics.record_backlog(id, pending);

        // Decide and apply
        match self.decide_and_apply(id, &rule, pending, cancel, &mut report).await {
            Ok(()) => {
                let delay = rule.poll_interval();
                report.outcome = Outcome::RequeueAfter(delay);
                report.stage = Stage::Scheduled;
                debug!(
                    pending = pending,
                    requeue_after_secs = delay.as_secs(),
                    "Reconciliation pass complete"
                );
                report
            }
            Err(err) => self.fail(report, err),
        }
    }

    async fn fetch_pending(
        &self,
        rule: &ScalingRule,
        cancel: &Cancellation,
    ) -> Result<u64, FetchError> {
        let transport = |message: String| FetchError::Transport {
            url: rule.monitoring_url.clone(),
            message,
        };

        let fetch = self.backlog.pending_messages(
            &rule.monitoring_url,
            &rule.stream_name,
            &rule.consumer_name,
        );

        match self.bounded(fetch, cancel).await {
            Some(Ok(result)) => result,
            Some(Err(elapsed)) => Err(transport(format!(
                "request timed out after {:?}",
                elapsed
            ))),
            None => Err(transport("request cancelled".to_string())),
        }
    }

    /// Await `fut` under the request timeout; `None` if cancelled first
    async fn bounded<F: Future>(
        &self,
        fut: F,
        cancel: &Cancellation,
    ) -> Option<Result<F::Output, Duration>> {
        let timeout = self.config.request_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = tokio::time::timeout(timeout, fut) => Some(res.map_err(|_| timeout)),
        }
    }

    async fn decide_and_apply(
        &self,
        id: &RuleId,
        rule: &ScalingRule,
        pending: u64,
        cancel: &Cancellation,
        report: &mut PassReport,
    ) -> Result<(), ReconcileError> {
        let workload = rule.workload_id();

        let mut guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReconcileError::Cancelled(id.clone())),
            guard = self.cooldowns.lock(&workload) => guard,
        };

        let scale = match self.bounded(self.workloads.get_scale(&workload), cancel).await {
            Some(Ok(Ok(scale))) => scale,
            Some(Ok(Err(source))) => {
                return Err(ReconcileError::WorkloadRead { workload, source });
            }
            Some(Err(elapsed)) => {
                return Err(ReconcileError::WorkloadRead {
                    workload,
                    source: StoreError::Transport(format!(
                        "request timed out after {:?}",
                        elapsed
                    )),
                });
            }
            None => {
                return Err(ReconcileError::WorkloadRead {
                    workload,
                    source: StoreError::Cancelled,
                });
            }
        };

        let now = self.clock.now();
        let decision = decide(
            scale.replicas,
            pending,
            &rule.thresholds(),
            &rule.bounds(),
            guard.last_scale(),
            now,
            self.config.cooldown,
        );
        report.decision = Some(decision);
        report.stage = Stage::Decided;
        self.metrics.record_decision(id, &decision);

        if !decision.applied() {
            if decision.cooldown_active {
                info!(
                    workload = %workload,
                    pending = pending,
                    "Cooldown in effect, skipping scaling"
                );
            } else {
                debug!(
                    workload = %workload,
                    replicas = decision.current,
                    pending = pending,
                    "Backlog within thresholds, no scaling needed"
                );
            }
            report.stage = Stage::Skipped;
            return Ok(());
        }

        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled(id.clone()));
        }

        info!(
            workload = %workload,
            action = decision.action().as_str(),
            from = decision.current,
            to = decision.desired,
            pending = pending,
            scale_up_threshold = rule.scale_up_threshold,
            scale_down_threshold = rule.scale_down_threshold,
            "Scaling workload"
        );

        // The write and the cooldown update run detached so that dropping
        // this pass cannot separate them.
        let dry_run = self.workloads.dry_run();
        let workloads = Arc::clone(&self.workloads);
        let timeout = self.config.request_timeout;
        let target = workload.clone();
        let commit = tokio::spawn(async move {
            let result = match tokio::time::timeout(
                timeout,
                workloads.set_replicas(&target, &scale, decision.desired),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(StoreError::Transport(format!(
                    "request timed out after {:?}",
                    timeout
                ))),
            };
            if result.is_ok() && !dry_run {
                guard.record(now);
            }
            result
        });

        let result = match commit.await {
            Ok(result) => result,
            Err(join_err) => Err(StoreError::Transport(format!(
                "update task failed: {}",
                join_err
            ))),
        };

        match result {
            Ok(()) if dry_run => {
                debug!(workload = %workload, "Dry-run write, cooldown not started");
                report.stage = Stage::Skipped;
                Ok(())
            }
            Ok(()) => {
                self.metrics
                    .record_scale(&workload, decision.current, decision.desired);
                report.stage = Stage::Applied;
                report.applied = true;
                Ok(())
            }
            Err(source) => Err(ReconcileError::StoreWrite { workload, source }),
        }
    }

    /// Convert a failure into a scheduling decision and log it
    fn fail(&self, mut report: PassReport, err: ReconcileError) -> PassReport {
        let kind = err.kind();
        report.outcome = match kind.retry_class() {
            RetryClass::Long => Outcome::RequeueAfter(self.config.long_requeue),
            RetryClass::Short => Outcome::RequeueAfter(self.config.short_requeue),
            RetryClass::Never => Outcome::Stop,
        };

        match report.outcome {
            Outcome::Stop => {
                info!(stage = ?report.stage, "Scaling rule deleted, not requeueing");
            }
            Outcome::RequeueAfter(delay) => {
                self.metrics.record_error(kind, &report.rule);
                if let Some((status, body)) = err.http_status() {
                    error!(
                        stage = ?report.stage,
                        error_type = kind.as_str(),
                        retry_in_secs = delay.as_secs(),
                        status = status,
                        body = %body,
                        error = %err,
                        "Reconciliation failed"
                    );
                } else if kind == ErrorKind::Cancelled {
                    warn!(
                        stage = ?report.stage,
                        retry_in_secs = delay.as_secs(),
                        "Reconciliation cancelled"
                    );
                } else {
                    error!(
                        stage = ?report.stage,
                        error_type = kind.as_str(),
                        retry_in_secs = delay.as_secs(),
                        error = %err,
                        "Reconciliation failed"
                    );
                }
            }
        }

        report.error = Some(err);
        report
    }
}
