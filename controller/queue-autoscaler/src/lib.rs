//! Queue Autoscaler - scales workloads on NATS JetStream consumer backlog
//!
//! Each scaling rule names a workload, a JetStream stream/consumer pair and the
//! thresholds that bound its backlog. A reconciliation pass reads the pending
//! message count from the NATS monitoring endpoint, decides on a single-step
//! replica change (rate limited by a per-workload cooldown) and writes it to the
//! workload store. Failures are converted into requeue delays, never panics.

pub mod cancel;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod decision;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod reconciler;
pub mod rule;
pub mod rule_store;
pub mod workload;

pub use cancel::{CancelHandle, Cancellation};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use cooldown::CooldownStore;
pub use decision::{decide, Bounds, ScaleAction, ScaleDecision, Thresholds};
pub use driver::Driver;
pub use error::{
    ConfigurationError, ErrorKind, FetchError, ReconcileError, RetryClass, StoreError,
};
pub use metrics::Metrics;
pub use monitor::{BacklogSource, JszClient};
pub use reconciler::{Outcome, PassReport, Reconciler, ReconcilerConfig, Stage};
pub use rule::{NamespacedName, RuleId, ScalingRule, WorkloadId};
pub use rule_store::{MemoryRuleStore, RuleStore};
pub use workload::{
    DryRunWorkloadStore, HttpWorkloadStore, MemoryWorkloadStore, WorkloadScale, WorkloadStore,
};
