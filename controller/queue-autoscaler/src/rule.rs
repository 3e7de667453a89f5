//! Scaling rule model and its static validation

use crate::decision::{Bounds, Thresholds};
use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Namespace-qualified object name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Identity of a scaling rule resource
pub type RuleId = NamespacedName;

/// Identity of the workload a rule scales
pub type WorkloadId = NamespacedName;

/// Scaling rule spec (matches the ScalingRule resource schema)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingRule {
    pub deployment_name: String,
    pub namespace: String,
    pub min_replicas: i32,
    pub max_replicas: i32,
    #[serde(rename = "monitoringURL", alias = "natsMonitoringURL")]
    pub monitoring_url: String,
    pub stream_name: String,
    pub consumer_name: String,
    pub scale_up_threshold: u64,
    pub scale_down_threshold: u64,
    pub poll_interval_seconds: u64,
}

impl ScalingRule {
    /// Check the invariants a rule must hold before any scaling action is taken.
    ///
    /// Threshold ordering is deliberately not checked here.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (field, value) in [
            ("deploymentName", &self.deployment_name),
            ("namespace", &self.namespace),
            ("streamName", &self.stream_name),
            ("consumerName", &self.consumer_name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigurationError::EmptyField(field));
            }
        }

        let url = &self.monitoring_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigurationError::InvalidMonitoringUrl(
                self.monitoring_url.clone(),
            ));
        }

        if self.min_replicas < 0 {
            return Err(ConfigurationError::NegativeMinReplicas(self.min_replicas));
        }
        if self.max_replicas < 1 {
            return Err(ConfigurationError::MaxReplicasTooLow(self.max_replicas));
        }
        if self.min_replicas > self.max_replicas {
            return Err(ConfigurationError::ReplicaBounds {
                min: self.min_replicas,
                max: self.max_replicas,
            });
        }
        if self.poll_interval_seconds < 1 {
            return Err(ConfigurationError::PollIntervalTooShort(
                self.poll_interval_seconds,
            ));
        }

        Ok(())
    }

    pub fn workload_id(&self) -> WorkloadId {
        NamespacedName::new(&self.namespace, &self.deployment_name)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            scale_up: self.scale_up_threshold,
            scale_down: self.scale_down_threshold,
        }
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            min: self.min_replicas,
            max: self.max_replicas,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}
