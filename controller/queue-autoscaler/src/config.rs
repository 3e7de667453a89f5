//! Configuration for the queue autoscaler service

use crate::reconciler::ReconcilerConfig;
use clap::Parser;
use std::time::Duration;

/// Configuration for queue autoscaler
#[derive(Debug, Clone, Parser)]
#[command(name = "queue-autoscaler")]
#[command(about = "Scales workloads on NATS JetStream consumer backlog")]
pub struct Config {
    /// Path to the scaling rules manifest (YAML or JSON)
    #[arg(long, env)]
    pub rules_path: String,

    /// Scale API endpoint serving `/namespaces/{ns}/deployments/{name}/scale`
    #[arg(long, env)]
    pub scale_endpoint: String,

    /// Dry-run mode (log scale decisions, never write replicas)
    #[arg(long, env)]
    pub dry_run: bool,

    /// Output logs in JSON format
    #[arg(long, env)]
    pub log_json: bool,

    /// Requeue delay after a transient failure, in seconds
    #[arg(long, env, default_value_t = 10)]
    pub short_requeue_secs: u64,

    /// Requeue delay after an invalid or unreadable rule, in seconds
    #[arg(long, env, default_value_t = 60)]
    pub long_requeue_secs: u64,

    /// Minimum time between scale actions on one workload, in seconds
    #[arg(long, env, default_value_t = 15)]
    pub cooldown_secs: u64,

    /// Timeout for monitoring and scale API calls, in seconds
    #[arg(long, env, default_value_t = 10)]
    pub request_timeout_secs: u64,
}

impl Config {
    /// Parse configuration from command-line args and environment variables
    pub fn parse_config() -> Self {
        Config::parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Retry and rate-limit settings for the reconciler
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            short_requeue: Duration::from_secs(self.short_requeue_secs),
            long_requeue: Duration::from_secs(self.long_requeue_secs),
            cooldown: Duration::from_secs(self.cooldown_secs),
            request_timeout: self.request_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            rules_path: "rules.yaml".to_string(),
            scale_endpoint: "http://scaler:8080".to_string(),
            dry_run: true,
            log_json: false,
            short_requeue_secs: 5,
            long_requeue_secs: 120,
            cooldown_secs: 30,
            request_timeout_secs: 3,
        }
    }

    #[test]
    fn test_reconciler_config() {
        let rc = config().reconciler_config();
        assert_eq!(rc.short_requeue, Duration::from_secs(5));
        assert_eq!(rc.long_requeue, Duration::from_secs(120));
        assert_eq!(rc.cooldown, Duration::from_secs(30));
        assert_eq!(rc.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_parse_defaults() {
        let config = Config::try_parse_from([
            "queue-autoscaler",
            "--rules-path",
            "/etc/autoscaler/rules.yaml",
            "--scale-endpoint",
            "http://scaler:8080",
        ])
        .unwrap();

        assert_eq!(config.rules_path, "/etc/autoscaler/rules.yaml");
        assert!(!config.dry_run);
        assert_eq!(config.reconciler_config(), ReconcilerConfig::default());
    }

    #[test]
    fn test_parse_overrides() {
        let config = Config::try_parse_from([
            "queue-autoscaler",
            "--rules-path",
            "rules.yaml",
            "--scale-endpoint",
            "http://scaler:8080",
            "--dry-run",
            "--cooldown-secs",
            "45",
        ])
        .unwrap();

        assert!(config.dry_run);
        assert_eq!(config.reconciler_config().cooldown, Duration::from_secs(45));
    }
}
