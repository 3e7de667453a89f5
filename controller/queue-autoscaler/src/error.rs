//! Error taxonomy for reconciliation passes
//!
//! Every failure a pass can hit maps onto one [`ErrorKind`], and every kind
//! maps onto one [`RetryClass`]. Callers switch on the kind, never on the
//! concrete error type.

use crate::rule::{RuleId, WorkloadId};
use serde::Serialize;
use thiserror::Error;

/// Discriminant shared by all reconciliation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    RuleLoad,
    RuleDeleted,
    Transport,
    HttpStatus,
    Decode,
    NotFound,
    NoAccountFound,
    WorkloadRead,
    StoreWrite,
    Cancelled,
}

/// How soon a failed pass should run again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Needs an external fix; back off generously
    Long,
    /// Likely transient; retry soon
    Short,
    /// Nothing left to reconcile
    Never,
}

impl ErrorKind {
    pub fn retry_class(self) -> RetryClass {
        match self {
            ErrorKind::Configuration | ErrorKind::RuleLoad => RetryClass::Long,
            ErrorKind::RuleDeleted => RetryClass::Never,
            ErrorKind::Transport
            | ErrorKind::HttpStatus
            | ErrorKind::Decode
            | ErrorKind::NotFound
            | ErrorKind::NoAccountFound
            | ErrorKind::WorkloadRead
            | ErrorKind::StoreWrite
            | ErrorKind::Cancelled => RetryClass::Short,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::RuleLoad => "rule_load",
            ErrorKind::RuleDeleted => "rule_deleted",
            ErrorKind::Transport => "transport",
            ErrorKind::HttpStatus => "http_status",
            ErrorKind::Decode => "decode",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoAccountFound => "no_account_found",
            ErrorKind::WorkloadRead => "workload_read",
            ErrorKind::StoreWrite => "store_write",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

/// Static invariant violated by a scaling rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("minReplicas ({min}) must be less than or equal to maxReplicas ({max})")]
    ReplicaBounds { min: i32, max: i32 },

    #[error("minReplicas must not be negative, got {0}")]
    NegativeMinReplicas(i32),

    #[error("maxReplicas must be at least 1, got {0}")]
    MaxReplicasTooLow(i32),

    #[error("pollIntervalSeconds must be at least 1, got {0}")]
    PollIntervalTooShort(u64),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("monitoringURL must start with http:// or https://, got {0}")]
    InvalidMonitoringUrl(String),
}

/// Failure to read a backlog sample from the monitoring endpoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("monitoring request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP error with status {code}: {}", display_body(.body))]
    HttpStatus { code: u16, body: String },

    #[error("failed to decode monitoring response: {0}")]
    Decode(String),

    #[error("no accounts found in monitoring response")]
    NoAccountFound,

    #[error("couldn't find account <{account}>, stream <{stream}>, consumer <{consumer}>")]
    NotFound {
        account: String,
        stream: String,
        consumer: String,
    },
}

fn display_body(body: &str) -> &str {
    if body.is_empty() {
        "no body"
    } else {
        body
    }
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Transport { .. } => ErrorKind::Transport,
            FetchError::HttpStatus { .. } => ErrorKind::HttpStatus,
            FetchError::Decode(_) => ErrorKind::Decode,
            FetchError::NoAccountFound => ErrorKind::NoAccountFound,
            FetchError::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}

/// Failure reported by a rule store or workload store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflicting update on {key}: {message}")]
    Conflict { key: String, message: String },

    #[error("store returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("store request failed: {0}")]
    Transport(String),

    #[error("invalid store response: {0}")]
    Decode(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Failure of a single reconciliation pass
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    #[error("scaling rule {0} no longer exists")]
    RuleDeleted(RuleId),

    #[error("failed to load scaling rule {rule}: {source}")]
    RuleLoad {
        rule: RuleId,
        #[source]
        source: StoreError,
    },

    #[error("invalid scaling rule {rule}: {source}")]
    Configuration {
        rule: RuleId,
        #[source]
        source: ConfigurationError,
    },

    #[error("failed to get pending messages for {rule}: {source}")]
    Fetch {
        rule: RuleId,
        #[source]
        source: FetchError,
    },

    #[error("failed to read scale of {workload}: {source}")]
    WorkloadRead {
        workload: WorkloadId,
        #[source]
        source: StoreError,
    },

    #[error("failed to update replicas of {workload}: {source}")]
    StoreWrite {
        workload: WorkloadId,
        #[source]
        source: StoreError,
    },

    #[error("reconciliation of {0} cancelled")]
    Cancelled(RuleId),
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::RuleDeleted(_) => ErrorKind::RuleDeleted,
            ReconcileError::RuleLoad { .. } => ErrorKind::RuleLoad,
            ReconcileError::Configuration { .. } => ErrorKind::Configuration,
            ReconcileError::Fetch { source, .. } => source.kind(),
            ReconcileError::WorkloadRead { .. } => ErrorKind::WorkloadRead,
            ReconcileError::StoreWrite { .. } => ErrorKind::StoreWrite,
            ReconcileError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// HTTP status and body, when the failure came from a non-success response
    pub fn http_status(&self) -> Option<(u16, &str)> {
        match self {
            ReconcileError::Fetch {
                source: FetchError::HttpStatus { code, body },
                ..
            }
            | ReconcileError::WorkloadRead {
                source: StoreError::Status { code, body },
                ..
            }
            | ReconcileError::StoreWrite {
                source: StoreError::Status { code, body },
                ..
            } => Some((*code, body.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classes() {
        assert_eq!(ErrorKind::Configuration.retry_class(), RetryClass::Long);
        assert_eq!(ErrorKind::RuleLoad.retry_class(), RetryClass::Long);
        assert_eq!(ErrorKind::RuleDeleted.retry_class(), RetryClass::Never);
        for kind in [
            ErrorKind::Transport,
            ErrorKind::HttpStatus,
            ErrorKind::Decode,
            ErrorKind::NotFound,
            ErrorKind::NoAccountFound,
            ErrorKind::WorkloadRead,
            ErrorKind::StoreWrite,
        ] {
            assert_eq!(kind.retry_class(), RetryClass::Short, "{kind:?}");
        }
    }

    #[test]
    fn test_fetch_error_kind_propagates() {
        let err = ReconcileError::Fetch {
            rule: RuleId::new("default", "orders"),
            source: FetchError::NoAccountFound,
        };
        assert_eq!(err.kind(), ErrorKind::NoAccountFound);
        assert!(err.http_status().is_none());
    }

    #[test]
    fn test_http_status_message() {
        let err = FetchError::HttpStatus {
            code: 500,
            body: String::new(),
        };
        assert_eq!(err.to_string(), "HTTP error with status 500: no body");

        let err = ReconcileError::Fetch {
            rule: RuleId::new("default", "orders"),
            source: FetchError::HttpStatus {
                code: 503,
                body: "unavailable".to_string(),
            },
        };
        assert_eq!(err.http_status(), Some((503, "unavailable")));
    }
}
