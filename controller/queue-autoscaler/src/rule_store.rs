//! Rule store trait, in-memory implementation and manifest loading
//!
//! A manifest is YAML (or JSON) holding either a list of rule documents or a
//! mapping with a `rules` list:
//!
//! ```yaml
//! rules:
//!   - name: orders
//!     namespace: default
//!     spec:
//!       deploymentName: orders-worker
//!       namespace: default
//!       minReplicas: 1
//!       maxReplicas: 5
//!       monitoringURL: http://nats:8222
//!       streamName: EVENTS
//!       consumerName: orders
//!       scaleUpThreshold: 100
//!       scaleDownThreshold: 10
//!       pollIntervalSeconds: 30
//! ```

use crate::error::StoreError;
use crate::rule::{RuleId, ScalingRule};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tracing::info;

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Fetch a rule; [`StoreError::NotFound`] when it no longer exists
    async fn get_rule(&self, id: &RuleId) -> Result<ScalingRule, StoreError>;

    /// Identities of all known rules
    async fn list_rules(&self) -> Result<Vec<RuleId>, StoreError>;
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
struct RuleDocument {
    name: String,
    #[serde(default = "default_namespace")]
    namespace: String,
    spec: ScalingRule,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Manifest {
    Wrapped { rules: Vec<RuleDocument> },
    List(Vec<RuleDocument>),
}

/// In-memory rule store
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: RwLock<BTreeMap<RuleId, ScalingRule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a manifest file
    pub fn from_manifest(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules manifest {}", path.display()))?;
        let store = Self::from_manifest_str(&raw)
            .with_context(|| format!("Invalid rules manifest {}", path.display()))?;
        info!(path = %path.display(), rules = store.len(), "Loaded scaling rules");
        Ok(store)
    }

    /// Parse rules from manifest text
    pub fn from_manifest_str(raw: &str) -> Result<Self> {
        let manifest: Manifest =
            serde_yaml::from_str(raw).context("Failed to parse rules manifest")?;
        let documents = match manifest {
            Manifest::Wrapped { rules } => rules,
            Manifest::List(rules) => rules,
        };

        let store = Self::new();
        for doc in documents {
            let id = RuleId::new(doc.namespace, doc.name);
            if store.get(&id).is_some() {
                bail!("Duplicate scaling rule {}", id);
            }
            store.insert(id, doc.spec);
        }
        Ok(store)
    }

    pub fn insert(&self, id: RuleId, rule: ScalingRule) {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, rule);
    }

    pub fn remove(&self, id: &RuleId) -> Option<ScalingRule> {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn get(&self, id: &RuleId) -> Option<ScalingRule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn get_rule(&self, id: &RuleId) -> Result<ScalingRule, StoreError> {
        self.get(id)
            .ok_or_else(|| StoreError::NotFound(format!("scaling rule {}", id)))
    }

    async fn list_rules(&self) -> Result<Vec<RuleId>, StoreError> {
        Ok(self
            .rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"
      deploymentName: orders-worker
      namespace: apps
      minReplicas: 1
      maxReplicas: 5
      monitoringURL: http://nats:8222
      streamName: EVENTS
      consumerName: orders
      scaleUpThreshold: 100
      scaleDownThreshold: 10
      pollIntervalSeconds: 30
"#;

    #[test]
    fn test_wrapped_manifest() {
        let raw = format!("rules:\n  - name: orders\n    spec:{}", SPEC);
        let store = MemoryRuleStore::from_manifest_str(&raw).unwrap();
        let rule = store.get(&RuleId::new("default", "orders")).unwrap();
        assert_eq!(rule.deployment_name, "orders-worker");
        assert_eq!(rule.namespace, "apps");
    }

    #[test]
    fn test_json_list_manifest() {
        let raw = r#"[{"name": "orders", "namespace": "apps", "spec": {
            "deploymentName": "orders-worker", "namespace": "apps",
            "minReplicas": 0, "maxReplicas": 3,
            "monitoringURL": "http://nats:8222", "streamName": "EVENTS",
            "consumerName": "orders", "scaleUpThreshold": 5,
            "scaleDownThreshold": 1, "pollIntervalSeconds": 10}}]"#;
        let store = MemoryRuleStore::from_manifest_str(raw).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(&RuleId::new("apps", "orders")).is_some());
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let doc = format!("  - name: orders\n    spec:{}", SPEC);
        let raw = format!("rules:\n{}{}", doc, doc);
        let err = MemoryRuleStore::from_manifest_str(&raw).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[tokio::test]
    async fn test_missing_rule_is_not_found() {
        let store = MemoryRuleStore::new();
        let err = store
            .get_rule(&RuleId::new("default", "gone"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.list_rules().await.unwrap().is_empty());
    }
}
