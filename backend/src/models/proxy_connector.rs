//! Proxy connector configuration model.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Link from a managed repository to a remote one, with its download policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConnectorConfiguration {
    pub source_repo_id: String,
    pub target_repo_id: String,
    /// Lower runs first; `0` means unordered and runs after every explicit order.
    #[serde(default)]
    pub order: Option<i32>,
    #[serde(default)]
    pub disabled: bool,
    /// Policy id to option value, e.g. `"checksum" -> "fail"`.
    #[serde(default)]
    pub policies: BTreeMap<String, String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub whitelist: Vec<String>,
}

impl ProxyConnectorConfiguration {
    pub fn new(source_repo_id: impl Into<String>, target_repo_id: impl Into<String>) -> Self {
        Self {
            source_repo_id: source_repo_id.into(),
            target_repo_id: target_repo_id.into(),
            order: None,
            disabled: false,
            policies: BTreeMap::new(),
            blacklist: Vec::new(),
            whitelist: Vec::new(),
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_policy(mut self, id: &str, option: &str) -> Self {
        self.policies.insert(id.to_string(), option.to_string());
        self
    }

    /// Identity used for de-duplication in the registry.
    pub fn key(&self) -> (&str, &str) {
        (&self.source_repo_id, &self.target_repo_id)
    }
}

/// Connector ordering: ascending `order`, `0` after any explicit order and
/// `None` last. Callers use a stable sort so ties keep configuration order.
pub fn compare_order(a: Option<i32>, b: Option<i32>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(0), Some(0)) => Ordering::Equal,
        (Some(0), Some(_)) => Ordering::Greater,
        (Some(_), Some(0)) => Ordering::Less,
        (Some(x), Some(y)) => x.cmp(&y),
    }
}

pub fn sort_connectors(connectors: &mut [ProxyConnectorConfiguration]) {
    connectors.sort_by(|a, b| compare_order(a.order, b.order));
}
