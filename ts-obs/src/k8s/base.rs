use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use ts_obs_config::SerializableSecretString;

/// Errors emitted by the Kubernetes integration.
#[derive(Debug, Error)]
pub enum K8sError {
    #[error("secret `{name}` not found in namespace `{namespace}`")]
    SecretNotFound { namespace: String, name: String },

    #[error("secret `{name}` in namespace `{namespace}` has no key `{key}`")]
    SecretKeyNotFound {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("no running pod matches `{selector}` in namespace `{namespace}`")]
    PodNotFound { namespace: String, selector: String },

    #[error(
        "{} running pods match `{selector}` in namespace `{namespace}`: {}",
        .pods.len(),
        .pods.join(", ")
    )]
    AmbiguousPods {
        namespace: String,
        selector: String,
        pods: Vec<String>,
    },

    /// An error returned by the [`kube`] client when talking to the API server.
    #[error("an error occurred with kube when dealing with K8s: {0}")]
    Kube(#[from] kube::Error),
}

/// A simplified view of a pod phase.
///
/// Unknown values map to [`PodPhase::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodPhase {
    fn from(value: &str) -> Self {
        match value {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

/// Decoded data of a Kubernetes secret, values kept secret.
#[derive(Debug, Clone, Default)]
pub struct SecretData {
    values: BTreeMap<String, SerializableSecretString>,
}

impl SecretData {
    pub fn new(values: BTreeMap<String, SerializableSecretString>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&SerializableSecretString> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Renders labels as a Kubernetes label selector, e.g. `release=obs,role=master`.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Lookups the tool performs against the cluster.
#[async_trait]
pub trait ClusterLocator: Send + Sync {
    /// Returns the data of secret `name`, or [`K8sError::SecretNotFound`].
    async fn resolve_secret(&self, namespace: &str, name: &str) -> Result<SecretData, K8sError>;

    /// Returns the name of the single running pod carrying all `labels`.
    ///
    /// Fails with [`K8sError::PodNotFound`] when none matches and
    /// [`K8sError::AmbiguousPods`] when several do; ambiguity is never resolved
    /// by picking one.
    async fn resolve_pod(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<String, K8sError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_joins_labels_in_key_order() {
        let labels = BTreeMap::from([
            ("role".to_string(), "master".to_string()),
            ("release".to_string(), "obs".to_string()),
        ]);
        assert_eq!(label_selector(&labels), "release=obs,role=master");
    }

    #[test]
    fn ambiguous_pods_lists_candidates() {
        let err = K8sError::AmbiguousPods {
            namespace: "obs".to_string(),
            selector: "role=master".to_string(),
            pods: vec!["db-0".to_string(), "db-1".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "2 running pods match `role=master` in namespace `obs`: db-0, db-1"
        );
    }

    #[test]
    fn unknown_phase_strings_map_to_unknown() {
        assert_eq!(PodPhase::from("Running"), PodPhase::Running);
        assert_eq!(PodPhase::from("Evicted"), PodPhase::Unknown);
    }
}
