use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Label key carrying the Helm release name on database pods.
const RELEASE_LABEL: &str = "release";

/// Settings used to locate the database deployment inside the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClusterConfig {
    /// Kubernetes namespace the release is installed in.
    pub namespace: String,
    /// Helm release name of the observability stack.
    pub release_name: String,
    /// Suffix appended to the release name to form the credentials secret name.
    pub password_secret_suffix: String,
    /// Key inside the credentials secret holding the database password.
    pub password_secret_key: String,
    /// Labels, besides `release`, that select the primary database pod.
    pub pod_labels: BTreeMap<String, String>,
}

impl ClusterConfig {
    /// Returns the name of the secret holding the database passwords, e.g.
    /// `ts-obs-timescaledb-passwords`.
    pub fn password_secret_name(&self) -> String {
        format!("{}{}", self.release_name, self.password_secret_suffix)
    }

    /// Returns the full label set a database pod must carry.
    ///
    /// The `release` label always reflects [`ClusterConfig::release_name`].
    pub fn pod_selector_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.pod_labels.clone();
        labels.insert(RELEASE_LABEL.to_string(), self.release_name.clone());

        labels
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.namespace.is_empty() {
            return Err(ValidationError::EmptyNamespace);
        }

        if self.release_name.is_empty() {
            return Err(ValidationError::EmptyReleaseName);
        }

        Ok(())
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            release_name: "ts-obs".to_string(),
            password_secret_suffix: "-timescaledb-passwords".to_string(),
            password_secret_key: "postgres".to_string(),
            pod_labels: BTreeMap::from([("role".to_string(), "master".to_string())]),
        }
    }
}
