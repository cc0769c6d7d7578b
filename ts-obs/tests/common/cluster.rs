use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ts_obs::k8s::{ClusterLocator, K8sError, SecretData, label_selector};
use ts_obs_config::SerializableSecretString;

/// Cluster holding a fixed set of secrets and running pods.
#[derive(Debug, Clone, Default)]
pub struct StaticClusterLocator {
    secrets: BTreeMap<String, BTreeMap<String, String>>,
    running_pods: Vec<String>,
    pod_lookup_delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl StaticClusterLocator {
    /// A release with its password secret and one running database pod.
    pub fn for_release(release: &str, password: &str, pod: &str) -> Self {
        Self::default()
            .with_secret(
                &format!("{release}-timescaledb-passwords"),
                "postgres",
                password,
            )
            .with_running_pod(pod)
    }

    pub fn with_secret(mut self, name: &str, key: &str, value: &str) -> Self {
        self.secrets
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());

        self
    }

    pub fn with_running_pod(mut self, pod: &str) -> Self {
        self.running_pods.push(pod.to_string());

        self
    }

    /// Every pod lookup waits `delay` before answering, like an API server
    /// that stopped responding.
    pub fn with_slow_pod_lookup(mut self, delay: Duration) -> Self {
        self.pod_lookup_delay = Some(delay);

        self
    }

    /// Number of lookups performed so far, across clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterLocator for StaticClusterLocator {
    async fn resolve_secret(&self, namespace: &str, name: &str) -> Result<SecretData, K8sError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let Some(values) = self.secrets.get(name) else {
            return Err(K8sError::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };

        let values = values
            .iter()
            .map(|(key, value)| (key.clone(), SerializableSecretString::from(value.clone())))
            .collect();

        Ok(SecretData::new(values))
    }

    async fn resolve_pod(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<String, K8sError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.pod_lookup_delay {
            tokio::time::sleep(delay).await;
        }

        let selector = label_selector(labels);
        match self.running_pods.as_slice() {
            [] => Err(K8sError::PodNotFound {
                namespace: namespace.to_string(),
                selector,
            }),
            [pod] => Ok(pod.clone()),
            pods => Err(K8sError::AmbiguousPods {
                namespace: namespace.to_string(),
                selector,
                pods: pods.to_vec(),
            }),
        }
    }
}
