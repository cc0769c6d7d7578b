use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::{debug, warn};
use ts_obs_config::SerializableSecretString;

use crate::k8s::{ClusterLocator, K8sError, PodPhase, SecretData, label_selector};

/// [`ClusterLocator`] talking to the API server with the ambient kubeconfig.
#[derive(Clone)]
pub struct KubeClusterLocator {
    client: Client,
}

impl KubeClusterLocator {
    /// Builds a locator from the in-cluster configuration or `~/.kube/config`.
    pub async fn new() -> Result<KubeClusterLocator, K8sError> {
        let client = Client::try_default().await?;

        Ok(KubeClusterLocator { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ClusterLocator for KubeClusterLocator {
    async fn resolve_secret(&self, namespace: &str, name: &str) -> Result<SecretData, K8sError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = secrets.get_opt(name).await? else {
            return Err(K8sError::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };

        let mut values = BTreeMap::new();
        for (key, value) in secret.data.unwrap_or_default() {
            match SerializableSecretString::from_utf8(value.0) {
                Ok(value) => {
                    values.insert(key, value);
                }
                Err(_) => warn!(secret = name, key = %key, "skipping non utf-8 secret value"),
            }
        }
        debug!(secret = name, keys = values.len(), "resolved secret");

        Ok(SecretData::new(values))
    }

    async fn resolve_pod(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<String, K8sError> {
        let selector = label_selector(labels);
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods.list(&ListParams::default().labels(&selector)).await?;

        select_pod(namespace, &selector, list.items)
    }
}

/// Picks the single running pod out of the pods matching `selector`.
///
/// Pods being deleted don't count as running.
pub fn select_pod(namespace: &str, selector: &str, pods: Vec<Pod>) -> Result<String, K8sError> {
    let mut running: Vec<String> = pods
        .into_iter()
        .filter(|pod| pod.metadata.deletion_timestamp.is_none())
        .filter(|pod| {
            let phase = pod
                .status
                .as_ref()
                .and_then(|status| status.phase.as_deref())
                .map(PodPhase::from)
                .unwrap_or(PodPhase::Unknown);

            phase == PodPhase::Running
        })
        .filter_map(|pod| pod.metadata.name)
        .collect();

    match running.len() {
        0 => Err(K8sError::PodNotFound {
            namespace: namespace.to_string(),
            selector: selector.to_string(),
        }),
        1 => Ok(running.remove(0)),
        _ => {
            running.sort();
            Err(K8sError::AmbiguousPods {
                namespace: namespace.to_string(),
                selector: selector.to_string(),
                pods: running,
            })
        }
    }
}
