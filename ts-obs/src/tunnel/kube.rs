use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tracing::{debug, warn};

use crate::k8s::PodPhase;
use crate::tunnel::{ForwardStream, PodConnector, TunnelError};

/// [`PodConnector`] using the port-forward subresource of the Kubernetes API.
#[derive(Clone)]
pub struct KubePodConnector {
    client: Client,
}

impl KubePodConnector {
    pub fn new(client: Client) -> KubePodConnector {
        KubePodConnector { client }
    }
}

/// Explains why `pod` cannot take forwarded connections, if it can't.
fn not_ready_reason(pod: &Pod) -> Option<String> {
    let Some(status) = pod.status.as_ref() else {
        return Some("pod has no status".to_string());
    };

    let phase = status
        .phase
        .as_deref()
        .map(PodPhase::from)
        .unwrap_or(PodPhase::Unknown);
    if phase != PodPhase::Running {
        return Some(format!("pod phase is {phase:?}"));
    }

    let ready = status
        .conditions
        .iter()
        .flatten()
        .any(|condition| condition.type_ == "Ready" && condition.status == "True");
    if !ready {
        return Some("pod is running but not ready".to_string());
    }

    None
}

#[async_trait]
impl PodConnector for KubePodConnector {
    async fn check_ready(&self, namespace: &str, pod: &str) -> Result<(), TunnelError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let Some(found) = pods.get_opt(pod).await? else {
            return Err(TunnelError::PodNotFound {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
            });
        };

        if let Some(reason) = not_ready_reason(&found) {
            return Err(TunnelError::PodNotReady {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
                reason,
            });
        }

        Ok(())
    }

    async fn connect(
        &self,
        namespace: &str,
        pod: &str,
        port: u16,
    ) -> Result<ForwardStream, TunnelError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut forwarder = pods.portforward(pod, &[port]).await?;

        let stream = forwarder
            .take_stream(port)
            .ok_or_else(|| TunnelError::Forward {
                pod: pod.to_string(),
                port,
                reason: "no stream for the requested port".to_string(),
            })?;

        let error = forwarder.take_error(port);
        let pod_name = pod.to_string();
        tokio::spawn(async move {
            if let Some(error) = error
                && let Some(message) = error.await
            {
                warn!(pod = %pod_name, port, %message, "port forward reported an error");
            }

            if let Err(err) = forwarder.join().await {
                warn!(pod = %pod_name, port, error = %err, "port forward ended with an error");
            }
        });
        debug!(pod, port, "opened forwarded stream");

        Ok(Box::new(stream))
    }
}
