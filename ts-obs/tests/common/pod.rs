use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::copy;
use tokio::net::{TcpListener, TcpStream};
use ts_obs::tunnel::{ForwardStream, PodConnector, TunnelError};

/// Starts a TCP server echoing every byte back and returns its address.
pub async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.into_split();
                let _ = copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// Connector standing in for a pod: every forwarded stream is a TCP connection
/// to a local address.
#[derive(Debug, Clone)]
pub struct LoopbackPodConnector {
    target: SocketAddr,
    ready: bool,
    broken: bool,
    readiness_delay: Option<Duration>,
}

impl LoopbackPodConnector {
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            ready: true,
            broken: false,
            readiness_delay: None,
        }
    }

    pub async fn to_echo_server() -> Self {
        Self::new(spawn_echo_server().await)
    }

    /// The pod exists but never becomes ready.
    pub fn not_ready(mut self) -> Self {
        self.ready = false;

        self
    }

    /// Readiness checks wait `delay` before answering.
    pub fn slow_to_answer(mut self, delay: Duration) -> Self {
        self.readiness_delay = Some(delay);

        self
    }

    /// The pod accepts the tunnel but every forwarded stream fails to open.
    pub fn broken(mut self) -> Self {
        self.broken = true;

        self
    }
}

#[async_trait]
impl PodConnector for LoopbackPodConnector {
    async fn check_ready(&self, namespace: &str, pod: &str) -> Result<(), TunnelError> {
        if let Some(delay) = self.readiness_delay {
            tokio::time::sleep(delay).await;
        }

        if !self.ready {
            return Err(TunnelError::PodNotReady {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
                reason: "pod is running but not ready".to_string(),
            });
        }

        Ok(())
    }

    async fn connect(
        &self,
        _namespace: &str,
        pod: &str,
        port: u16,
    ) -> Result<ForwardStream, TunnelError> {
        if self.broken {
            return Err(TunnelError::Forward {
                pod: pod.to_string(),
                port,
                reason: "connection reset by pod".to_string(),
            });
        }

        let stream = TcpStream::connect(self.target)
            .await
            .map_err(|err| TunnelError::Forward {
                pod: pod.to_string(),
                port,
                reason: err.to_string(),
            })?;

        Ok(Box::new(stream))
    }
}
