use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Errors emitted while opening or running a tunnel.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("pod `{pod}` not found in namespace `{namespace}`")]
    PodNotFound { namespace: String, pod: String },

    #[error("pod `{pod}` in namespace `{namespace}` is not ready: {reason}")]
    PodNotReady {
        namespace: String,
        pod: String,
        reason: String,
    },

    #[error("local address {addr} is already in use")]
    LocalPortInUse { addr: SocketAddr },

    #[error("could not listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("forwarding to port {port} of pod `{pod}` failed: {reason}")]
    Forward {
        pod: String,
        port: u16,
        reason: String,
    },

    #[error("forwarding to port {port} of pod `{pod}` was interrupted")]
    Interrupted { pod: String, port: u16 },

    /// An error returned by the [`kube`] client when talking to the API server.
    #[error("an error occurred with kube when forwarding ports: {0}")]
    Kube(#[from] kube::Error),
}

/// Lifecycle of a [`crate::tunnel::Tunnel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Closed,
    Opening,
    Open,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelState::Closed => f.write_str("closed"),
            TunnelState::Opening => f.write_str("opening"),
            TunnelState::Open => f.write_str("open"),
        }
    }
}

/// A byte stream reaching a port inside a pod.
pub trait ForwardIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> ForwardIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type ForwardStream = Box<dyn ForwardIo>;

/// Opens streams to ports of a pod.
#[async_trait]
pub trait PodConnector: Send + Sync + 'static {
    /// Checks that `pod` exists and is ready to accept forwarded connections.
    async fn check_ready(&self, namespace: &str, pod: &str) -> Result<(), TunnelError>;

    /// Opens one stream to `port` of `pod`.
    async fn connect(
        &self,
        namespace: &str,
        pod: &str,
        port: u16,
    ) -> Result<ForwardStream, TunnelError>;
}
