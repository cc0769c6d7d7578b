use std::io::ErrorKind as IoErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::tunnel::{PodConnector, TunnelError, TunnelState};

/// Where a tunnel forwards to.
#[derive(Debug, Clone)]
struct ForwardTarget {
    namespace: String,
    pod: String,
    port: u16,
}

/// Opens tunnels through a [`PodConnector`].
#[derive(Debug)]
pub struct TunnelManager<P> {
    connector: Arc<P>,
}

impl<P> TunnelManager<P>
where
    P: PodConnector,
{
    pub fn new(connector: P) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    /// Opens a tunnel from `addr` to `remote_port` of `pod`.
    ///
    /// Fails when the pod is missing or not ready, or when the local port is
    /// already bound. A local port of 0 binds an ephemeral port, readable from
    /// [`Tunnel::local_addr`].
    pub async fn open(
        &self,
        namespace: &str,
        pod: &str,
        addr: SocketAddr,
        remote_port: u16,
    ) -> Result<Tunnel, TunnelError> {
        let target = ForwardTarget {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            port: remote_port,
        };
        debug!(namespace, pod, state = %TunnelState::Opening, "opening tunnel");

        self.connector.check_ready(namespace, pod).await?;

        let listener = TcpListener::bind(addr).await.map_err(|err| match err.kind() {
            IoErrorKind::AddrInUse => TunnelError::LocalPortInUse { addr },
            _ => TunnelError::Bind { addr, source: err },
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| TunnelError::Bind { addr, source: err })?;

        let interrupted = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let accept_handle = tokio::spawn(accept_loop(
            listener,
            self.connector.clone(),
            target.clone(),
            interrupted.clone(),
            shutdown_rx,
        ));

        info!(
            %local_addr,
            namespace,
            pod,
            remote_port = target.port,
            "tunnel open"
        );

        Ok(Tunnel {
            target,
            local_addr,
            state: TunnelState::Open,
            interrupted,
            shutdown_tx,
            accept_handle: Some(accept_handle),
        })
    }
}

/// An open forwarding session owned by one invocation.
///
/// Dropping the tunnel stops forwarding as well; [`Tunnel::close`] additionally
/// waits for the forwarding tasks to finish.
#[derive(Debug)]
pub struct Tunnel {
    target: ForwardTarget,
    local_addr: SocketAddr,
    state: TunnelState,
    interrupted: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<()>,
    accept_handle: Option<JoinHandle<()>>,
}

impl Tunnel {
    /// Address the tunnel listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn pod(&self) -> &str {
        &self.target.pod
    }

    pub fn remote_port(&self) -> u16 {
        self.target.port
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    /// Returns `true` once a forwarded connection failed to open or broke.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Returns the error describing the interruption, if any.
    pub fn interruption(&self) -> Option<TunnelError> {
        self.is_interrupted().then(|| TunnelError::Interrupted {
            pod: self.target.pod.clone(),
            port: self.target.port,
        })
    }

    /// Stops accepting connections and tears down every forwarded stream.
    pub async fn close(&mut self) {
        if self.state == TunnelState::Closed {
            return;
        }

        // A send error means the accept loop already stopped.
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.accept_handle.take()
            && let Err(err) = handle.await
            && !err.is_cancelled()
        {
            warn!(error = %err, "tunnel accept loop failed");
        }

        self.state = TunnelState::Closed;
        info!(local_addr = %self.local_addr, pod = %self.target.pod, "tunnel closed");
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        // Aborting the accept loop drops its listener and join set, which aborts
        // every forwarded connection.
        if let Some(handle) = self.accept_handle.take() {
            handle.abort();
            debug!(local_addr = %self.local_addr, "tunnel dropped while open");
        }
    }
}

async fn accept_loop<P>(
    listener: TcpListener,
    connector: Arc<P>,
    target: ForwardTarget,
    interrupted: Arc<AtomicBool>,
    mut shutdown_rx: watch::Receiver<()>,
) where
    P: PodConnector,
{
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                debug!("shutting down tunnel accept loop");
                break;
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((local, peer)) => {
                        debug!(%peer, "accepted local connection");
                        connections.spawn(forward_connection(
                            local,
                            connector.clone(),
                            target.clone(),
                            interrupted.clone(),
                        ));
                    }
                    Err(err) => warn!(error = %err, "failed to accept local connection"),
                }
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    connections.shutdown().await;
}

async fn forward_connection<P>(
    mut local: TcpStream,
    connector: Arc<P>,
    target: ForwardTarget,
    interrupted: Arc<AtomicBool>,
) where
    P: PodConnector,
{
    let mut upstream = match connector
        .connect(&target.namespace, &target.pod, target.port)
        .await
    {
        Ok(upstream) => upstream,
        Err(err) => {
            interrupted.store(true, Ordering::Release);
            warn!(error = %err, pod = %target.pod, "failed to open forwarded stream");
            return;
        }
    };

    match copy_bidirectional(&mut local, &mut upstream).await {
        Ok((sent, received)) => debug!(sent, received, "forwarded connection finished"),
        Err(err) => {
            interrupted.store(true, Ordering::Release);
            warn!(error = %err, pod = %target.pod, "forwarded connection broke");
        }
    }
}
