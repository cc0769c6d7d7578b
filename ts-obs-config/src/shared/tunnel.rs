use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Port the TimescaleDB container listens on.
const DEFAULT_REMOTE_PORT: u16 = 5432;

/// Local port `timescaledb port-forward` binds when none is configured, chosen
/// so it does not clash with a locally running Postgres.
pub const PORT_FORWARD_LOCAL_PORT: u16 = 5433;

/// Port-forward settings for reaching the database pod.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TunnelConfig {
    /// Local address the forwarded port is bound on.
    pub bind_address: IpAddr,
    /// Local port to bind. Unset, policy commands bind an ephemeral port and
    /// `port-forward` binds [`PORT_FORWARD_LOCAL_PORT`]. `0` always lets the
    /// operating system choose.
    #[serde(default)]
    pub local_port: Option<u16>,
    /// Port on the pod to forward to.
    pub remote_port: u16,
}

impl TunnelConfig {
    /// Address of the tunnel a policy command opens for its own catalog
    /// session.
    pub fn policy_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.local_port.unwrap_or(0))
    }

    /// Address of the tunnel held open for external clients.
    pub fn port_forward_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.bind_address,
            self.local_port.unwrap_or(PORT_FORWARD_LOCAL_PORT),
        )
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.remote_port == 0 {
            return Err(ValidationError::RemotePortZero);
        }

        Ok(())
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            local_port: None,
            remote_port: DEFAULT_REMOTE_PORT,
        }
    }
}
