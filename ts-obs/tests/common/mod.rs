#![allow(dead_code)]

pub mod catalog;
pub mod cluster;
pub mod pod;

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use ts_obs::catalog::CatalogConnector;
use ts_obs::invocation::Invocation;
use ts_obs_config::shared::ToolConfig;

use crate::common::cluster::StaticClusterLocator;
use crate::common::pod::LoopbackPodConnector;

pub const NAMESPACE: &str = "observability";
pub const RELEASE_NAME: &str = "obs";
pub const DATABASE_POD: &str = "obs-timescaledb-0";
pub const DATABASE_PASSWORD: &str = "hunter2";

/// Configuration pointing at the fake release, tunneling through a free local
/// port.
pub async fn test_config() -> ToolConfig {
    let mut config = ToolConfig::default();
    config.cluster.namespace = NAMESPACE.to_string();
    config.cluster.release_name = RELEASE_NAME.to_string();
    config.tunnel.local_port = Some(free_local_port().await);
    config.timeout_secs = 5;

    config
}

/// Returns a local port nothing listens on right now.
pub async fn free_local_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    listener.local_addr().unwrap().port()
}

/// Returns `true` when something accepts connections on `port`.
pub async fn is_listening(port: u16) -> bool {
    TcpStream::connect(SocketAddr::from(([127, 0, 0, 1], port)))
        .await
        .is_ok()
}

/// Builds an invocation against the fake release whose tunnel forwards to a
/// local echo server.
pub async fn test_invocation<C>(
    config: ToolConfig,
    catalogs: C,
) -> (
    Invocation<StaticClusterLocator, LoopbackPodConnector, C>,
    StaticClusterLocator,
)
where
    C: CatalogConnector + Sync,
{
    let locator = StaticClusterLocator::for_release(RELEASE_NAME, DATABASE_PASSWORD, DATABASE_POD);
    let pod_connector = LoopbackPodConnector::to_echo_server().await;
    let invocation = Invocation::new(config, locator.clone(), pod_connector, catalogs);

    (invocation, locator)
}
