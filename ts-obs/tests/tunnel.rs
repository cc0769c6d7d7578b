mod common;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use ts_obs::catalog::memory::MemoryCatalog;
use ts_obs::error::ErrorKind;
use ts_obs::invocation::Invocation;
use ts_obs::policy::{MetricName, PolicyKind, PolicyOperation};
use ts_obs::tunnel::{TunnelError, TunnelManager, TunnelState};
use ts_obs_config::shared::PORT_FORWARD_LOCAL_PORT;
use ts_obs_telemetry::tracing::init_test_tracing;

use crate::common::catalog::{ProbingCatalogConnector, StalledCatalogConnector};
use crate::common::cluster::StaticClusterLocator;
use crate::common::pod::LoopbackPodConnector;
use crate::common::{
    DATABASE_PASSWORD, DATABASE_POD, NAMESPACE, RELEASE_NAME, is_listening, test_config,
};

fn get_retention(metric: &str) -> PolicyOperation {
    PolicyOperation::Get {
        kind: PolicyKind::Retention,
        metric: MetricName::new(metric).unwrap(),
    }
}

fn release_locator() -> StaticClusterLocator {
    StaticClusterLocator::for_release(RELEASE_NAME, DATABASE_PASSWORD, DATABASE_POD)
}

fn probing_catalogs() -> ProbingCatalogConnector {
    ProbingCatalogConnector::new(MemoryCatalog::with_metrics(["go_info"]).unwrap())
}

#[tokio::test(flavor = "multi_thread")]
async fn tunnel_forwards_until_closed() {
    init_test_tracing();

    let mut config = test_config().await;
    config.tunnel.local_port = Some(0);

    let manager = TunnelManager::new(LoopbackPodConnector::to_echo_server().await);
    let mut tunnel = manager
        .open(
            NAMESPACE,
            DATABASE_POD,
            config.tunnel.policy_addr(),
            config.tunnel.remote_port,
        )
        .await
        .unwrap();
    assert_eq!(tunnel.state(), TunnelState::Open);
    assert_ne!(tunnel.local_addr().port(), 0);
    assert_eq!(tunnel.remote_port(), 5432);

    // Each local connection gets its own forwarded stream.
    for payload in [b"first".as_slice(), b"second".as_slice()] {
        let mut stream = TcpStream::connect(tunnel.local_addr()).await.unwrap();
        stream.write_all(payload).await.unwrap();

        let mut echoed = vec![0u8; payload.len()];
        stream.read_exact(&mut echoed).await.unwrap();
        assert_eq!(echoed, payload);
    }
    assert!(!tunnel.is_interrupted());

    tunnel.close().await;
    assert_eq!(tunnel.state(), TunnelState::Closed);
    assert!(TcpStream::connect(tunnel.local_addr()).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_tunnel_releases_local_port() {
    init_test_tracing();

    let config = test_config().await;
    let local_port = config.tunnel.local_port.unwrap();

    let manager = TunnelManager::new(LoopbackPodConnector::to_echo_server().await);
    let tunnel = manager
        .open(
            NAMESPACE,
            DATABASE_POD,
            config.tunnel.policy_addr(),
            config.tunnel.remote_port,
        )
        .await
        .unwrap();
    assert!(is_listening(local_port).await);

    drop(tunnel);

    // The accept loop is aborted asynchronously.
    let mut released = false;
    for _ in 0..50 {
        if !is_listening(local_port).await {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(released);
}

#[tokio::test(flavor = "multi_thread")]
async fn local_port_in_use_fails_opening() {
    init_test_tracing();

    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = test_config().await;
    config.tunnel.local_port = Some(occupied.local_addr().unwrap().port());

    let manager = TunnelManager::new(LoopbackPodConnector::to_echo_server().await);
    let err = manager
        .open(
            NAMESPACE,
            DATABASE_POD,
            config.tunnel.policy_addr(),
            config.tunnel.remote_port,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TunnelError::LocalPortInUse { .. }));

    let invocation = Invocation::new(
        config,
        release_locator(),
        LoopbackPodConnector::to_echo_server().await,
        probing_catalogs(),
    );
    let err = invocation.run(&get_retention("go_info")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TunnelError);
}

#[tokio::test(flavor = "multi_thread")]
async fn pod_not_ready_fails_opening() {
    init_test_tracing();

    let config = test_config().await;
    let local_port = config.tunnel.local_port.unwrap();
    let invocation = Invocation::new(
        config,
        release_locator(),
        LoopbackPodConnector::to_echo_server().await.not_ready(),
        probing_catalogs(),
    );

    let err = invocation.run(&get_retention("go_info")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TunnelError);
    assert!(!is_listening(local_port).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_secret_is_not_found() {
    init_test_tracing();

    let locator = StaticClusterLocator::default().with_running_pod(DATABASE_POD);
    let invocation = Invocation::new(
        test_config().await,
        locator,
        LoopbackPodConnector::to_echo_server().await,
        probing_catalogs(),
    );

    let err = invocation.run(&get_retention("go_info")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(
        err.detail()
            .unwrap()
            .contains("obs-timescaledb-passwords")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_password_key_is_not_found() {
    init_test_tracing();

    let locator = StaticClusterLocator::default()
        .with_secret("obs-timescaledb-passwords", "admin", "secret")
        .with_running_pod(DATABASE_POD);
    let invocation = Invocation::new(
        test_config().await,
        locator,
        LoopbackPodConnector::to_echo_server().await,
        probing_catalogs(),
    );

    let err = invocation.run(&get_retention("go_info")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test(flavor = "multi_thread")]
async fn pod_lookup_rejects_zero_or_many_pods() {
    init_test_tracing();

    let no_pod = StaticClusterLocator::default().with_secret(
        "obs-timescaledb-passwords",
        "postgres",
        DATABASE_PASSWORD,
    );
    let invocation = Invocation::new(
        test_config().await,
        no_pod,
        LoopbackPodConnector::to_echo_server().await,
        probing_catalogs(),
    );
    let err = invocation.run(&get_retention("go_info")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let two_pods = release_locator().with_running_pod("obs-timescaledb-1");
    let invocation = Invocation::new(
        test_config().await,
        two_pods,
        LoopbackPodConnector::to_echo_server().await,
        probing_catalogs(),
    );
    let err = invocation.run(&get_retention("go_info")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);
}

#[tokio::test(flavor = "multi_thread")]
async fn deadline_closes_tunnel_before_failing() {
    init_test_tracing();

    let mut config = test_config().await;
    config.timeout_secs = 1;
    let local_port = config.tunnel.local_port.unwrap();
    let invocation = Invocation::new(
        config,
        release_locator(),
        LoopbackPodConnector::to_echo_server().await,
        StalledCatalogConnector,
    );

    let err = invocation.run(&get_retention("go_info")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(!is_listening(local_port).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn deadline_bounds_pod_readiness() {
    init_test_tracing();

    let mut config = test_config().await;
    config.timeout_secs = 1;
    let local_port = config.tunnel.local_port.unwrap();
    let invocation = Invocation::new(
        config,
        release_locator(),
        LoopbackPodConnector::to_echo_server()
            .await
            .slow_to_answer(Duration::from_secs(60)),
        probing_catalogs(),
    );

    let err = invocation.run(&get_retention("go_info")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(!is_listening(local_port).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn deadline_bounds_pod_lookup() {
    init_test_tracing();

    let mut config = test_config().await;
    config.timeout_secs = 1;
    let local_port = config.tunnel.local_port.unwrap();
    let invocation = Invocation::new(
        config,
        release_locator().with_slow_pod_lookup(Duration::from_secs(60)),
        LoopbackPodConnector::to_echo_server().await,
        probing_catalogs(),
    );

    let err = invocation.run(&get_retention("go_info")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(!is_listening(local_port).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn policy_tunnel_does_not_need_the_port_forward_port() {
    init_test_tracing();

    // Stands in for a port-forward held by the operator. If something else
    // already owns the port, it is occupied all the same.
    let _held = TcpListener::bind(("127.0.0.1", PORT_FORWARD_LOCAL_PORT)).await;

    let mut config = test_config().await;
    config.tunnel.local_port = None;
    let port_forward_config = config.clone();
    let catalogs = probing_catalogs();
    let first = Invocation::new(
        config.clone(),
        release_locator(),
        LoopbackPodConnector::to_echo_server().await,
        catalogs.clone(),
    );
    let second = Invocation::new(
        config,
        release_locator(),
        LoopbackPodConnector::to_echo_server().await,
        catalogs.clone(),
    );

    let operation = get_retention("go_info");
    let (first, second) = tokio::join!(first.run(&operation), second.run(&operation));
    first.unwrap();
    second.unwrap();
    assert_eq!(catalogs.passwords().len(), 2);

    // The port-forward tunnel keeps its well-known port.
    let err = Invocation::new(
        port_forward_config,
        release_locator(),
        LoopbackPodConnector::to_echo_server().await,
        probing_catalogs(),
    )
    .open_tunnel()
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TunnelError);
    assert!(err.detail().unwrap().contains("already in use"));
}

#[tokio::test(flavor = "multi_thread")]
async fn broken_forward_is_reported_as_tunnel_error() {
    init_test_tracing();

    let config = test_config().await;
    let local_port = config.tunnel.local_port.unwrap();
    let invocation = Invocation::new(
        config,
        release_locator(),
        LoopbackPodConnector::to_echo_server().await.broken(),
        probing_catalogs(),
    );

    let err = invocation.run(&get_retention("go_info")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TunnelError);
    assert!(!is_listening(local_port).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn configured_password_skips_secret_lookup() {
    init_test_tracing();

    let mut config = test_config().await;
    config.database.password = Some("from-config".to_string().into());

    let locator = StaticClusterLocator::default().with_running_pod(DATABASE_POD);
    let catalogs = probing_catalogs();
    let invocation = Invocation::new(
        config,
        locator.clone(),
        LoopbackPodConnector::to_echo_server().await,
        catalogs.clone(),
    );

    invocation.run(&get_retention("go_info")).await.unwrap();
    assert_eq!(catalogs.passwords(), vec![Some("from-config".to_string())]);
    assert_eq!(locator.calls(), 1);
}
