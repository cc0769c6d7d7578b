use std::future::Future;
use std::net::SocketAddr;

use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};
use ts_obs_config::SerializableSecretString;
use ts_obs_config::shared::ToolConfig;

use crate::catalog::{CatalogConnector, PolicyCatalog};
use crate::error::{ErrorKind, ObsError, ObsResult};
use crate::k8s::{ClusterLocator, K8sError};
use crate::obs_error;
use crate::policy::resolver::PolicyResolver;
use crate::policy::{PolicyOperation, PolicyOutcome};
use crate::tunnel::{PodConnector, Tunnel, TunnelManager};

/// Runs one command against the cluster: locate, tunnel, operate, tear down.
///
/// Every step shares the invocation deadline. The tunnel is closed before
/// [`Invocation::run`] returns, whatever the outcome.
pub struct Invocation<L, P, C> {
    config: ToolConfig,
    locator: L,
    tunnels: TunnelManager<P>,
    catalogs: C,
}

impl<L, P, C> Invocation<L, P, C>
where
    L: ClusterLocator,
    P: PodConnector,
    C: CatalogConnector + Sync,
{
    pub fn new(config: ToolConfig, locator: L, pod_connector: P, catalogs: C) -> Self {
        Self {
            config,
            locator,
            tunnels: TunnelManager::new(pod_connector),
            catalogs,
        }
    }

    /// Runs `operation` through a fresh tunnel and catalog session.
    pub async fn run(&self, operation: &PolicyOperation) -> ObsResult<PolicyOutcome> {
        let deadline = self.deadline();
        info!(%operation, "running policy operation");

        let password = self
            .within(deadline, operation, self.resolve_password())
            .await?;
        let mut tunnel = self
            .within(deadline, operation, self.open(self.config.tunnel.policy_addr()))
            .await?;

        let result = timeout_at(deadline, self.execute(&tunnel, password, operation)).await;
        let interruption = tunnel.interruption();
        tunnel.close().await;

        match result {
            Err(_) => Err(self.timeout_error(operation)),
            Ok(Err(err)) => match interruption {
                Some(interruption) => {
                    warn!(error = %err, "catalog call failed on an interrupted tunnel");
                    Err(ObsError::from(interruption).with_context(format!("{operation}: {err}")))
                }
                None => Err(err),
            },
            Ok(Ok(outcome)) => Ok(outcome),
        }
    }

    /// Opens a tunnel to the database pod, for callers holding it themselves.
    ///
    /// Only opening is bounded by the deadline.
    pub async fn open_tunnel(&self) -> ObsResult<Tunnel> {
        let deadline = self.deadline();
        let addr = self.config.tunnel.port_forward_addr();

        self.within(deadline, "port-forward", self.open(addr)).await
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.timeout()
    }

    fn timeout_error(&self, context: impl std::fmt::Display) -> ObsError {
        obs_error!(
            ErrorKind::Timeout,
            "Invocation deadline exceeded",
            format!(
                "{context} did not finish within {}s",
                self.config.timeout_secs
            )
        )
    }

    async fn within<T>(
        &self,
        deadline: Instant,
        context: impl std::fmt::Display,
        step: impl Future<Output = ObsResult<T>>,
    ) -> ObsResult<T> {
        match timeout_at(deadline, step).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error(context)),
        }
    }

    /// Reads the database password from the release's secret, unless one is
    /// configured explicitly.
    async fn resolve_password(&self) -> ObsResult<Option<SerializableSecretString>> {
        if self.config.database.password.is_some() {
            debug!("using configured database password");
            return Ok(None);
        }

        let cluster = &self.config.cluster;
        let secret_name = cluster.password_secret_name();
        let secret = self
            .locator
            .resolve_secret(&cluster.namespace, &secret_name)
            .await?;

        match secret.get(&cluster.password_secret_key) {
            Some(password) => Ok(Some(password.clone())),
            None => Err(K8sError::SecretKeyNotFound {
                namespace: cluster.namespace.clone(),
                name: secret_name,
                key: cluster.password_secret_key.clone(),
            }
            .into()),
        }
    }

    async fn open(&self, addr: SocketAddr) -> ObsResult<Tunnel> {
        let cluster = &self.config.cluster;
        let pod = self
            .locator
            .resolve_pod(&cluster.namespace, &cluster.pod_selector_labels())
            .await?;
        debug!(%pod, "resolved database pod");

        let tunnel = self
            .tunnels
            .open(
                &cluster.namespace,
                &pod,
                addr,
                self.config.tunnel.remote_port,
            )
            .await?;

        Ok(tunnel)
    }

    async fn execute(
        &self,
        tunnel: &Tunnel,
        password: Option<SerializableSecretString>,
        operation: &PolicyOperation,
    ) -> ObsResult<PolicyOutcome> {
        let connection = self
            .config
            .database
            .connection_for(tunnel.local_addr(), password);
        let catalog = self
            .catalogs
            .connect(&connection)
            .await
            .map_err(|err| err.with_context(operation))?;

        let resolver = PolicyResolver::new(catalog);
        let result = resolver.execute(operation).await;
        resolver.catalog().close().await;

        result
    }
}
