use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::ExposeSecret;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use ts_obs::catalog::memory::MemoryCatalog;
use ts_obs::catalog::{CatalogConnector, PolicyCatalog};
use ts_obs::error::{ErrorKind, ObsError, ObsResult};
use ts_obs::policy::{MetricName, PolicyKind, PolicyValue};
use ts_obs_config::shared::PgConnectionConfig;

const PROBE: &[u8] = b"ping";

/// Sends a probe through the tunnel and expects it echoed back.
async fn probe(config: &PgConnectionConfig) -> ObsResult<()> {
    let connection_error = |err: std::io::Error| {
        ObsError::from((
            ErrorKind::ConnectionError,
            "Catalog connection failed",
            err.to_string(),
        ))
    };

    let mut stream = TcpStream::connect((config.host.as_str(), config.port))
        .await
        .map_err(connection_error)?;
    stream.write_all(PROBE).await.map_err(connection_error)?;

    let mut echoed = [0u8; PROBE.len()];
    stream
        .read_exact(&mut echoed)
        .await
        .map_err(connection_error)?;
    assert_eq!(echoed, PROBE);

    Ok(())
}

/// Connector that checks the tunnel carries bytes, then hands out a shared
/// in-memory catalog.
#[derive(Debug, Clone)]
pub struct ProbingCatalogConnector {
    catalog: MemoryCatalog,
    passwords: Arc<Mutex<Vec<Option<String>>>>,
}

impl ProbingCatalogConnector {
    pub fn new(catalog: MemoryCatalog) -> Self {
        Self {
            catalog,
            passwords: Arc::default(),
        }
    }

    /// Passwords of every session opened so far.
    pub fn passwords(&self) -> Vec<Option<String>> {
        self.passwords.lock().unwrap().clone()
    }
}

impl CatalogConnector for ProbingCatalogConnector {
    type Catalog = MemoryCatalog;

    async fn connect(&self, config: &PgConnectionConfig) -> ObsResult<MemoryCatalog> {
        probe(config).await?;

        let password = config
            .password
            .as_ref()
            .map(|password| password.expose_secret().to_string());
        self.passwords.lock().unwrap().push(password);

        Ok(self.catalog.clone())
    }
}

/// Catalog whose calls never complete in time.
#[derive(Debug, Clone, Default)]
pub struct StalledCatalog;

const STALL: Duration = Duration::from_secs(3600);

impl PolicyCatalog for StalledCatalog {
    async fn set_default_policy(&self, _value: PolicyValue) -> ObsResult<()> {
        tokio::time::sleep(STALL).await;

        Ok(())
    }

    async fn set_metric_policy(&self, _metric: &MetricName, _value: PolicyValue) -> ObsResult<()> {
        tokio::time::sleep(STALL).await;

        Ok(())
    }

    async fn reset_metric_policy(&self, _kind: PolicyKind, _metric: &MetricName) -> ObsResult<()> {
        tokio::time::sleep(STALL).await;

        Ok(())
    }

    async fn effective_policy(
        &self,
        kind: PolicyKind,
        _metric: &MetricName,
    ) -> ObsResult<PolicyValue> {
        tokio::time::sleep(STALL).await;

        Ok(kind.system_default())
    }

    async fn close(&self) {}
}

/// Connector handing out [`StalledCatalog`]s once the tunnel answers.
#[derive(Debug, Clone, Default)]
pub struct StalledCatalogConnector;

impl CatalogConnector for StalledCatalogConnector {
    type Catalog = StalledCatalog;

    async fn connect(&self, config: &PgConnectionConfig) -> ObsResult<StalledCatalog> {
        probe(config).await?;

        Ok(StalledCatalog)
    }
}

/// Connector whose database refuses the session although the tunnel answers.
#[derive(Debug, Clone, Default)]
pub struct UnreachableCatalogConnector;

impl CatalogConnector for UnreachableCatalogConnector {
    type Catalog = MemoryCatalog;

    async fn connect(&self, config: &PgConnectionConfig) -> ObsResult<MemoryCatalog> {
        probe(config).await?;

        Err(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "database refused the connection",
        ))
        .into())
    }
}
