use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use ts_obs_config::shared::PgConnectionConfig;

use crate::bail;
use crate::catalog::{CatalogConnector, PolicyCatalog};
use crate::error::{ErrorKind, ObsResult};
use crate::policy::{
    DefaultPolicy, MetricName, PolicyKind, PolicyOverride, PolicyValue, resolve_effective,
};

/// Override state of both policy kinds for one metric.
#[derive(Debug, Clone, Copy, Default)]
struct MetricPolicies {
    retention: PolicyOverride,
    chunk_interval: PolicyOverride,
}

impl MetricPolicies {
    fn get(&self, kind: PolicyKind) -> PolicyOverride {
        match kind {
            PolicyKind::Retention => self.retention,
            PolicyKind::ChunkInterval => self.chunk_interval,
        }
    }

    fn get_mut(&mut self, kind: PolicyKind) -> &mut PolicyOverride {
        match kind {
            PolicyKind::Retention => &mut self.retention,
            PolicyKind::ChunkInterval => &mut self.chunk_interval,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    retention_default: DefaultPolicy,
    chunk_interval_default: DefaultPolicy,
    metrics: HashMap<MetricName, MetricPolicies>,
}

impl Inner {
    fn default_policy(&self, kind: PolicyKind) -> DefaultPolicy {
        match kind {
            PolicyKind::Retention => self.retention_default,
            PolicyKind::ChunkInterval => self.chunk_interval_default,
        }
    }

    fn metric(&self, metric: &MetricName) -> ObsResult<&MetricPolicies> {
        match self.metrics.get(metric) {
            Some(policies) => Ok(policies),
            None => bail!(
                ErrorKind::UnknownMetric,
                "Metric does not exist in the catalog",
                format!("no metric named `{metric}`")
            ),
        }
    }

    fn metric_mut(&mut self, metric: &MetricName) -> ObsResult<&mut MetricPolicies> {
        match self.metrics.get_mut(metric) {
            Some(policies) => Ok(policies),
            None => bail!(
                ErrorKind::UnknownMetric,
                "Metric does not exist in the catalog",
                format!("no metric named `{metric}`")
            ),
        }
    }
}

/// In-process catalog implementing the three-state policy model.
///
/// Cloned values share state, so a clone handed to a resolver and one kept by a
/// test observe the same policies.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog that already knows the given metrics, all inheriting
    /// the system defaults.
    pub fn with_metrics<I, S>(metrics: I) -> ObsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = Inner::default();
        for metric in metrics {
            inner
                .metrics
                .insert(MetricName::new(metric)?, MetricPolicies::default());
        }

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    /// Registers a metric, as ingesting its first sample would.
    pub async fn register_metric(&self, metric: MetricName) {
        let mut inner = self.inner.lock().await;
        inner.metrics.entry(metric).or_default();
    }

    /// Returns the override state of `kind` for `metric`.
    pub async fn metric_override(
        &self,
        kind: PolicyKind,
        metric: &MetricName,
    ) -> ObsResult<PolicyOverride> {
        let inner = self.inner.lock().await;

        Ok(inner.metric(metric)?.get(kind))
    }

    /// Returns the cluster default of `kind`.
    pub async fn default_policy(&self, kind: PolicyKind) -> DefaultPolicy {
        let inner = self.inner.lock().await;

        inner.default_policy(kind)
    }
}

impl PolicyCatalog for MemoryCatalog {
    async fn set_default_policy(&self, value: PolicyValue) -> ObsResult<()> {
        let mut inner = self.inner.lock().await;

        match value.kind() {
            PolicyKind::Retention => inner.retention_default = DefaultPolicy::Configured(value),
            PolicyKind::ChunkInterval => {
                inner.chunk_interval_default = DefaultPolicy::Configured(value)
            }
        }

        Ok(())
    }

    async fn set_metric_policy(&self, metric: &MetricName, value: PolicyValue) -> ObsResult<()> {
        let mut inner = self.inner.lock().await;

        *inner.metric_mut(metric)?.get_mut(value.kind()) = PolicyOverride::Explicit(value);

        Ok(())
    }

    async fn reset_metric_policy(&self, kind: PolicyKind, metric: &MetricName) -> ObsResult<()> {
        let mut inner = self.inner.lock().await;

        *inner.metric_mut(metric)?.get_mut(kind) = PolicyOverride::Inherited;

        Ok(())
    }

    async fn effective_policy(
        &self,
        kind: PolicyKind,
        metric: &MetricName,
    ) -> ObsResult<PolicyValue> {
        let inner = self.inner.lock().await;

        let metric_override = inner.metric(metric)?.get(kind);

        Ok(resolve_effective(
            kind,
            metric_override,
            inner.default_policy(kind),
        ))
    }

    async fn close(&self) {}
}

impl CatalogConnector for MemoryCatalog {
    type Catalog = MemoryCatalog;

    async fn connect(&self, _config: &PgConnectionConfig) -> ObsResult<MemoryCatalog> {
        Ok(self.clone())
    }
}
