use std::future::Future;

use ts_obs_config::shared::PgConnectionConfig;

use crate::error::ObsResult;
use crate::policy::{MetricName, PolicyKind, PolicyValue};

/// Storage for per-metric overrides and cluster defaults.
///
/// Implementations own precedence: callers never combine an override with a
/// default themselves. Writes made through one catalog value must be visible
/// to reads made through the same value afterwards.
pub trait PolicyCatalog {
    /// Sets the cluster default for the kind of `value`.
    ///
    /// Metrics without an override observe the new value immediately.
    fn set_default_policy(&self, value: PolicyValue) -> impl Future<Output = ObsResult<()>> + Send;

    /// Sets an explicit override on `metric`.
    ///
    /// Fails with [`crate::error::ErrorKind::UnknownMetric`] when the catalog
    /// has no such metric.
    fn set_metric_policy(
        &self,
        metric: &MetricName,
        value: PolicyValue,
    ) -> impl Future<Output = ObsResult<()>> + Send;

    /// Removes the override of `kind` from `metric`. Resetting a metric that has
    /// no override succeeds without changing anything.
    fn reset_metric_policy(
        &self,
        kind: PolicyKind,
        metric: &MetricName,
    ) -> impl Future<Output = ObsResult<()>> + Send;

    /// Returns the effective value of `kind` for `metric`.
    fn effective_policy(
        &self,
        kind: PolicyKind,
        metric: &MetricName,
    ) -> impl Future<Output = ObsResult<PolicyValue>> + Send;

    /// Releases any resources held by the catalog.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Opens a [`PolicyCatalog`] session against a database endpoint, usually the
/// local end of a tunnel.
pub trait CatalogConnector {
    type Catalog: PolicyCatalog + Send + Sync;

    fn connect(
        &self,
        config: &PgConnectionConfig,
    ) -> impl Future<Output = ObsResult<Self::Catalog>> + Send;
}
