use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};
use ts_obs_config::shared::{IntoConnectOptions, PgConnectionConfig};

use crate::catalog::{CatalogConnector, PolicyCatalog};
use crate::duration::{ChunkInterval, RetentionPeriod};
use crate::error::{ErrorKind, ObsError, ObsResult};
use crate::policy::{MetricName, PolicyKind, PolicyValue};
use crate::{bail, obs_error};

/// A single connection keeps every statement of an invocation on one session,
/// so a read issued after a write observes it.
const NUM_POOL_CONNECTIONS: u32 = 1;

/// SQLSTATE raised for a missing relation.
const UNDEFINED_TABLE: &str = "42P01";
/// SQLSTATE raised by `RAISE ... USING ERRCODE = 'no_data_found'`.
const NO_DATA_FOUND: &str = "P0002";

/// Statements writing one policy kind through the Promscale API.
///
/// Values are bound as integers in the kind's canonical unit and turned into
/// intervals server side.
struct PolicyStatements {
    set_default: &'static str,
    set_metric: &'static str,
    reset_metric: &'static str,
}

const RETENTION_STATEMENTS: PolicyStatements = PolicyStatements {
    set_default: "select prom_api.set_default_retention_period($1::double precision * interval '1 second')",
    set_metric: "select prom_api.set_metric_retention_period($1, $2::double precision * interval '1 second')",
    reset_metric: "select prom_api.reset_metric_retention_period($1)",
};

const CHUNK_INTERVAL_STATEMENTS: PolicyStatements = PolicyStatements {
    set_default: "select prom_api.set_default_chunk_interval($1::double precision * interval '1 microsecond')",
    set_metric: "select prom_api.set_metric_chunk_interval($1, $2::double precision * interval '1 microsecond')",
    reset_metric: "select prom_api.reset_metric_chunk_interval($1)",
};

/// Effective retention, resolved by the catalog, in whole seconds.
const EFFECTIVE_RETENTION_QUERY: &str =
    "select extract(epoch from _prom_catalog.get_metric_retention_period($1))::bigint";

/// Chunk interval of the metric's hypertable, in microseconds. Promscale keeps the
/// hypertable in sync with the override or the default, so this is the
/// effective value.
const EFFECTIVE_CHUNK_INTERVAL_QUERY: &str = r#"
    select d.interval_length
    from _timescaledb_catalog.hypertable h
    inner join lateral (
        select dim.interval_length
        from _timescaledb_catalog.dimension dim
        where dim.hypertable_id = h.id
        order by dim.id
        limit 1
    ) d on (true)
    where h.table_name = $1
"#;

fn statements(kind: PolicyKind) -> &'static PolicyStatements {
    match kind {
        PolicyKind::Retention => &RETENTION_STATEMENTS,
        PolicyKind::ChunkInterval => &CHUNK_INTERVAL_STATEMENTS,
    }
}

/// Encodes a value in its catalog unit: seconds for retention, microseconds
/// for chunk intervals.
fn encode(value: &PolicyValue) -> ObsResult<i64> {
    let raw = match value {
        PolicyValue::Retention(period) => period.as_secs(),
        PolicyValue::ChunkInterval(interval) => interval.as_micros(),
    };

    i64::try_from(raw).map_err(|_| {
        obs_error!(
            ErrorKind::InvalidDuration,
            "Duration does not fit the catalog's range",
            format!("{value}")
        )
    })
}

fn decode(kind: PolicyKind, raw: i64) -> ObsResult<PolicyValue> {
    let Ok(raw) = u64::try_from(raw) else {
        bail!(
            ErrorKind::InvalidState,
            "Catalog returned a negative duration",
            format!("{kind} value {raw}")
        );
    };

    let value = match kind {
        PolicyKind::Retention => RetentionPeriod::from_secs(raw).map(PolicyValue::Retention),
        PolicyKind::ChunkInterval => ChunkInterval::from_micros(raw).map(PolicyValue::ChunkInterval),
    };

    value.map_err(|err| {
        obs_error!(
            ErrorKind::InvalidState,
            "Catalog returned an invalid duration",
            err
        )
    })
}

fn unknown_metric(metric: &MetricName, cause: impl std::fmt::Display) -> ObsError {
    obs_error!(
        ErrorKind::UnknownMetric,
        "Metric does not exist in the catalog",
        format!("metric `{metric}`: {cause}")
    )
}

/// Kind of catalog call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatalogCall {
    /// `set` and `reset`, which address the metric's own relations.
    Write,
    /// Effective-value reads, which bind the metric as a parameter against
    /// fixed catalog relations.
    Read,
}

/// Returns `true` when a database error reports that the metric is missing.
///
/// A missing relation only names the metric for writes; on reads it means the
/// catalog schema itself is absent.
fn names_missing_metric(call: CatalogCall, code: Option<&str>, message: &str) -> bool {
    match code {
        Some(NO_DATA_FOUND) => true,
        Some(UNDEFINED_TABLE) if call == CatalogCall::Write => true,
        _ => {
            let message = message.to_lowercase();
            message.contains("metric")
                && (message.contains("does not exist") || message.contains("not found"))
        }
    }
}

/// Classifies a failed catalog call, surfacing the catalog's rejection of a
/// missing metric as [`ErrorKind::UnknownMetric`].
fn classify_error(call: CatalogCall, metric: &MetricName, err: sqlx::Error) -> ObsError {
    if let sqlx::Error::Database(db_err) = &err
        && names_missing_metric(call, db_err.code().as_deref(), db_err.message())
    {
        return unknown_metric(metric, db_err.message());
    }

    ObsError::from(err)
}

/// Checks the flag returned by a `set_metric_*` call. `false` means the
/// catalog has no such metric.
fn check_applied(metric: &MetricName, applied: Option<bool>) -> ObsResult<()> {
    if applied == Some(false) {
        return Err(unknown_metric(metric, "the catalog rejected the override"));
    }

    Ok(())
}

/// Catalog backed by the Promscale schema of the observability database.
///
/// Precedence is resolved by the catalog's stored functions; nothing is cached
/// client side, so concurrent changes by other operators are always observed.
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PolicyCatalog for PostgresCatalog {
    async fn set_default_policy(&self, value: PolicyValue) -> ObsResult<()> {
        let encoded = encode(&value)?;
        debug!(kind = %value.kind(), %value, "setting default policy");

        sqlx::query(statements(value.kind()).set_default)
            .bind(encoded)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_metric_policy(&self, metric: &MetricName, value: PolicyValue) -> ObsResult<()> {
        let encoded = encode(&value)?;
        debug!(kind = %value.kind(), %metric, %value, "setting metric policy");

        let applied: Option<bool> = sqlx::query_scalar(statements(value.kind()).set_metric)
            .bind(metric.as_str())
            .bind(encoded)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| classify_error(CatalogCall::Write, metric, err))?;

        check_applied(metric, applied)
    }

    async fn reset_metric_policy(&self, kind: PolicyKind, metric: &MetricName) -> ObsResult<()> {
        debug!(%kind, %metric, "resetting metric policy");

        // The returned flag only tells whether an override existed, which
        // doesn't matter for an idempotent reset.
        sqlx::query(statements(kind).reset_metric)
            .bind(metric.as_str())
            .execute(&self.pool)
            .await
            .map_err(|err| classify_error(CatalogCall::Write, metric, err))?;

        Ok(())
    }

    async fn effective_policy(
        &self,
        kind: PolicyKind,
        metric: &MetricName,
    ) -> ObsResult<PolicyValue> {
        let query = match kind {
            PolicyKind::Retention => EFFECTIVE_RETENTION_QUERY,
            PolicyKind::ChunkInterval => EFFECTIVE_CHUNK_INTERVAL_QUERY,
        };

        let raw: Option<Option<i64>> = sqlx::query_scalar(query)
            .bind(metric.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| classify_error(CatalogCall::Read, metric, err))?;

        match raw.flatten() {
            Some(raw) => decode(kind, raw),
            None => Err(unknown_metric(metric, format!("no {kind} recorded"))),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Connects [`PostgresCatalog`]s with a single-connection pool.
#[derive(Debug, Clone, Default)]
pub struct PostgresCatalogConnector;

impl CatalogConnector for PostgresCatalogConnector {
    type Catalog = PostgresCatalog;

    async fn connect(&self, config: &PgConnectionConfig) -> ObsResult<PostgresCatalog> {
        let pool = PgPoolOptions::new()
            .min_connections(NUM_POOL_CONNECTIONS)
            .max_connections(NUM_POOL_CONNECTIONS)
            .connect_with(config.with_db())
            .await?;

        info!(
            host = %config.host,
            port = config.port,
            dbname = %config.name,
            "connected to catalog"
        );

        Ok(PostgresCatalog::new(pool))
    }
}
