use tracing::info;

use crate::catalog::PolicyCatalog;
use crate::error::{ErrorKind, ObsResult};
use crate::obs_error;
use crate::policy::{MetricName, PolicyKind, PolicyOperation, PolicyOutcome, PolicyValue};

/// Maps policy operations onto catalog calls.
///
/// The resolver adds no precedence logic of its own and keeps no state between
/// calls: every read goes to the catalog.
#[derive(Debug)]
pub struct PolicyResolver<C> {
    catalog: C,
}

impl<C> PolicyResolver<C>
where
    C: PolicyCatalog + Send + Sync,
{
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Runs `operation`, naming it in the detail of any error.
    pub async fn execute(&self, operation: &PolicyOperation) -> ObsResult<PolicyOutcome> {
        let result = match operation {
            PolicyOperation::SetDefault { value } => {
                self.set_default(*value).await.map(|_| PolicyOutcome::Applied)
            }
            PolicyOperation::Set { metric, value } => self
                .set(metric, *value)
                .await
                .map(|_| PolicyOutcome::Applied),
            PolicyOperation::Reset { kind, metric } => self
                .reset(*kind, metric)
                .await
                .map(|_| PolicyOutcome::Applied),
            PolicyOperation::Get { kind, metric } => {
                self.get(*kind, metric).await.map(PolicyOutcome::Effective)
            }
            PolicyOperation::Verify { metric, expected } => self
                .verify(metric, *expected)
                .await
                .map(PolicyOutcome::Verified),
        };

        result.map_err(|err| err.with_context(operation))
    }

    pub async fn set_default(&self, value: PolicyValue) -> ObsResult<()> {
        self.catalog.set_default_policy(value).await?;
        info!(kind = %value.kind(), %value, "default policy updated");

        Ok(())
    }

    pub async fn set(&self, metric: &MetricName, value: PolicyValue) -> ObsResult<()> {
        self.catalog.set_metric_policy(metric, value).await?;
        info!(kind = %value.kind(), %metric, %value, "metric policy updated");

        Ok(())
    }

    pub async fn reset(&self, kind: PolicyKind, metric: &MetricName) -> ObsResult<()> {
        self.catalog.reset_metric_policy(kind, metric).await?;
        info!(%kind, %metric, "metric policy reset to default");

        Ok(())
    }

    pub async fn get(&self, kind: PolicyKind, metric: &MetricName) -> ObsResult<PolicyValue> {
        let value = self.catalog.effective_policy(kind, metric).await?;
        if value.kind() != kind {
            return Err(obs_error!(
                ErrorKind::InvalidState,
                "Catalog returned a value of the wrong kind",
                format!("expected {kind}, got {}", value.kind())
            ));
        }

        Ok(value)
    }

    /// Reads the effective value and compares it with `expected` using the
    /// comparison rule of its kind.
    pub async fn verify(&self, metric: &MetricName, expected: PolicyValue) -> ObsResult<PolicyValue> {
        let actual = self.get(expected.kind(), metric).await?;
        if !actual.matches(&expected) {
            return Err(obs_error!(
                ErrorKind::VerificationFailed,
                "Effective policy differs from the expected value",
                format!("expected {expected}, found {actual}")
            ));
        }

        Ok(actual)
    }
}
