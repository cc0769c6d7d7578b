use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

use crate::catalog::CatalogConnector;
use crate::error::ObsResult;
use crate::invocation::Invocation;
use crate::k8s::ClusterLocator;
use crate::policy::{PolicyKind, PolicyOperation, PolicyOutcome};
use crate::tunnel::PodConnector;

/// Subject of the result line for `kind`.
fn subject(kind: PolicyKind) -> &'static str {
    match kind {
        PolicyKind::Retention => "Retention period",
        PolicyKind::ChunkInterval => "Chunk interval",
    }
}

/// Renders the line printed for a completed operation.
///
/// When the line carries a value, the value is its last whitespace-delimited
/// token, so scripts can pick it up with a field split.
pub fn render(operation: &PolicyOperation, outcome: &PolicyOutcome) -> String {
    let subject = subject(operation.kind());

    match (operation, outcome) {
        (PolicyOperation::SetDefault { value }, _) => {
            format!("Default {} set to {value}", subject.to_lowercase())
        }
        (PolicyOperation::Set { metric, value }, _) => {
            format!("{subject} for metric {metric} set to {value}")
        }
        (PolicyOperation::Reset { metric, .. }, _) => {
            format!("{subject} for metric {metric} reset to the default")
        }
        (PolicyOperation::Verify { metric, .. }, PolicyOutcome::Verified(actual)) => {
            format!("{subject} for metric {metric} verified as {actual}")
        }
        (_, PolicyOutcome::Effective(value) | PolicyOutcome::Verified(value)) => match operation
            .metric()
        {
            Some(metric) => format!("{subject} for metric {metric} is {value}"),
            None => format!("{subject} is {value}"),
        },
        (_, PolicyOutcome::Applied) => format!("{operation} applied"),
    }
}

/// Runs a policy operation and prints its result line to stdout.
pub async fn run_policy<L, P, C>(
    invocation: &Invocation<L, P, C>,
    operation: &PolicyOperation,
) -> ObsResult<()>
where
    L: ClusterLocator,
    P: PodConnector,
    C: CatalogConnector + Sync,
{
    let outcome = invocation.run(operation).await?;
    println!("{}", render(operation, &outcome));

    Ok(())
}

/// Holds a tunnel to the database open until SIGINT or SIGTERM.
pub async fn run_port_forward<L, P, C>(invocation: &Invocation<L, P, C>) -> ObsResult<()>
where
    L: ClusterLocator,
    P: PodConnector,
    C: CatalogConnector + Sync,
{
    // Registered before the tunnel opens so an early SIGTERM isn't lost.
    let mut sigterm = signal(SignalKind::terminate())?;

    let mut tunnel = invocation.open_tunnel().await?;
    println!(
        "Forwarding from {} to port {} of pod {}",
        tunnel.local_addr(),
        tunnel.remote_port(),
        tunnel.pod()
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("SIGINT (Ctrl+C) received, closing tunnel");
            if let Err(err) = result {
                tunnel.close().await;
                return Err(err.into());
            }
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received, closing tunnel");
        }
    }

    tunnel.close().await;

    Ok(())
}
