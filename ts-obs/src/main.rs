use clap::Parser;
use tracing::error;
use ts_obs::catalog::postgres::PostgresCatalogConnector;
use ts_obs::cli::{Cli, Command, TimescaledbCommand};
use ts_obs::commands::{run_policy, run_port_forward};
use ts_obs::error::ObsResult;
use ts_obs::invocation::Invocation;
use ts_obs::k8s::kube::KubeClusterLocator;
use ts_obs::policy::PolicyOperation;
use ts_obs::tunnel::kube::KubePodConnector;
use ts_obs_config::load_config;
use ts_obs_config::shared::ToolConfig;
use ts_obs_telemetry::tracing::{ReleaseRef, init_tracing_with_release};

/// What a command line asks for, validated before any network access.
enum Action {
    Policy(PolicyOperation),
    PortForward,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let action = match &cli.command {
        Command::Metrics { policy } => Action::Policy(policy.operation()?),
        Command::Timescaledb {
            command: TimescaledbCommand::PortForward,
        } => Action::PortForward,
    };

    // Load the tool config and apply the command line on top of it.
    let mut config: ToolConfig = load_config()?;
    cli.global.apply(&mut config);
    config.validate()?;

    let release_ref = ReleaseRef {
        namespace: config.cluster.namespace.clone(),
        release: config.cluster.release_name.clone(),
    };
    let _log_flusher = init_tracing_with_release(
        env!("CARGO_BIN_NAME"),
        cli.global.log_directive(),
        Some(release_ref),
    )?;

    // We start the runtime.
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(config, action))?;

    Ok(())
}

async fn async_main(config: ToolConfig, action: Action) -> anyhow::Result<()> {
    if let Err(err) = run(config, action).await {
        error!("ts-obs failed: {err}");

        return Err(err.into());
    }

    Ok(())
}

async fn run(config: ToolConfig, action: Action) -> ObsResult<()> {
    let locator = KubeClusterLocator::new().await?;
    let pod_connector = KubePodConnector::new(locator.client().clone());
    let invocation = Invocation::new(config, locator, pod_connector, PostgresCatalogConnector);

    match action {
        Action::Policy(operation) => run_policy(&invocation, &operation).await,
        Action::PortForward => run_port_forward(&invocation).await,
    }
}
