use clap::{ArgAction, Args, Parser, Subcommand};
use ts_obs_config::shared::ToolConfig;

use crate::error::ObsResult;
use crate::policy::{MetricName, PolicyKind, PolicyOperation};

/// Manages metric storage policies of an observability release.
#[derive(Debug, Parser)]
#[command(name = "ts-obs", version, about, arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

/// Flags accepted by every command. Set flags override loaded configuration.
#[derive(Debug, Default, Args)]
pub struct GlobalArgs {
    /// Helm release name of the observability stack
    #[arg(short = 'n', long, global = true)]
    pub release_name: Option<String>,
    /// Namespace the release is installed in
    #[arg(long, global = true)]
    pub namespace: Option<String>,
    /// Deadline for the whole invocation, in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,
    /// Local port of the tunnel to the database (0 picks a free port; policy
    /// commands pick one when unset, port-forward uses 5433)
    #[arg(long, value_name = "PORT", global = true)]
    pub local_port: Option<u16>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl GlobalArgs {
    /// Writes the flags that were given into `config`.
    pub fn apply(&self, config: &mut ToolConfig) {
        if let Some(release_name) = &self.release_name {
            config.cluster.release_name = release_name.clone();
        }
        if let Some(namespace) = &self.namespace {
            config.cluster.namespace = namespace.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(local_port) = self.local_port {
            config.tunnel.local_port = Some(local_port);
        }
    }

    /// Log filter used when `RUST_LOG` is not set.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage per-metric storage policies
    Metrics {
        #[command(subcommand)]
        policy: MetricsCommand,
    },
    /// Access the TimescaleDB instance of the release
    Timescaledb {
        #[command(subcommand)]
        command: TimescaledbCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum MetricsCommand {
    /// Data retention period, in days or as a duration like `240h`
    Retention {
        #[command(subcommand)]
        action: PolicyAction,
    },
    /// Chunk time interval, as a duration like `8h24m`
    ChunkInterval {
        #[command(subcommand)]
        action: PolicyAction,
    },
}

impl MetricsCommand {
    /// Validates the arguments and builds the operation, without touching the
    /// network.
    pub fn operation(&self) -> ObsResult<PolicyOperation> {
        match self {
            MetricsCommand::Retention { action } => action.operation(PolicyKind::Retention),
            MetricsCommand::ChunkInterval { action } => {
                action.operation(PolicyKind::ChunkInterval)
            }
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum PolicyAction {
    /// Set the default used by every metric without an override
    SetDefault {
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Override the policy of one metric
    Set {
        metric: String,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Remove the override of one metric so it follows the default again
    Reset { metric: String },
    /// Print the effective policy of one metric
    Get { metric: String },
    /// Check that the effective policy of one metric matches a value
    Verify {
        metric: String,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
}

impl PolicyAction {
    pub fn operation(&self, kind: PolicyKind) -> ObsResult<PolicyOperation> {
        let operation = match self {
            PolicyAction::SetDefault { value } => PolicyOperation::SetDefault {
                value: kind.parse_value(value)?,
            },
            PolicyAction::Set { metric, value } => PolicyOperation::Set {
                metric: MetricName::new(metric.as_str())?,
                value: kind.parse_value(value)?,
            },
            PolicyAction::Reset { metric } => PolicyOperation::Reset {
                kind,
                metric: MetricName::new(metric.as_str())?,
            },
            PolicyAction::Get { metric } => PolicyOperation::Get {
                kind,
                metric: MetricName::new(metric.as_str())?,
            },
            PolicyAction::Verify { metric, value } => PolicyOperation::Verify {
                metric: MetricName::new(metric.as_str())?,
                expected: kind.parse_value(value)?,
            },
        };

        Ok(operation)
    }
}

#[derive(Debug, Subcommand)]
pub enum TimescaledbCommand {
    /// Forward a local port to the database until interrupted
    PortForward,
}
