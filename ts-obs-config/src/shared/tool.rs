use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{ClusterConfig, DatabaseConfig, TunnelConfig, ValidationError};

/// Default overall deadline of one invocation.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Complete configuration of the `ts-obs` tool.
///
/// Loaded once at startup with [`crate::load_config`]; command line flags are
/// applied on top of the loaded values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ToolConfig {
    /// Where the database deployment lives.
    pub cluster: ClusterConfig,
    /// How the database port is forwarded to localhost.
    pub tunnel: TunnelConfig,
    /// How to authenticate against the database.
    pub database: DatabaseConfig,
    /// Deadline for a whole invocation: lookup, tunnel and catalog calls.
    pub timeout_secs: u64,
}

impl ToolConfig {
    /// Returns the invocation deadline as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validates the complete tool configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.cluster.validate()?;
        self.tunnel.validate()?;
        self.database.validate()?;

        if self.timeout_secs == 0 {
            return Err(ValidationError::TimeoutZero);
        }

        Ok(())
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            tunnel: TunnelConfig::default(),
            database: DatabaseConfig::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config for ToolConfig {}
