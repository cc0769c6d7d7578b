mod cluster;
mod connection;
mod tool;
mod tunnel;

pub use cluster::*;
pub use connection::*;
pub use tool::*;
pub use tunnel::*;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The namespace used to look up the release cannot be empty.
    #[error("`cluster.namespace` cannot be empty")]
    EmptyNamespace,
    /// The release name used to derive secret names and pod labels cannot be empty.
    #[error("`cluster.release_name` cannot be empty")]
    EmptyReleaseName,
    /// The remote database port must be a real port.
    #[error("`tunnel.remote_port` cannot be zero")]
    RemotePortZero,
    /// The overall deadline of an invocation must be positive.
    #[error("`timeout_secs` cannot be zero")]
    TimeoutZero,
    /// The database name cannot be empty.
    #[error("`database.name` cannot be empty")]
    EmptyDatabaseName,
}
