use std::error;
use std::fmt;

use ts_obs_config::shared::ValidationError;

use crate::k8s::K8sError;
use crate::tunnel::TunnelError;

/// Convenient result type for `ts-obs` operations using [`ObsError`] as the error type.
pub type ObsResult<T> = Result<T, ObsError>;

/// Main error type of the tool.
///
/// Every failure of an invocation ends up as an [`ObsError`] carrying an
/// [`ErrorKind`], a static description and, usually, a detail naming the metric,
/// the operation and the underlying cause.
#[derive(Debug, Clone)]
pub struct ObsError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Error with kind and static description
    WithDescription(ErrorKind, &'static str),
    /// Error with kind, static description, and dynamic detail
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
}

/// Categories of failures.
///
/// None of them is retried automatically: each one terminates the invocation.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Local validation, never reaches the network
    InvalidDuration,
    InvalidArgument,

    // Catalog errors
    UnknownMetric,
    ConnectionError,
    VerificationFailed,

    // Cluster lookup errors
    NotFound,
    AmbiguousMatch,
    ClusterApiError,

    // Tunnel errors
    TunnelError,

    // Deadline
    Timeout,

    // Configuration & IO
    ConfigError,
    IoError,

    // State errors
    InvalidState,
}

impl ObsError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
        }
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::WithDescription(..) => None,
        }
    }

    /// Returns a copy of this error with `context` prepended to its detail.
    ///
    /// Used at operation boundaries to name the metric and operation that
    /// failed without losing the underlying cause.
    pub fn with_context(self, context: impl fmt::Display) -> ObsError {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => ObsError {
                repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, context.to_string()),
            },
            ErrorRepr::WithDescriptionAndDetail(kind, desc, detail) => ObsError {
                repr: ErrorRepr::WithDescriptionAndDetail(
                    kind,
                    desc,
                    format!("{context}: {detail}"),
                ),
            },
        }
    }
}

impl PartialEq for ObsError {
    fn eq(&self, other: &ObsError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            _ => false,
        }
    }
}

impl fmt::Display for ObsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;

                Ok(())
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;
                f.write_str(" -> ")?;
                detail.fmt(f)?;

                Ok(())
            }
        }
    }
}

impl error::Error for ObsError {}

/// Creates an [`ObsError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for ObsError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> ObsError {
        ObsError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

/// Creates an [`ObsError`] from an error kind, static description, and dynamic detail.
impl From<(ErrorKind, &'static str, String)> for ObsError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> ObsError {
        ObsError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

/// Converts [`std::io::Error`] to [`ObsError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for ObsError {
    fn from(err: std::io::Error) -> ObsError {
        ObsError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "I/O error occurred",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`sqlx::Error`] to [`ObsError`].
///
/// Everything that happens once the catalog is reachable through the tunnel is a
/// [`ErrorKind::ConnectionError`]. Errors naming a missing metric are
/// classified by the catalog itself before reaching this conversion.
impl From<sqlx::Error> for ObsError {
    fn from(err: sqlx::Error) -> ObsError {
        let description = match &err {
            sqlx::Error::Database(_) => "Catalog query failed",
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => "Catalog connection failed",
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                "Catalog connection unavailable"
            }
            _ => "Catalog operation failed",
        };

        ObsError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConnectionError,
                description,
                err.to_string(),
            ),
        }
    }
}

/// Converts [`config::ConfigError`] to [`ObsError`] with [`ErrorKind::ConfigError`].
impl From<config::ConfigError> for ObsError {
    fn from(err: config::ConfigError) -> ObsError {
        ObsError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConfigError,
                "Configuration could not be loaded",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`ValidationError`] to [`ObsError`] with [`ErrorKind::ConfigError`].
impl From<ValidationError> for ObsError {
    fn from(err: ValidationError) -> ObsError {
        ObsError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConfigError,
                "Configuration is invalid",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`K8sError`] to [`ObsError`], keeping lookup failures distinct from
/// API failures.
impl From<K8sError> for ObsError {
    fn from(err: K8sError) -> ObsError {
        let (kind, description) = match &err {
            K8sError::SecretNotFound { .. }
            | K8sError::SecretKeyNotFound { .. }
            | K8sError::PodNotFound { .. } => {
                (ErrorKind::NotFound, "Cluster resource not found")
            }
            K8sError::AmbiguousPods { .. } => (
                ErrorKind::AmbiguousMatch,
                "More than one pod matches the selector",
            ),
            K8sError::Kube(_) => (ErrorKind::ClusterApiError, "Kubernetes API request failed"),
        };

        ObsError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

/// Converts [`TunnelError`] to [`ObsError`] with [`ErrorKind::TunnelError`].
impl From<TunnelError> for ObsError {
    fn from(err: TunnelError) -> ObsError {
        ObsError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::TunnelError,
                "Port forwarding failed",
                err.to_string(),
            ),
        }
    }
}
