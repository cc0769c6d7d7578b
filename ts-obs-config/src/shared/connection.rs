use std::net::SocketAddr;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions as SqlxConnectOptions, PgSslMode as SqlxSslMode};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Database settings that do not depend on where the tunnel ends up listening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Name of the database holding the Promscale catalog.
    pub name: String,
    /// Username for authenticating with the database.
    pub username: String,
    /// Password override. When unset the password is read from the release's
    /// credentials secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<SerializableSecretString>,
    /// Whether the connection must be encrypted.
    pub require_tls: bool,
}

impl DatabaseConfig {
    /// Builds the connection settings for a database reachable at `addr`.
    ///
    /// A password resolved from the cluster is only used when no explicit
    /// password was configured.
    pub fn connection_for(
        &self,
        addr: SocketAddr,
        resolved_password: Option<SerializableSecretString>,
    ) -> PgConnectionConfig {
        PgConnectionConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            name: self.name.clone(),
            username: self.username.clone(),
            password: self.password.clone().or(resolved_password),
            require_tls: self.require_tls,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyDatabaseName);
        }

        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "postgres".to_string(),
            username: "postgres".to_string(),
            password: None,
            require_tls: false,
        }
    }
}

/// Configuration for connecting to a Postgres database.
///
/// This struct holds all necessary connection parameters and settings.
#[derive(Debug, Clone)]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port number on which the Postgres server is listening.
    pub port: u16,
    /// Name of the Postgres database to connect to.
    pub name: String,
    /// Username for authenticating with the Postgres server.
    pub username: String,
    /// Password for the specified user. This field is sensitive and redacted in debug output.
    pub password: Option<SerializableSecretString>,
    /// Whether TLS is required for the connection.
    pub require_tls: bool,
}

/// A trait which can be used to convert the implementation into crate specific
/// connect options, keeping the connection settings centralized in
/// [`PgConnectionConfig`].
pub trait IntoConnectOptions<Output> {
    /// Creates connection options for connecting to the server without
    /// specifying a database.
    fn without_db(&self) -> Output;

    /// Creates connection options for connecting to a specific database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<SqlxConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> SqlxConnectOptions {
        let ssl_mode = if self.require_tls {
            SqlxSslMode::Require
        } else {
            SqlxSslMode::Prefer
        };
        let options = SqlxConnectOptions::new_without_pgpass()
            .host(&self.host)
            .username(&self.username)
            .port(self.port)
            .ssl_mode(ssl_mode)
            .application_name("ts-obs");

        if let Some(password) = &self.password {
            options.password(password.expose_secret())
        } else {
            options
        }
    }

    fn with_db(&self) -> SqlxConnectOptions {
        let options: SqlxConnectOptions = self.without_db();
        options.database(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_password_wins_over_resolved_one() {
        let config = DatabaseConfig {
            password: Some("configured".to_string().into()),
            ..DatabaseConfig::default()
        };
        let connection = config.connection_for(
            "127.0.0.1:5433".parse().unwrap(),
            Some("from-secret".to_string().into()),
        );

        assert_eq!(connection.host, "127.0.0.1");
        assert_eq!(connection.port, 5433);
        assert_eq!(
            connection.password.unwrap().expose_secret(),
            "configured"
        );
    }

    #[test]
    fn resolved_password_is_used_when_none_configured() {
        let connection = DatabaseConfig::default().connection_for(
            "127.0.0.1:40000".parse().unwrap(),
            Some("from-secret".to_string().into()),
        );

        assert_eq!(
            connection.password.unwrap().expose_secret(),
            "from-secret"
        );
        assert_eq!(connection.name, "postgres");
    }
}
