use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::environment::Environment;

/// Directory containing configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Base configuration file loaded for all environments.
const BASE_CONFIG_FILE: &str = "base.yaml";

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
///
/// Example: `APP_CLUSTER__NAMESPACE` sets the `cluster.namespace` field.
const ENV_SEPARATOR: &str = "__";

/// Trait implemented by configuration roots that can be loaded with [`load_config`].
///
/// The [`Default`] value is serialized and used as the lowest-priority source, so
/// every field has a value even when no file or environment override exists.
pub trait Config: Default + Serialize + DeserializeOwned {}

/// Loads hierarchical configuration from built-in defaults, YAML files and
/// environment variables.
///
/// Loads configuration in this order:
/// 1. Built-in defaults from [`Default`]
/// 2. Base configuration from `configuration/base.yaml`, if present
/// 3. Environment-specific file from `configuration/{environment}.yaml`, if present
/// 4. Environment variable overrides prefixed with `APP`
///
/// Nested keys use double underscores: `APP_CLUSTER__NAMESPACE` → `cluster.namespace`.
pub fn load_config<T>() -> Result<T, config::ConfigError>
where
    T: Config,
{
    let base_path = std::env::current_dir()
        .map_err(|err| config::ConfigError::Foreign(Box::new(err)))?;

    // Detect the running environment.
    // Default to `dev` if unspecified.
    let environment =
        Environment::load().map_err(|err| config::ConfigError::Foreign(Box::new(err)))?;

    load_config_from(&base_path.join(CONFIGURATION_DIR), environment)
}

/// Loads configuration like [`load_config`] but from an explicit directory and
/// environment.
pub fn load_config_from<T>(
    configuration_directory: &Path,
    environment: Environment,
) -> Result<T, config::ConfigError>
where
    T: Config,
{
    let environment_filename = format!("{environment}.yaml");

    let defaults = config::Config::try_from(&T::default())?;

    let environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true);

    let settings = config::Config::builder()
        .add_source(defaults)
        // Add in settings from the base configuration file.
        .add_source(
            config::File::from(configuration_directory.join(BASE_CONFIG_FILE)).required(false),
        )
        // Add in settings from the environment-specific file.
        .add_source(
            config::File::from(configuration_directory.join(environment_filename))
                .required(false),
        )
        // Add in settings from environment variables (with a prefix of APP and '__' as separator)
        // E.g. `APP_TUNNEL__LOCAL_PORT=6543` sets `ToolConfig { tunnel: { local_port } }`.
        .add_source(environment_source)
        .build()?;

    settings.try_deserialize::<T>()
}
