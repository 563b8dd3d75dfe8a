//! Host configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! TOML files and `PLUGHOST__*` environment variables. Each sub-module
//! represents a logical configuration section. Every field has a default,
//! so an empty configuration is valid.

pub mod hooks;
pub mod lifecycle;
pub mod logging;
pub mod plugin;
pub mod sandbox;

use serde::{Deserialize, Serialize};

pub use self::hooks::HookConfig;
pub use self::lifecycle::LifecycleConfig;
pub use self::logging::LoggingConfig;
pub use self::plugin::PluginConfig;
pub use self::sandbox::SandboxConfig;

use crate::error::AppError;

/// Root host configuration.
///
/// This struct is the top-level deserialization target for the merged
/// configuration (default file + environment overlay + environment variables).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// Plugin discovery settings.
    #[serde(default)]
    pub plugins: PluginConfig,
    /// Lifecycle hook and discovery deadlines.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Hook fan-out settings.
    #[serde(default)]
    pub hooks: HookConfig,
    /// Capability sandbox policy.
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HostConfig {
    /// Load configuration for the given environment name.
    ///
    /// Merges `config/default` with the `config/{env}` overlay and environment
    /// variables prefixed with `PLUGHOST__`. Missing files are not an error.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false));

        Self::finish(builder)
    }

    /// Load configuration from one explicit file plus environment variables.
    pub fn load_from(path: &str) -> Result<Self, AppError> {
        let builder = config::Config::builder().add_source(config::File::with_name(path));

        Self::finish(builder)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, AppError> {
        let config = builder
            .add_source(
                config::Environment::with_prefix("PLUGHOST")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("sandbox.grantable_permissions")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}
