//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! TOML files and `OVENWATCH__*` environment variables. Every field carries
//! a serde default, so an empty source set yields a usable configuration.

pub mod logging;
pub mod monitoring;
pub mod realtime;

use serde::{Deserialize, Serialize};

pub use self::logging::LoggingConfig;
pub use self::monitoring::{Environment, MonitoringConfig};
pub use self::realtime::RealtimeConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Boot orchestration and feature flags.
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Connection registry, queue, and broadcast settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Merges `config/default.toml`, an environment-specific overlay
    /// `config/{env}.toml`, and environment variables prefixed with
    /// `OVENWATCH` (nested keys separated by `__`).
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("OVENWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Parse configuration from an inline TOML document.
    pub fn from_toml(raw: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml("").expect("empty config");
        assert!(config.monitoring.enabled);
        assert_eq!(config.monitoring.global_timeout_ms, 2000);
        assert_eq!(config.realtime.queue_capacity, 1000);
        assert_eq!(config.realtime.replay_count, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_overrides_are_applied() {
        let raw = r#"
            [monitoring]
            environment = "production"
            realtime_enabled = false
            global_timeout_ms = 500

            [realtime]
            idle_timeout_secs = 60
        "#;
        let config = AppConfig::from_toml(raw).expect("config");
        assert_eq!(config.monitoring.environment, Environment::Production);
        assert!(!config.monitoring.realtime_enabled);
        assert_eq!(config.monitoring.global_timeout_ms, 500);
        assert_eq!(config.realtime.idle_timeout_secs, 60);
        assert_eq!(config.realtime.heartbeat_interval_secs, 15);
    }
}
