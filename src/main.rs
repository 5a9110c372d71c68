//! Ovenwatch server: real-time monitoring core for the bakery storefront.
//!
//! Loads configuration, starts logging, and hands over to [`ovenwatch::run_server`].

use tracing_subscriber::{EnvFilter, fmt};

use ovenwatch_core::config::AppConfig;
use ovenwatch_core::error::AppError;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!("Starting ovenwatch v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = ovenwatch::run_server(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from `config/` and the environment.
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("OVENWATCH_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing.
///
/// `RUST_LOG` wins; otherwise the global level applies, with the monitoring
/// crates at the monitoring log level.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let monitoring = &config.monitoring.log_level;
        EnvFilter::new(format!(
            "{},ovenwatch_monitoring={monitoring},ovenwatch_realtime={monitoring}",
            config.logging.level
        ))
    });

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}
