//! Structured logging setup.
//!
//! The library itself only emits `tracing` events. Binaries and tests call
//! [`init_logging`] once to install a formatter.

use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{NetworkError, Result};

/// Install a global `tracing-subscriber` formatter.
///
/// Filter precedence: explicit `filter` directives from the config, then the
/// `RUST_LOG` environment variable, then `log_level`. Calling this when a
/// subscriber is already installed is a no-op.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match &config.filter {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| NetworkError::ConfigError(format!("Invalid log filter: {e}")))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::default().add_directive(LevelFilter::from_level(config.log_level).into())
        }),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json_format {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    } else {
        debug!("Global subscriber already installed, keeping it");
    }
    Ok(())
}
