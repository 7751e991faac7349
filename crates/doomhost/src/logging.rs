//! Tracing subscriber setup.

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::StartupError;
use crate::config::LoggingSettings;

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `settings.level` when set. JSON output is used when
/// either the configuration or `json_format` asks for it.
pub fn setup_logging(settings: &LoggingSettings, json_format: bool) -> Result<(), StartupError> {
    let level = settings.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json_format || settings.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_file(false)
                    .with_line_number(false)
                    .with_target(true),
            )
            .try_init()
    };
    installed.map_err(|e| StartupError::Logging(e.to_string()))?;

    info!(level, "logging initialized");
    Ok(())
}
