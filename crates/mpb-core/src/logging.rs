//! Process-wide tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Environment variable that overrides the configured filter directives.
pub const LOG_ENV: &str = "MPB_LOG";

/// Filter from `MPB_LOG` when set, else from the configured level.
pub fn build_filter(level: &str) -> Result<EnvFilter, String> {
    let directives = match std::env::var(LOG_ENV) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => level.trim().to_string(),
    };
    EnvFilter::try_new(&directives).map_err(|err| format!("logging.level {directives:?}: {err}"))
}

/// Installs the global subscriber. Returns `false` when one was already set.
pub fn init_logging(cfg: &LoggingConfig) -> Result<bool, String> {
    let filter = build_filter(&cfg.level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match cfg.format {
        LogFormat::Console => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };
    Ok(installed)
}
