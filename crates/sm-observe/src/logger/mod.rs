//! Process-wide `tracing` setup for the service manager.
//!
//! The filter comes from [`LoggerConfig::level`] unless [`LEVEL_ENV`] is set, which lets an
//! operator raise verbosity of a deployed agent without touching its config file.

mod config;
mod error;
mod format;
mod log;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Environment variable overriding the configured filter directive.
pub const LEVEL_ENV: &str = "SM_LOG";

/// Installs the global subscriber. Fails with [`LoggerError::AlreadyInitialized`] on a second call.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let level = std::env::var(LEVEL_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| cfg.level.clone());

    log::install(cfg, &level)?;
    tracing::debug!(format = ?cfg.format, level = %level, "logger initialized");
    Ok(())
}
