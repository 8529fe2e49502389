use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{EnvFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// Builds the subscriber for `cfg.format` and sets it as the global default.
///
/// Text and JSON output share one registry; the layer that is not selected stays `None`.
pub(crate) fn install(cfg: &LoggerConfig, level: &str) -> Result<(), LoggerError> {
    let filter = mk_filter(level)?;

    let (text, json) = match cfg.format {
        LoggerFormat::Journald => return install_journald(filter),
        LoggerFormat::Text => (
            Some(
                fmt::layer()
                    .with_ansi(cfg.use_color)
                    .with_target(cfg.with_targets)
                    .with_thread_names(cfg.with_thread_names)
                    .with_timer(mk_timer()),
            ),
            None,
        ),
        LoggerFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_ansi(false)
                    .with_target(cfg.with_targets)
                    .with_thread_names(cfg.with_thread_names)
                    .with_timer(mk_timer()),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init()
        .map_err(as_error)
}

fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

fn mk_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn as_error(e: impl std::fmt::Display) -> LoggerError {
    let s = e.to_string();
    if s.contains("SetGlobalDefaultError") || s.contains("global default trace dispatcher") {
        LoggerError::AlreadyInitialized
    } else {
        LoggerError::InitializationFailed(s)
    }
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn install_journald(filter: EnvFilter) -> Result<(), LoggerError> {
    let journald = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?
        .with_syslog_identifier("sm-agent".to_string());

    tracing_subscriber::registry()
        .with(filter)
        .with(journald)
        .try_init()
        .map_err(as_error)
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn install_journald(_filter: EnvFilter) -> Result<(), LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}
