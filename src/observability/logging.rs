//! # Structured Logging
//!
//! Installs the global `tracing` subscriber from [`LogConfig`]: an `EnvFilter`
//! seeded with the configured level (`RUST_LOG` directives still apply) and a
//! `fmt` layer in JSON or text form.

use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config_error;
use crate::core::config::{LogConfig, LogFormat};
use crate::core::error::RoutingResult;

/// Parse a log level name, case-insensitively
pub fn parse_level(level: &str) -> RoutingResult<Level> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(config_error!("unknown log level: {}", other)),
    }
}

/// Initialize the tracing subscriber
///
/// Calling this again once a subscriber is installed logs a warning and
/// returns `Ok`.
pub fn init_logging(config: &LogConfig) -> RoutingResult<()> {
    let level = parse_level(&config.level)?;
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    let installed = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
    };

    if installed.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
        return Ok(());
    }

    info!(level = %level, format = ?config.format, "Structured logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RoutingError;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("warn").unwrap(), Level::WARN);
        assert!(matches!(parse_level("loud"), Err(RoutingError::Configuration { .. })));
    }

    #[test]
    fn test_init_twice_is_ok() {
        let config = LogConfig::default();
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_init_rejects_unknown_level() {
        let config = LogConfig {
            level: "chatty".to_string(),
            ..LogConfig::default()
        };
        assert!(init_logging(&config).is_err());
    }
}
