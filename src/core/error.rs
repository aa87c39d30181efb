//! # Error Handling Module
//!
//! Error types for the label router, built on the `thiserror` crate.
//!
//! Routing decisions never surface these errors to the caller: the
//! top-level [`RoutingLoadBalanceRule`](crate::routing::RoutingLoadBalanceRule)
//! converts every failure into "no instance selected" plus a log entry and a
//! metric. The errors still flow through the inner layers with `?` so that the
//! boundary can classify them.
//!
//! ## Error Categories
//! - `Configuration`: bad rule data or an invalid config file. Not retryable;
//!   the rule source has to be fixed.
//! - `TransientLookup`: the registry or repository could not answer.
//! - `DataInconsistency`: weights that do not add up. Logged, never fatal.

use thiserror::Error;

/// Main result type used throughout the router
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Errors raised while evaluating routing rules or loading configuration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoutingError {
    /// Unsupported condition or rule kind, invalid pattern, invalid config file
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Registry or repository lookup failed (timeout, not found, network error)
    #[error("Lookup failed for service {service}: {reason}")]
    TransientLookup { service: String, reason: String },

    /// Weight accounting does not add up (e.g. cumulative weight above the maximum)
    #[error("Data inconsistency: {message}")]
    DataInconsistency { message: String },

    /// I/O errors while reading configuration files
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON parsing errors for configuration files
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl RoutingError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a transient lookup error for a service
    pub fn transient_lookup<S: Into<String>, R: Into<String>>(service: S, reason: R) -> Self {
        Self::TransientLookup {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Create a data inconsistency error with a custom message
    pub fn data_inconsistency<S: Into<String>>(message: S) -> Self {
        Self::DataInconsistency {
            message: message.into(),
        }
    }

    /// Check if the failed operation may succeed when tried again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientLookup { .. } | Self::Io { .. })
    }

    /// Stable label for logs and metrics
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::TransientLookup { .. } => "transient_lookup_failure",
            Self::DataInconsistency { .. } => "data_inconsistency",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }
}

impl From<std::io::Error> for RoutingError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RoutingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for RoutingError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

impl From<regex::Error> for RoutingError {
    fn from(err: regex::Error) -> Self {
        Self::Configuration {
            message: format!("invalid regex pattern: {}", err),
        }
    }
}

/// Convenience macro for creating configuration errors
///
/// Usage: `config_error!("unsupported condition: {}", name)`
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::error::RoutingError::config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(RoutingError::transient_lookup("orders", "connection refused").is_retryable());
        assert!(!RoutingError::config("unsupported condition").is_retryable());
        assert!(!RoutingError::data_inconsistency("sum 120").is_retryable());
    }

    #[test]
    fn test_error_types() {
        assert_eq!(RoutingError::config("x").error_type(), "configuration_error");
        assert_eq!(
            RoutingError::transient_lookup("orders", "down").error_type(),
            "transient_lookup_failure"
        );
        assert_eq!(config_error!("bad {}", 1), RoutingError::config("bad 1"));
    }

    #[test]
    fn test_regex_error_is_configuration() {
        let err: RoutingError = regex::Regex::new("(").unwrap_err().into();
        assert!(matches!(err, RoutingError::Configuration { .. }));
    }

    #[test]
    fn test_display() {
        let err = RoutingError::transient_lookup("orders", "timeout");
        assert_eq!(err.to_string(), "Lookup failed for service orders: timeout");
    }
}
