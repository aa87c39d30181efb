//! # Configuration Module
//!
//! Router configuration loaded from YAML or JSON, then overridden from the
//! environment, then validated.
//!
//! Environment variables follow the pattern `LABEL_ROUTER_<FIELD>`:
//!
//! | Variable                             | Field                                 |
//! |--------------------------------------|---------------------------------------|
//! | `LABEL_ROUTER_LOG_LEVEL`             | `logging.level`                       |
//! | `LABEL_ROUTER_LOG_FORMAT`            | `logging.format`                      |
//! | `LABEL_ROUTER_RULE`                  | `label_routing.rule`                  |
//! | `LABEL_ROUTER_GROUP`                 | `label_routing.group`                 |
//! | `LABEL_ROUTER_ZONE_AFFINITY_ENABLED` | `label_routing.zone_affinity_enabled` |
//! | `LABEL_ROUTER_REGION`                | `label_routing.region`                |
//! | `LABEL_ROUTER_ZONE`                  | `label_routing.zone`                  |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use crate::core::constants::{DEFAULT_GROUP, DEFAULT_ORDINARY_RULE, SUM_WEIGHT};
use crate::core::error::{RoutingError, RoutingResult};
use crate::core::types::ServiceInstance;
use crate::load_balancing::strategies::BUILTIN_ALGORITHMS;
use crate::routing::rule::RoutingRuleData;

/// Complete router configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub logging: LogConfig,

    pub label_routing: LabelRoutingProperties,

    /// Routing data installed at startup
    pub routes: Vec<RoutingRuleData>,

    /// Static registry content
    pub instances: Vec<ServiceInstance>,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

impl FromStr for LogFormat {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(RoutingError::config(format!("Invalid log format: {}", other))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Json => write!(f, "json"),
            LogFormat::Text => write!(f, "text"),
        }
    }
}

/// Label routing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelRoutingProperties {
    /// Ordinary algorithm for services without routing data
    pub rule: String,

    /// Registry group instances are looked up in
    pub group: String,

    /// Prefer instances in the caller's own region and zone
    pub zone_affinity_enabled: bool,

    pub region: Option<String>,

    pub zone: Option<String>,
}

impl Default for LabelRoutingProperties {
    fn default() -> Self {
        Self {
            rule: DEFAULT_ORDINARY_RULE.to_string(),
            group: DEFAULT_GROUP.to_string(),
            zone_affinity_enabled: false,
            region: None,
            zone: None,
        }
    }
}

impl RouterConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> RoutingResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut config: RouterConfig = serde_yaml::from_str(&content)?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> RoutingResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut config: RouterConfig = serde_json::from_str(&content)?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from JSON when the file ends in `.json`, YAML otherwise
    pub async fn load<P: AsRef<Path>>(path: P) -> RoutingResult<Self> {
        let is_json = path
            .as_ref()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::load_from_json(path).await
        } else {
            Self::load_from_file(path).await
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> RoutingResult<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup` instead of the process environment
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> RoutingResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("LABEL_ROUTER_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("LABEL_ROUTER_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }

        if let Some(rule) = lookup("LABEL_ROUTER_RULE") {
            self.label_routing.rule = rule;
        }

        if let Some(group) = lookup("LABEL_ROUTER_GROUP") {
            self.label_routing.group = group;
        }

        if let Some(enabled) = lookup("LABEL_ROUTER_ZONE_AFFINITY_ENABLED") {
            self.label_routing.zone_affinity_enabled = enabled.parse().map_err(|e| {
                RoutingError::config(format!("Invalid LABEL_ROUTER_ZONE_AFFINITY_ENABLED: {}", e))
            })?;
        }

        if let Some(region) = lookup("LABEL_ROUTER_REGION") {
            self.label_routing.region = Some(region);
        }

        if let Some(zone) = lookup("LABEL_ROUTER_ZONE") {
            self.label_routing.zone = Some(zone);
        }

        Ok(())
    }

    /// Validate the whole configuration, reporting every problem at once
    pub fn validate(&self) -> RoutingResult<()> {
        let mut errors = Vec::new();

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => errors.push(format!("Invalid log level: {}", self.logging.level)),
        }

        let routing = &self.label_routing;
        if routing.rule.is_empty() {
            errors.push("label_routing.rule cannot be empty".to_string());
        } else if !BUILTIN_ALGORITHMS.contains(&routing.rule.as_str()) {
            errors.push(format!(
                "Unknown load balancing algorithm '{}', expected one of: {}",
                routing.rule,
                BUILTIN_ALGORITHMS.join(", ")
            ));
        }

        if routing.group.is_empty() {
            errors.push("label_routing.group cannot be empty".to_string());
        }

        let has_label = |label: &Option<String>| label.as_deref().is_some_and(|l| !l.is_empty());
        if routing.zone_affinity_enabled && !has_label(&routing.region) && !has_label(&routing.zone) {
            warn!("Zone affinity is enabled but neither region nor zone is set, it will have no effect");
        }

        for (index, route) in self.routes.iter().enumerate() {
            if route.target_service.is_empty() {
                errors.push(format!("Route {} has empty target_service", index));
                continue;
            }
            if route.default_route_version.is_empty() {
                errors.push(format!(
                    "Route '{}' has empty default_route_version",
                    route.target_service
                ));
            }
            for match_service in &route.match_route_list {
                if match_service.version.is_empty() {
                    errors.push(format!("Route '{}' has a match with empty version", route.target_service));
                }
                if match_service.weight > SUM_WEIGHT {
                    errors.push(format!(
                        "Route '{}' version '{}' weight must be between 0 and {}, got: {}",
                        route.target_service, match_service.version, SUM_WEIGHT, match_service.weight
                    ));
                }
            }
        }

        for instance in &self.instances {
            if instance.version().map_or(true, str::is_empty) {
                errors.push(format!("Instance '{}' has no version label", instance.id));
            }
        }

        if !errors.is_empty() {
            return Err(RoutingError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }
}
