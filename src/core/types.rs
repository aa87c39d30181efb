//! # Core Types Module
//!
//! Data structures shared by every layer of the router: the service instances
//! reported by the registry and the request attributes a routing decision is
//! evaluated against.
//!
//! Both are read-only to the routing code. Instances are handed around as
//! `Arc<ServiceInstance>` so partitioning them by version never copies metadata.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::core::constants::{DEFAULT_GROUP, REGION, VERSION, ZONE};

/// Service instance information as reported by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Unique instance identifier
    pub id: String,

    /// Service name
    pub service: String,

    /// Registry group
    #[serde(default = "default_group")]
    pub group: String,

    /// Host name or IP address
    pub host: String,

    /// Port
    pub port: u16,

    /// Instance metadata, must carry the `version` label to take part in label routing
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Health status
    #[serde(default)]
    pub health_status: HealthStatus,

    /// Instance weight for the `weighted` ordinary rule
    #[serde(default = "default_instance_weight")]
    pub weight: u32,
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

fn default_instance_weight() -> u32 {
    1
}

impl ServiceInstance {
    /// Create a new healthy instance in the default group
    pub fn new<I, S, H>(id: I, service: S, host: H, port: u16) -> Self
    where
        I: Into<String>,
        S: Into<String>,
        H: Into<String>,
    {
        Self {
            id: id.into(),
            service: service.into(),
            group: default_group(),
            host: host.into(),
            port,
            metadata: HashMap::new(),
            health_status: HealthStatus::Healthy,
            weight: default_instance_weight(),
        }
    }

    /// Set the `version` metadata label
    pub fn with_version<S: Into<String>>(self, version: S) -> Self {
        self.with_metadata(VERSION, version)
    }

    /// Set an arbitrary metadata entry
    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the registry group
    pub fn with_group<S: Into<String>>(mut self, group: S) -> Self {
        self.group = group.into();
        self
    }

    /// Set the instance weight
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Set the health status
    pub fn with_health(mut self, status: HealthStatus) -> Self {
        self.health_status = status;
        self
    }

    /// Version label, if the instance advertises one
    pub fn version(&self) -> Option<&str> {
        self.metadata.get(VERSION).map(String::as_str)
    }

    /// Region label, if any
    pub fn region(&self) -> Option<&str> {
        self.metadata.get(REGION).map(String::as_str)
    }

    /// Zone label, if any
    pub fn zone(&self) -> Option<&str> {
        self.metadata.get(ZONE).map(String::as_str)
    }

    /// Check if instance is healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self.health_status, HealthStatus::Healthy)
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Health status of a service instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Instance is healthy and ready to receive traffic
    #[default]
    Healthy,
    /// Instance is unhealthy and should not receive traffic
    Unhealthy,
    /// Health status is unknown (e.g., not yet checked)
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Request attributes a routing decision is evaluated against
///
/// Passed explicitly into every decision; nothing in the router reads the
/// current request from ambient state. Header names are stored lowercased so
/// lookups are case-insensitive. Parameters keep every value, but rules only
/// look at the first one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestAttributes {
    headers: BTreeMap<String, String>,
    params: BTreeMap<String, Vec<String>>,
    path: String,
}

impl RequestAttributes {
    /// Create attributes for a request path with no headers or parameters
    pub fn new<P: Into<String>>(path: P) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Add a header (name is lowercased, last value wins)
    pub fn with_header<K: AsRef<str>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Append a query parameter value
    pub fn with_param<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.params.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Build attributes from an HTTP header map and request URI
    ///
    /// Only the first value of a repeated header is kept; header values that are
    /// not visible ASCII are skipped. Query parameters are percent-decoded.
    pub fn from_http(headers: &http::HeaderMap, uri: &http::Uri) -> Self {
        let mut attrs = Self::new(uri.path());

        for name in headers.keys() {
            let value = headers.get(name).and_then(|value| value.to_str().ok());
            if let Some(value) = value {
                attrs.headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        if let Some(query) = uri.query() {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                attrs
                    .params
                    .entry(key.into_owned())
                    .or_default()
                    .push(value.into_owned());
            }
        }

        attrs
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        match self.headers.get(name) {
            Some(value) => Some(value.as_str()),
            None => self
                .headers
                .get(&name.to_ascii_lowercase())
                .map(String::as_str),
        }
    }

    /// First value of a query parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Request path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Header names in evaluation order
    pub fn header_names(&self) -> impl Iterator<Item = &str> {
        self.headers.keys().map(String::as_str)
    }

    /// Parameter names in evaluation order
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }
}
