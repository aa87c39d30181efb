//! # Configuration Loading Tests
//!
//! Files on disk through `RouterConfig::load*`, and a configured router
//! making decisions.

use label_router::{LogFormat, RouterConfig, RoutingError};
use std::io::Write;
use tempfile::NamedTempFile;

const YAML: &str = r#"
logging:
  level: info
  format: text
label_routing:
  rule: round_robin
  group: DEFAULT_GROUP
routes:
  - targetService: orders
    defaultRouteVersion: v1
    matchRouteList:
      - version: v2
        weight: 100
        fallback: v1
        ruleList:
          - type: parameter
            key: tier
            condition: equal
            value: gold
instances:
  - id: orders-v1
    service: orders
    host: 10.0.0.1
    port: 8080
    metadata:
      version: v1
  - id: orders-v2
    service: orders
    host: 10.0.0.2
    port: 8080
    metadata:
      version: v2
"#;

fn write_temp(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[tokio::test]
async fn test_load_yaml_file() {
    let file = write_temp(YAML, ".yaml");
    let config = RouterConfig::load_from_file(file.path()).await.unwrap();

    assert_eq!(config.logging.format, LogFormat::Text);
    assert_eq!(config.routes.len(), 1);
    assert_eq!(config.routes[0].match_route_list[0].fallback_version.as_deref(), Some("v1"));
    assert_eq!(config.instances.len(), 2);
}

#[tokio::test]
async fn test_load_json_file_by_extension() {
    let config: RouterConfig = serde_yaml::from_str(YAML).unwrap();
    let file = write_temp(&serde_json::to_string_pretty(&config).unwrap(), ".json");

    let loaded = RouterConfig::load(file.path()).await.unwrap();
    assert_eq!(loaded.routes, config.routes);
    assert_eq!(loaded.instances, config.instances);
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let result = RouterConfig::load_from_file("/nonexistent/label-router.yaml").await;
    assert!(matches!(result, Err(RoutingError::Io { .. })));
}

#[tokio::test]
async fn test_malformed_yaml_is_reported() {
    let file = write_temp("routes: [unclosed", ".yaml");
    let result = RouterConfig::load_from_file(file.path()).await;
    assert!(matches!(result, Err(RoutingError::Yaml { .. })));
}

#[tokio::test]
async fn test_invalid_settings_are_rejected() {
    let file = write_temp("label_routing:\n  rule: fastest\n", ".yaml");
    let result = RouterConfig::load_from_file(file.path()).await;
    assert!(matches!(result, Err(RoutingError::Configuration { .. })));
}
