//! Routing rule data model.
//!
//! Rules arrive from configuration as strings (`type`, `condition`). Both are
//! parsed into enums at load time, but values outside the supported set are
//! kept as `Unsupported` instead of failing the whole load: a bad rule only
//! fails the decisions that actually evaluate it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::constants::DEFAULT_WEIGHT;

/// Where a rule reads its left-hand value from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleKind {
    /// The request path
    Path,
    /// A request header, named by the rule key
    Header,
    /// A query parameter, named by the rule key
    Parameter,
    /// Anything else found in rule data
    Unsupported(String),
}

impl From<String> for RuleKind {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "path" => Self::Path,
            "header" => Self::Header,
            "parameter" | "param" => Self::Parameter,
            _ => Self::Unsupported(value),
        }
    }
}

impl From<RuleKind> for String {
    fn from(kind: RuleKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Path => write!(f, "path"),
            RuleKind::Header => write!(f, "header"),
            RuleKind::Parameter => write!(f, "parameter"),
            RuleKind::Unsupported(other) => write!(f, "{}", other),
        }
    }
}

/// Comparison applied between the request value and the rule value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Condition {
    Exact,
    Equal,
    Regex,
    Prefix,
    Contain,
    Greater,
    Less,
    NotEqual,
    Unsupported(String),
}

impl From<String> for Condition {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "exact" => Self::Exact,
            "=" | "equal" => Self::Equal,
            "regex" => Self::Regex,
            "prefix" => Self::Prefix,
            "contain" => Self::Contain,
            ">" | "greater" => Self::Greater,
            "<" | "less" => Self::Less,
            "!=" | "not_equal" => Self::NotEqual,
            _ => Self::Unsupported(value),
        }
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.to_string()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Exact => write!(f, "exact"),
            Condition::Equal => write!(f, "="),
            Condition::Regex => write!(f, "regex"),
            Condition::Prefix => write!(f, "prefix"),
            Condition::Contain => write!(f, "contain"),
            Condition::Greater => write!(f, ">"),
            Condition::Less => write!(f, "<"),
            Condition::NotEqual => write!(f, "!="),
            Condition::Unsupported(other) => write!(f, "{}", other),
        }
    }
}

/// A single routing rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "type")]
    pub kind: RuleKind,

    /// Header or parameter name, empty for path rules
    #[serde(default)]
    pub key: String,

    pub condition: Condition,

    pub value: String,
}

impl Rule {
    pub fn new<K: Into<String>, V: Into<String>>(
        kind: RuleKind,
        key: K,
        condition: Condition,
        value: V,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            condition,
            value: value.into(),
        }
    }

    pub fn header<K: Into<String>, V: Into<String>>(key: K, condition: Condition, value: V) -> Self {
        Self::new(RuleKind::Header, key, condition, value)
    }

    pub fn parameter<K: Into<String>, V: Into<String>>(
        key: K,
        condition: Condition,
        value: V,
    ) -> Self {
        Self::new(RuleKind::Parameter, key, condition, value)
    }

    pub fn path<V: Into<String>>(condition: Condition, value: V) -> Self {
        Self::new(RuleKind::Path, String::new(), condition, value)
    }
}

/// A rule package: version, its traffic weight, an optional fallback version,
/// and the rules that must all match to activate it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchService {
    pub version: String,

    #[serde(default = "default_weight")]
    pub weight: u32,

    #[serde(default, alias = "fallback", alias = "fallbackVersion")]
    pub fallback_version: Option<String>,

    #[serde(default, alias = "ruleList")]
    pub rule_list: Vec<Rule>,
}

fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

impl MatchService {
    pub fn new<V: Into<String>>(version: V, weight: u32) -> Self {
        Self {
            version: version.into(),
            weight,
            fallback_version: None,
            rule_list: Vec::new(),
        }
    }

    pub fn with_fallback<V: Into<String>>(mut self, version: V) -> Self {
        self.fallback_version = Some(version.into());
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rule_list.push(rule);
        self
    }

    /// A single path rule with no key to index it by
    pub fn is_path_only(&self) -> bool {
        self.rule_list.len() == 1 && self.rule_list[0].kind == RuleKind::Path
    }
}

/// Routing data for one target service, as pushed by the control plane or
/// loaded from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRuleData {
    #[serde(alias = "targetService")]
    pub target_service: String,

    #[serde(alias = "defaultRouteVersion")]
    pub default_route_version: String,

    #[serde(default, alias = "matchRouteList")]
    pub match_route_list: Vec<MatchService>,
}

impl RoutingRuleData {
    pub fn new<S: Into<String>, V: Into<String>>(target_service: S, default_route_version: V) -> Self {
        Self {
            target_service: target_service.into(),
            default_route_version: default_route_version.into(),
            match_route_list: Vec::new(),
        }
    }

    pub fn with_match_service(mut self, match_service: MatchService) -> Self {
        self.match_route_list.push(match_service);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_condition_aliases() {
        assert_eq!(Condition::from("=".to_string()), Condition::Equal);
        assert_eq!(Condition::from("EXACT".to_string()), Condition::Exact);
        assert_eq!(Condition::from(">".to_string()), Condition::Greater);
        assert_eq!(Condition::from("not_equal".to_string()), Condition::NotEqual);
        assert_eq!(
            Condition::from("fuzzy".to_string()),
            Condition::Unsupported("fuzzy".to_string())
        );
    }

    #[test]
    fn test_deserialize_routing_data() {
        let yaml = r#"
targetService: orders
defaultRouteVersion: v1
matchRouteList:
  - version: v2
    weight: 20
    fallback: v1
    ruleList:
      - type: header
        key: X-Canary
        condition: "="
        value: "true"
  - version: v3
    ruleList:
      - type: path
        condition: exact
        value: /orders/beta
"#;
        let data: RoutingRuleData = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(data.target_service, "orders");
        assert_eq!(data.default_route_version, "v1");
        assert_eq!(data.match_route_list.len(), 2);

        let canary = &data.match_route_list[0];
        assert_eq!(canary.weight, 20);
        assert_eq!(canary.fallback_version.as_deref(), Some("v1"));
        assert_eq!(canary.rule_list[0], Rule::header("X-Canary", Condition::Equal, "true"));

        let beta = &data.match_route_list[1];
        assert_eq!(beta.weight, DEFAULT_WEIGHT);
        assert!(beta.is_path_only());
    }

    #[test]
    fn test_unknown_kind_survives_loading() {
        let rule: Rule =
            serde_json::from_str(r#"{"type":"cookie","key":"k","condition":"~","value":"x"}"#)
                .unwrap();
        assert_eq!(rule.kind, RuleKind::Unsupported("cookie".to_string()));
        assert_eq!(rule.condition, Condition::Unsupported("~".to_string()));
    }
}
