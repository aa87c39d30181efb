//! # Route Rule Repository
//!
//! Process-wide store of routing rules, one immutable [`RouteRuleSet`] per
//! target service. Writers build a complete new map and swap it in with
//! `ArcSwap`; readers take an `Arc` snapshot of one service's set and keep it
//! for the whole decision, so a decision never sees half of an update and
//! never takes a lock.
//!
//! Rules are indexed by attribute key ("double hash index": service name, then
//! header/parameter name). A match service made of a single path rule has no
//! key and is kept in a separate path-only list.
//!
//! Regex patterns are compiled while a set is built and are dropped with it.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::core::constants::SUM_WEIGHT;
use crate::core::error::RoutingError;
use crate::routing::condition::CompiledPatterns;
use crate::routing::rule::{MatchService, RoutingRuleData};

/// Immutable routing rules for one target service
#[derive(Debug, Clone, Default)]
pub struct RouteRuleSet {
    service: String,
    by_attribute_key: HashMap<String, Vec<Arc<MatchService>>>,
    header_index: HashMap<String, Vec<Arc<MatchService>>>,
    path_only_rules: Vec<Arc<MatchService>>,
    default_version: String,
    patterns: CompiledPatterns,
}

impl RouteRuleSet {
    /// Build the indexed rule set for one service
    pub fn build(data: &RoutingRuleData) -> Self {
        let mut by_attribute_key: HashMap<String, Vec<Arc<MatchService>>> = HashMap::new();
        let mut header_index: HashMap<String, Vec<Arc<MatchService>>> = HashMap::new();
        let mut path_only_rules = Vec::new();

        for match_service in &data.match_route_list {
            let match_service = Arc::new(match_service.clone());

            if match_service.is_path_only() {
                path_only_rules.push(match_service);
                continue;
            }

            for rule in &match_service.rule_list {
                // Path rules inside a multi-rule package carry no key.
                if rule.key.is_empty() {
                    continue;
                }
                push_once(by_attribute_key.entry(rule.key.clone()).or_default(), &match_service);
                push_once(
                    header_index.entry(rule.key.to_ascii_lowercase()).or_default(),
                    &match_service,
                );
            }
        }

        let patterns = CompiledPatterns::compile(
            data.match_route_list
                .iter()
                .flat_map(|match_service| match_service.rule_list.iter()),
        );

        Self {
            service: data.target_service.clone(),
            by_attribute_key,
            header_index,
            path_only_rules,
            default_version: data.default_route_version.clone(),
            patterns,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Match services indexed under an exact attribute key
    pub fn match_services(&self, key: &str) -> Option<&[Arc<MatchService>]> {
        self.by_attribute_key.get(key).map(Vec::as_slice)
    }

    /// Match services indexed under a header name, compared case-insensitively
    pub fn header_match_services(&self, name: &str) -> Option<&[Arc<MatchService>]> {
        self.header_index
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn by_attribute_key(&self) -> &HashMap<String, Vec<Arc<MatchService>>> {
        &self.by_attribute_key
    }

    pub fn path_only_rules(&self) -> &[Arc<MatchService>] {
        &self.path_only_rules
    }

    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    /// Regexes compiled for this set's rules
    pub fn patterns(&self) -> &CompiledPatterns {
        &self.patterns
    }
}

fn push_once(list: &mut Vec<Arc<MatchService>>, match_service: &Arc<MatchService>) {
    let already_last = list
        .last()
        .map(|last| Arc::ptr_eq(last, match_service))
        .unwrap_or(false);
    if !already_last {
        list.push(Arc::clone(match_service));
    }
}

type RouteCache = HashMap<String, Arc<RouteRuleSet>>;

/// Atomically swappable store of per-service rule sets
#[derive(Debug)]
pub struct RoutingDataRepository {
    route_cache: ArcSwap<RouteCache>,
}

impl RoutingDataRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self {
            route_cache: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Replace every service's rules with `route_data_list`
    ///
    /// The new index is built off to the side and swapped in at once; services
    /// absent from the list lose their routing data.
    pub fn update_route_data(&self, route_data_list: Vec<RoutingRuleData>) {
        let mut next = RouteCache::with_capacity(route_data_list.len());

        for route_data in &route_data_list {
            let set = Arc::new(RouteRuleSet::build(route_data));
            log_report(&route_data.target_service, &validate(route_data, &set));
            if next.insert(route_data.target_service.clone(), set).is_some() {
                warn!(
                    service = %route_data.target_service,
                    "Duplicate routing data for service, the later entry wins"
                );
            }
        }

        let services = next.len();
        self.route_cache.store(Arc::new(next));
        info!(services, "Routing data replaced");
    }

    /// Replace the rules of a single service, leaving the others untouched
    pub fn upsert_service(&self, route_data: RoutingRuleData) {
        let set = Arc::new(RouteRuleSet::build(&route_data));
        log_report(&route_data.target_service, &validate(&route_data, &set));

        self.route_cache.rcu(|current| {
            let mut next = RouteCache::clone(current);
            next.insert(route_data.target_service.clone(), Arc::clone(&set));
            next
        });

        debug!(service = %route_data.target_service, "Routing data updated for service");
    }

    /// Drop the rules of a service; it falls back to ordinary load balancing
    pub fn remove_service(&self, service: &str) -> bool {
        if !self.route_cache.load().contains_key(service) {
            return false;
        }

        self.route_cache.rcu(|current| {
            let mut next = RouteCache::clone(current);
            next.remove(service);
            next
        });

        debug!(service = %service, "Routing data removed for service");
        true
    }

    /// Snapshot of one service's rule set
    pub fn snapshot(&self, service: &str) -> Option<Arc<RouteRuleSet>> {
        self.route_cache.load().get(service).cloned()
    }

    /// Attribute-keyed rules of a service
    pub fn route_rule(&self, service: &str) -> Option<HashMap<String, Vec<Arc<MatchService>>>> {
        self.snapshot(service)
            .map(|set| set.by_attribute_key().clone())
    }

    /// Path-only rules of a service (empty when the service has none)
    pub fn path_rules(&self, service: &str) -> Vec<Arc<MatchService>> {
        self.snapshot(service)
            .map(|set| set.path_only_rules().to_vec())
            .unwrap_or_default()
    }

    /// Default route version of a service
    pub fn default_route_version(&self, service: &str) -> Option<String> {
        self.snapshot(service)
            .map(|set| set.default_version().to_string())
    }

    /// Services with routing data
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.route_cache.load().keys().cloned().collect();
        services.sort();
        services
    }

    pub fn len(&self) -> usize {
        self.route_cache.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RoutingDataRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Defects in incoming routing data
///
/// Nothing is rejected: the set is installed anyway and a bad rule only fails
/// the decisions that evaluate it.
pub fn validate(route_data: &RoutingRuleData, set: &RouteRuleSet) -> Vec<RoutingError> {
    let service = &route_data.target_service;
    let mut report = Vec::new();

    if service.is_empty() {
        report.push(RoutingError::config("routing data lost its target service name"));
    }

    for match_service in &route_data.match_route_list {
        if match_service.rule_list.is_empty() {
            report.push(RoutingError::config(format!(
                "rule list of version '{}' is empty",
                match_service.version
            )));
        }
        if match_service.version.is_empty() {
            report.push(RoutingError::config("match service lost its version"));
        }
        if match_service.weight > SUM_WEIGHT {
            report.push(RoutingError::data_inconsistency(format!(
                "weight {} of version '{}' is above {}",
                match_service.weight, match_service.version, SUM_WEIGHT
            )));
        }
    }

    report.extend(set.patterns().errors().cloned());
    report
}

fn log_report(service: &str, report: &[RoutingError]) {
    for issue in report {
        error!(
            service = %service,
            error = %issue,
            error_type = issue.error_type(),
            "Routing data is defective, please check it"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::rule::{Condition, Rule};

    fn orders_data() -> RoutingRuleData {
        RoutingRuleData::new("orders", "v1")
            .with_match_service(
                MatchService::new("v2", 20)
                    .with_fallback("v1")
                    .with_rule(Rule::header("X-Canary", Condition::Equal, "true")),
            )
            .with_match_service(
                MatchService::new("v3", 50)
                    .with_rule(Rule::header("X-Canary", Condition::Equal, "beta"))
                    .with_rule(Rule::parameter("tier", Condition::Equal, "gold")),
            )
            .with_match_service(
                MatchService::new("v4", 100).with_rule(Rule::path(Condition::Exact, "/orders/new")),
            )
    }

    #[test]
    fn test_build_index() {
        let set = RouteRuleSet::build(&orders_data());

        assert_eq!(set.service(), "orders");
        assert_eq!(set.default_version(), "v1");
        assert_eq!(set.match_services("X-Canary").unwrap().len(), 2);
        assert_eq!(set.match_services("tier").unwrap().len(), 1);
        assert!(set.match_services("x-canary").is_none());
        assert_eq!(set.header_match_services("x-canary").unwrap().len(), 2);
        assert_eq!(set.path_only_rules().len(), 1);
        assert_eq!(set.path_only_rules()[0].version, "v4");
    }

    #[test]
    fn test_same_key_indexed_once_per_match_service() {
        let data = RoutingRuleData::new("orders", "v1").with_match_service(
            MatchService::new("v2", 10)
                .with_rule(Rule::header("x-user", Condition::Prefix, "a"))
                .with_rule(Rule::header("x-user", Condition::Contain, "z")),
        );
        let set = RouteRuleSet::build(&data);
        assert_eq!(set.match_services("x-user").unwrap().len(), 1);
    }

    #[test]
    fn test_update_replaces_everything() {
        let repository = RoutingDataRepository::new();
        repository.update_route_data(vec![orders_data(), RoutingRuleData::new("users", "v9")]);
        assert_eq!(repository.services(), vec!["orders".to_string(), "users".to_string()]);

        repository.update_route_data(vec![RoutingRuleData::new("users", "v10")]);
        assert!(repository.snapshot("orders").is_none());
        assert_eq!(repository.default_route_version("users").as_deref(), Some("v10"));
    }

    #[test]
    fn test_snapshot_survives_update() {
        let repository = RoutingDataRepository::new();
        repository.update_route_data(vec![orders_data()]);

        let before = repository.snapshot("orders").unwrap();
        repository.upsert_service(RoutingRuleData::new("orders", "v7"));

        assert_eq!(before.default_version(), "v1");
        assert_eq!(before.match_services("X-Canary").unwrap().len(), 2);
        assert_eq!(repository.snapshot("orders").unwrap().default_version(), "v7");
    }

    #[test]
    fn test_upsert_and_remove() {
        let repository = RoutingDataRepository::new();
        assert!(repository.is_empty());

        repository.upsert_service(orders_data());
        repository.upsert_service(RoutingRuleData::new("users", "v1"));
        assert_eq!(repository.len(), 2);
        assert_eq!(repository.path_rules("orders").len(), 1);
        assert!(repository.route_rule("orders").unwrap().contains_key("tier"));

        assert!(repository.remove_service("orders"));
        assert!(!repository.remove_service("orders"));
        assert!(repository.route_rule("orders").is_none());
        assert!(repository.path_rules("orders").is_empty());
        assert_eq!(repository.len(), 1);
    }

    #[test]
    fn test_patterns_live_and_die_with_their_rule_set() {
        let repository = RoutingDataRepository::new();

        for n in 0..500 {
            let pattern = format!("user-{}-\\d+", n);
            repository.upsert_service(RoutingRuleData::new("orders", "v1").with_match_service(
                MatchService::new("v2", 10).with_rule(Rule::header("x-user", Condition::Regex, pattern.as_str())),
            ));

            let set = repository.snapshot("orders").unwrap();
            assert_eq!(set.patterns().len(), 1);
            assert!(set.patterns().contains(&pattern));
        }

        let last = repository.snapshot("orders").unwrap();
        assert!(repository.remove_service("orders"));
        assert!(repository.snapshot("orders").is_none());
        // Only the snapshot still held here keeps its pattern alive.
        assert_eq!(Arc::strong_count(&last), 1);
        assert!(!last.patterns().contains("user-0-\\d+"));
    }

    #[test]
    fn test_validation_report() {
        let data = RoutingRuleData::new("orders", "v1")
            .with_match_service(MatchService::new("v2", 120).with_rule(Rule::header("x-a", Condition::Regex, "(")))
            .with_match_service(MatchService::new("", 10));
        let set = RouteRuleSet::build(&data);
        let report = validate(&data, &set);

        let types: Vec<&str> = report.iter().map(RoutingError::error_type).collect();
        assert_eq!(report.len(), 4);
        assert_eq!(types.iter().filter(|t| **t == "data_inconsistency").count(), 1);
        assert_eq!(types.iter().filter(|t| **t == "configuration_error").count(), 3);
        assert!(report.iter().all(|issue| !issue.is_retryable()));

        assert!(validate(&orders_data(), &RouteRuleSet::build(&orders_data())).is_empty());
    }
}
