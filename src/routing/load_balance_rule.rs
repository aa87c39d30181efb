//! # Routing Load-Balancer Rule
//!
//! Chooses the instance for one outbound call. Services with routing data go
//! through the rule evaluator and the weighted instance selector; services
//! without it are handed to the configured ordinary algorithm.
//!
//! Every failure (registry lookups, bad rule data) ends here: it is logged,
//! counted, and turned into "no instance". Callers treat `None` as an ordinary
//! outcome and apply their own retry policy.

use rand::Rng;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::core::config::LabelRoutingProperties;
use crate::core::error::RoutingResult;
use crate::core::types::{RequestAttributes, ServiceInstance};
use crate::discovery::publisher::TargetServicePublisher;
use crate::discovery::registry::InstanceRegistry;
use crate::load_balancing::selector::{self, partition_by_version, InstancesByVersion, ZoneAffinity};
use crate::load_balancing::strategies::OrdinaryRuleRegistry;
use crate::observability::metrics::{self, DecisionOutcome};
use crate::routing::evaluator::evaluate;
use crate::routing::repository::RoutingDataRepository;

/// Label routing entry point for a load balancer
pub struct RoutingLoadBalanceRule {
    repository: Arc<RoutingDataRepository>,
    registry: Arc<dyn InstanceRegistry>,
    publisher: Arc<dyn TargetServicePublisher>,
    ordinary: Arc<OrdinaryRuleRegistry>,
    properties: LabelRoutingProperties,
    zone_affinity: Option<ZoneAffinity>,
}

impl RoutingLoadBalanceRule {
    pub fn new(
        repository: Arc<RoutingDataRepository>,
        registry: Arc<dyn InstanceRegistry>,
        publisher: Arc<dyn TargetServicePublisher>,
        properties: LabelRoutingProperties,
    ) -> Self {
        let ordinary = Arc::new(OrdinaryRuleRegistry::new(Arc::clone(&registry)));
        let zone_affinity = properties
            .zone_affinity_enabled
            .then(|| ZoneAffinity::new(properties.region.clone(), properties.zone.clone()))
            .filter(ZoneAffinity::is_active);

        Self {
            repository,
            registry,
            publisher,
            ordinary,
            properties,
            zone_affinity,
        }
    }

    /// Use a custom set of ordinary algorithms
    pub fn with_ordinary_rules(mut self, ordinary: Arc<OrdinaryRuleRegistry>) -> Self {
        self.ordinary = ordinary;
        self
    }

    pub fn properties(&self) -> &LabelRoutingProperties {
        &self.properties
    }

    pub fn repository(&self) -> &Arc<RoutingDataRepository> {
        &self.repository
    }

    /// Choose an instance of `service` for a request
    pub fn choose(
        &self,
        service: &str,
        routing_key: Option<&str>,
        attrs: &RequestAttributes,
    ) -> Option<Arc<ServiceInstance>> {
        self.choose_with_rng(service, routing_key, attrs, &mut rand::thread_rng())
    }

    /// Same as [`choose`](Self::choose) with the weighted draw taken from `rng`
    pub fn choose_with_rng<R>(
        &self,
        service: &str,
        routing_key: Option<&str>,
        attrs: &RequestAttributes,
        rng: &mut R,
    ) -> Option<Arc<ServiceInstance>>
    where
        R: Rng + ?Sized,
    {
        let started = Instant::now();

        match self.try_choose(service, routing_key, attrs, rng) {
            Ok((selected, outcome)) => {
                metrics::record_decision(outcome, started.elapsed());
                selected
            }
            Err(e) => {
                warn!(
                    service = %service,
                    error = %e,
                    error_type = e.error_type(),
                    retryable = e.is_retryable(),
                    "Label routing failed, no instance selected"
                );
                metrics::record_error(&e);
                metrics::record_decision(DecisionOutcome::None, started.elapsed());
                None
            }
        }
    }

    fn try_choose<R>(
        &self,
        service: &str,
        routing_key: Option<&str>,
        attrs: &RequestAttributes,
        rng: &mut R,
    ) -> RoutingResult<(Option<Arc<ServiceInstance>>, DecisionOutcome)>
    where
        R: Rng + ?Sized,
    {
        self.publisher.add_target_service(service);

        let Some(rule_set) = self.repository.snapshot(service) else {
            let selected = self.ordinary.choose(
                service,
                &self.properties.group,
                routing_key,
                &self.properties.rule,
            )?;
            return Ok((selected, DecisionOutcome::Ordinary));
        };

        let instances = self.registry.healthy_instances(service, &self.properties.group)?;
        if instances.is_empty() {
            warn!(service = %service, "No instance in service");
            return Ok((None, DecisionOutcome::None));
        }

        let evaluation = evaluate(&rule_set, attrs)?;
        debug!(
            service = %service,
            weights = ?evaluation.weights,
            fallback_weights = ?evaluation.fallback_weights,
            "Evaluated routing rules"
        );

        let primary = self.narrow(
            service,
            partition_by_version(&instances, |v| evaluation.weights.contains_key(v)),
        );
        if !primary.is_empty() {
            let selected = selector::select(service, &primary, &evaluation.weights, rng);
            return Ok(with_outcome(selected, DecisionOutcome::Selected));
        }

        warn!(service = %service, "No instance matches the route rule, trying fallback versions");
        let fallback = self.narrow(
            service,
            partition_by_version(&instances, |v| evaluation.fallback_versions.contains(v)),
        );
        let selected = selector::select(service, &fallback, &evaluation.fallback_weights, rng);
        Ok(with_outcome(selected, DecisionOutcome::FallbackSelected))
    }

    fn narrow(&self, service: &str, by_version: InstancesByVersion) -> InstancesByVersion {
        match &self.zone_affinity {
            Some(affinity) => affinity.apply(service, by_version),
            None => by_version,
        }
    }
}

fn with_outcome(
    selected: Option<Arc<ServiceInstance>>,
    outcome: DecisionOutcome,
) -> (Option<Arc<ServiceInstance>>, DecisionOutcome) {
    match selected {
        Some(instance) => (Some(instance), outcome),
        None => (None, DecisionOutcome::None),
    }
}

impl std::fmt::Debug for RoutingLoadBalanceRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingLoadBalanceRule")
            .field("properties", &self.properties)
            .field("services", &self.repository.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::{DEFAULT_GROUP, REGION, ZONE};
    use crate::core::error::RoutingError;
    use crate::discovery::publisher::TargetServiceChangedPublisher;
    use crate::discovery::registry::ServiceRegistry;
    use crate::routing::rule::{Condition, MatchService, Rule, RoutingRuleData};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct UnreachableRegistry;

    impl InstanceRegistry for UnreachableRegistry {
        fn healthy_instances(
            &self,
            service: &str,
            _group: &str,
        ) -> RoutingResult<Vec<Arc<ServiceInstance>>> {
            Err(RoutingError::transient_lookup(service, "connection refused"))
        }
    }

    fn canary_rules() -> RoutingRuleData {
        RoutingRuleData::new("orders", "v1").with_match_service(
            MatchService::new("v2", 20)
                .with_fallback("v1")
                .with_rule(Rule::header("X-Canary", Condition::Equal, "true")),
        )
    }

    fn router(
        registry: Arc<ServiceRegistry>,
        properties: LabelRoutingProperties,
    ) -> (RoutingLoadBalanceRule, Arc<TargetServiceChangedPublisher>) {
        let repository = Arc::new(RoutingDataRepository::new());
        repository.update_route_data(vec![canary_rules()]);
        let publisher = Arc::new(TargetServiceChangedPublisher::new());
        let rule = RoutingLoadBalanceRule::new(repository, registry, publisher.clone(), properties);
        (rule, publisher)
    }

    #[test]
    fn test_target_service_is_published() {
        let registry = Arc::new(ServiceRegistry::new());
        let (rule, publisher) = router(registry, LabelRoutingProperties::default());

        rule.choose("orders", None, &RequestAttributes::new("/"));
        rule.choose("users", None, &RequestAttributes::new("/"));

        assert_eq!(publisher.targets(), vec!["orders".to_string(), "users".to_string()]);
    }

    #[test]
    fn test_service_without_rules_uses_ordinary_rule() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.add_instance(ServiceInstance::new("u1", "users", "10.0.0.1", 80));
        let (rule, _) = router(registry, LabelRoutingProperties::default());

        let chosen = rule.choose("users", None, &RequestAttributes::new("/")).unwrap();
        assert_eq!(chosen.id, "u1");
    }

    #[test]
    fn test_unknown_ordinary_algorithm_yields_none() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.add_instance(ServiceInstance::new("u1", "users", "10.0.0.1", 80));
        let properties = LabelRoutingProperties {
            rule: "fastest".to_string(),
            ..LabelRoutingProperties::default()
        };
        let (rule, _) = router(registry, properties);

        assert!(rule.choose("users", None, &RequestAttributes::new("/")).is_none());
    }

    #[test]
    fn test_registry_failure_yields_none() {
        let repository = Arc::new(RoutingDataRepository::new());
        repository.update_route_data(vec![canary_rules()]);
        let rule = RoutingLoadBalanceRule::new(
            repository,
            Arc::new(UnreachableRegistry),
            Arc::new(TargetServiceChangedPublisher::new()),
            LabelRoutingProperties::default(),
        );

        assert!(rule.choose("orders", None, &RequestAttributes::new("/")).is_none());
        assert!(rule.choose("users", None, &RequestAttributes::new("/")).is_none());
    }

    #[test]
    fn test_no_healthy_instance_yields_none() {
        let registry = Arc::new(ServiceRegistry::new());
        let (rule, _) = router(registry, LabelRoutingProperties::default());
        assert!(rule.choose("orders", None, &RequestAttributes::new("/")).is_none());
    }

    #[test]
    fn test_fallback_versions_are_used_when_matched_version_is_gone() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.add_instance(ServiceInstance::new("v1-a", "orders", "10.0.0.1", 80).with_version("v1"));
        registry.add_instance(ServiceInstance::new("v3-a", "orders", "10.0.0.3", 80).with_version("v3"));

        let repository = Arc::new(RoutingDataRepository::new());
        repository.update_route_data(vec![RoutingRuleData::new("orders", "v9").with_match_service(
            MatchService::new("v2", 100)
                .with_fallback("v1")
                .with_rule(Rule::header("x-canary", Condition::Equal, "true")),
        )]);
        let rule = RoutingLoadBalanceRule::new(
            repository,
            registry,
            Arc::new(TargetServiceChangedPublisher::new()),
            LabelRoutingProperties::default(),
        );

        let attrs = RequestAttributes::new("/").with_header("X-Canary", "true");
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let chosen = rule.choose_with_rng("orders", None, &attrs, &mut rng).unwrap();
            assert_eq!(chosen.id, "v1-a");
        }
    }

    #[test]
    fn test_zone_affinity_prefers_local_instances() {
        let registry = Arc::new(ServiceRegistry::new());
        for (id, zone) in [("v1-local", "eu-1a"), ("v1-remote", "eu-1b")] {
            registry.add_instance(
                ServiceInstance::new(id, "orders", "10.0.0.1", 80)
                    .with_version("v1")
                    .with_metadata(REGION, "eu")
                    .with_metadata(ZONE, zone),
            );
        }
        let properties = LabelRoutingProperties {
            zone_affinity_enabled: true,
            region: Some("eu".to_string()),
            zone: Some("eu-1a".to_string()),
            group: DEFAULT_GROUP.to_string(),
            ..LabelRoutingProperties::default()
        };
        let (rule, _) = router(registry, properties);

        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            let chosen = rule
                .choose_with_rng("orders", None, &RequestAttributes::new("/"), &mut rng)
                .unwrap();
            assert_eq!(chosen.id, "v1-local");
        }
    }
}
