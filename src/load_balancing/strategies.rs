//! # Ordinary Load Balancing
//!
//! Algorithms used for services that carry no routing data. Each algorithm is
//! synchronous and picks from a slice of healthy instances; the
//! [`OrdinaryRuleRegistry`] looks them up by name and fetches the instances
//! from the registry client itself.
//!
//! Built-in algorithms:
//!
//! 1. **round_robin**: cycles through the instances
//! 2. **random**: uniform choice
//! 3. **weighted**: random choice proportional to each instance's `weight`
//! 4. **consistent_hash**: stable choice per routing key on a hash ring

use dashmap::DashMap;
use metrics::counter;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::config_error;
use crate::core::error::RoutingResult;
use crate::core::types::ServiceInstance;
use crate::discovery::registry::InstanceRegistry;

/// A non-label load balancing algorithm
pub trait BalancingStrategy: Send + Sync {
    /// Pick one of `instances`; `routing_key` is only used by key-aware algorithms
    fn select<'a>(
        &self,
        instances: &'a [Arc<ServiceInstance>],
        routing_key: Option<&str>,
    ) -> Option<&'a Arc<ServiceInstance>>;

    /// Name used for registration, logs and metrics
    fn name(&self) -> &'static str;
}

#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BalancingStrategy for RoundRobin {
    fn select<'a>(
        &self,
        instances: &'a [Arc<ServiceInstance>],
        _routing_key: Option<&str>,
    ) -> Option<&'a Arc<ServiceInstance>> {
        if instances.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % instances.len();
        instances.get(index)
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

#[derive(Debug, Default)]
pub struct Random;

impl BalancingStrategy for Random {
    fn select<'a>(
        &self,
        instances: &'a [Arc<ServiceInstance>],
        _routing_key: Option<&str>,
    ) -> Option<&'a Arc<ServiceInstance>> {
        if instances.is_empty() {
            return None;
        }

        let index = rand::thread_rng().gen_range(0..instances.len());
        instances.get(index)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Random choice proportional to `ServiceInstance::weight`
///
/// When every instance has weight zero it degrades to round robin.
#[derive(Debug, Default)]
pub struct Weighted {
    fallback: RoundRobin,
}

impl Weighted {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BalancingStrategy for Weighted {
    fn select<'a>(
        &self,
        instances: &'a [Arc<ServiceInstance>],
        routing_key: Option<&str>,
    ) -> Option<&'a Arc<ServiceInstance>> {
        if instances.is_empty() {
            return None;
        }

        let total_weight: u64 = instances.iter().map(|i| u64::from(i.weight)).sum();
        if total_weight == 0 {
            return self.fallback.select(instances, routing_key);
        }

        let mut remaining = rand::thread_rng().gen_range(0..total_weight);
        for instance in instances {
            let weight = u64::from(instance.weight);
            if remaining < weight {
                return Some(instance);
            }
            remaining -= weight;
        }

        instances.last()
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}

/// Hash ring keyed by routing key, with virtual nodes per instance
///
/// Requests without a routing key are spread round robin.
#[derive(Debug)]
pub struct ConsistentHash {
    virtual_nodes: usize,
    fallback: RoundRobin,
}

impl ConsistentHash {
    pub fn new(virtual_nodes: Option<usize>) -> Self {
        Self {
            virtual_nodes: virtual_nodes.unwrap_or(150).max(1),
            fallback: RoundRobin::new(),
        }
    }

    fn ring(&self, instances: &[Arc<ServiceInstance>]) -> BTreeMap<u64, usize> {
        let mut ring = BTreeMap::new();
        for (index, instance) in instances.iter().enumerate() {
            for node in 0..self.virtual_nodes {
                ring.insert(hash(&format!("{}:{}", instance.id, node)), index);
            }
        }
        ring
    }
}

impl Default for ConsistentHash {
    fn default() -> Self {
        Self::new(None)
    }
}

impl BalancingStrategy for ConsistentHash {
    fn select<'a>(
        &self,
        instances: &'a [Arc<ServiceInstance>],
        routing_key: Option<&str>,
    ) -> Option<&'a Arc<ServiceInstance>> {
        if instances.is_empty() {
            return None;
        }

        let Some(key) = routing_key.filter(|k| !k.is_empty()) else {
            return self.fallback.select(instances, None);
        };

        let ring = self.ring(instances);
        let key_hash = hash(key);
        let index = ring
            .range(key_hash..)
            .next()
            .or_else(|| ring.iter().next())
            .map(|(_, index)| *index)?;

        instances.get(index)
    }

    fn name(&self) -> &'static str {
        "consistent_hash"
    }
}

fn hash(value: &str) -> u64 {
    let digest = Sha256::digest(value.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    u64::from_be_bytes(bytes)
}

/// Names of the algorithms every registry starts with
pub const BUILTIN_ALGORITHMS: [&str; 4] = ["round_robin", "random", "weighted", "consistent_hash"];

/// Named ordinary algorithms plus the registry client they draw instances from
pub struct OrdinaryRuleRegistry {
    registry: Arc<dyn InstanceRegistry>,
    strategies: DashMap<String, Arc<dyn BalancingStrategy>>,
}

impl OrdinaryRuleRegistry {
    /// Create a registry with the built-in algorithms
    pub fn new(registry: Arc<dyn InstanceRegistry>) -> Self {
        let strategies: DashMap<String, Arc<dyn BalancingStrategy>> = DashMap::new();
        let builtin: [Arc<dyn BalancingStrategy>; 4] = [
            Arc::new(RoundRobin::new()),
            Arc::new(Random),
            Arc::new(Weighted::new()),
            Arc::new(ConsistentHash::default()),
        ];
        for strategy in builtin {
            strategies.insert(strategy.name().to_string(), strategy);
        }

        Self { registry, strategies }
    }

    /// Register or replace an algorithm under its own name
    pub fn register(&self, strategy: Arc<dyn BalancingStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    pub fn contains(&self, algorithm: &str) -> bool {
        self.strategies.contains_key(algorithm)
    }

    pub fn algorithms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Choose an instance of `service` with the named algorithm
    pub fn choose(
        &self,
        service: &str,
        group: &str,
        routing_key: Option<&str>,
        algorithm: &str,
    ) -> RoutingResult<Option<Arc<ServiceInstance>>> {
        let strategy = self
            .strategies
            .get(algorithm)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| config_error!("unknown load balancing algorithm: {}", algorithm))?;

        let instances = self.registry.healthy_instances(service, group)?;
        let selected = strategy.select(&instances, routing_key).cloned();

        if let Some(instance) = &selected {
            counter!("label_routing_ordinary_selections_total", "algorithm" => strategy.name())
                .increment(1);
            debug!(
                service = %service,
                instance = %instance.id,
                algorithm = strategy.name(),
                "Selected instance with ordinary rule"
            );
        }

        Ok(selected)
    }
}

impl std::fmt::Debug for OrdinaryRuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrdinaryRuleRegistry")
            .field("algorithms", &self.algorithms())
            .finish()
    }
}
