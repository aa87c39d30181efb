//! # Instance Selector
//!
//! Weighted-random choice among instances grouped by version label.
//!
//! A version's weight is split evenly across its instances. The per-instance
//! shares are laid out as a cumulative distribution and one uniform draw is
//! located in it with a binary search. The draw spans the total weight that is
//! actually reachable, so versions without instances don't turn into dead
//! ranges. A total above `SUM_WEIGHT` is a data defect: it is logged and
//! counted, and selection proceeds over the whole range.
//!
//! The random source is passed in by the caller. Nothing here keeps state
//! between calls.

use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::core::constants::{MIN_WEIGHT, SUM_WEIGHT};
use crate::core::types::ServiceInstance;
use crate::observability::metrics;
use crate::routing::evaluator::WeightTable;

/// Instances grouped by their `version` label
pub type InstancesByVersion = BTreeMap<String, Vec<Arc<ServiceInstance>>>;

/// Group instances by version label, keeping only the versions `accept` allows
///
/// Instances without a version label are left out.
pub fn partition_by_version<F>(instances: &[Arc<ServiceInstance>], accept: F) -> InstancesByVersion
where
    F: Fn(&str) -> bool,
{
    let mut by_version = InstancesByVersion::new();
    for instance in instances {
        if let Some(version) = instance.version() {
            if accept(version) {
                by_version
                    .entry(version.to_string())
                    .or_default()
                    .push(Arc::clone(instance));
            }
        }
    }
    by_version
}

/// Pick one instance with probability proportional to its share of its version's weight
pub fn select<R>(
    service: &str,
    by_version: &InstancesByVersion,
    weights: &WeightTable,
    rng: &mut R,
) -> Option<Arc<ServiceInstance>>
where
    R: Rng + ?Sized,
{
    let mut instances: Vec<&Arc<ServiceInstance>> = Vec::new();
    let mut cumulative: Vec<f64> = Vec::new();
    let mut sum = 0.0_f64;

    for (version, list) in by_version {
        if list.is_empty() {
            continue;
        }
        let weight = weights.get(version).copied().unwrap_or(MIN_WEIGHT);
        let share = f64::from(weight) / list.len() as f64;
        for instance in list {
            sum += share;
            instances.push(instance);
            cumulative.push(sum);
        }
    }

    if instances.is_empty() {
        return None;
    }

    if sum > f64::from(SUM_WEIGHT) {
        error!(
            service = %service,
            sum,
            max = SUM_WEIGHT,
            "Sum of weight is over the maximum, selection is normalized"
        );
        metrics::record_weight_overflow(service);
    }

    if sum <= f64::from(MIN_WEIGHT) {
        warn!(service = %service, "All candidate instances carry zero weight");
        return None;
    }

    if instances.len() == 1 {
        return Some(Arc::clone(instances[0]));
    }

    let draw = rng.gen_range(f64::from(MIN_WEIGHT)..sum);
    let index = cumulative
        .partition_point(|&bound| bound <= draw)
        .min(instances.len() - 1);

    let selected = instances[index];
    debug!(
        service = %service,
        instance = %selected.id,
        version = ?selected.version(),
        draw,
        "Selected instance by weight"
    );
    Some(Arc::clone(selected))
}

/// Narrows candidates to the caller's own region and zone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneAffinity {
    pub region: Option<String>,
    pub zone: Option<String>,
}

impl ZoneAffinity {
    pub fn new(region: Option<String>, zone: Option<String>) -> Self {
        Self { region, zone }
    }

    /// Whether any label is configured
    pub fn is_active(&self) -> bool {
        non_empty(self.region.as_deref()).is_some() || non_empty(self.zone.as_deref()).is_some()
    }

    /// Keep, per version, the instances in the same region and zone
    ///
    /// If that leaves any version without instances the partition is returned
    /// unchanged.
    pub fn apply(&self, service: &str, by_version: InstancesByVersion) -> InstancesByVersion {
        if !self.is_active() {
            return by_version;
        }

        let mut narrowed = InstancesByVersion::new();
        for (version, list) in &by_version {
            let local: Vec<Arc<ServiceInstance>> = list
                .iter()
                .filter(|instance| self.is_local(instance))
                .cloned()
                .collect();
            if local.is_empty() {
                warn!(
                    service = %service,
                    version = %version,
                    "No instance in the local region and zone, ignoring zone affinity"
                );
                return by_version;
            }
            narrowed.insert(version.clone(), local);
        }

        narrowed
    }

    fn is_local(&self, instance: &ServiceInstance) -> bool {
        non_empty(self.region.as_deref()) == non_empty(instance.region())
            && non_empty(self.zone.as_deref()) == non_empty(instance.zone())
    }
}

fn non_empty(label: Option<&str>) -> Option<&str> {
    label.filter(|value| !value.is_empty())
}
