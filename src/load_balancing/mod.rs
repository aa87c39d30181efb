pub mod selector;
pub mod strategies;

pub use selector::{partition_by_version, select, InstancesByVersion, ZoneAffinity};
pub use strategies::{
    BalancingStrategy, ConsistentHash, OrdinaryRuleRegistry, Random, RoundRobin, Weighted,
    BUILTIN_ALGORITHMS,
};
