//! Constants shared by the rule evaluator, the instance selector and integrators.

/// Sum of all version weights for one routing decision.
pub const SUM_WEIGHT: u32 = 100;

/// Weights can't be lower than this.
pub const MIN_WEIGHT: u32 = 0;

/// Weight assigned to a match service that does not declare one.
pub const DEFAULT_WEIGHT: u32 = 100;

/// Instance metadata key carrying the version label.
pub const VERSION: &str = "version";

/// Instance metadata key carrying the region label.
pub const REGION: &str = "region";

/// Instance metadata key carrying the zone label.
pub const ZONE: &str = "zone";

/// Registry group used when none is configured.
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

/// Ordinary algorithm used when a service has no routing data and none is configured.
pub const DEFAULT_ORDINARY_RULE: &str = "round_robin";
