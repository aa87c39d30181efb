//! # Label Router
//!
//! Label-based weighted traffic routing for service-to-service calls.
//!
//! Each outbound call names a target service. If routing rules exist for it,
//! the request's headers, query parameters and path are matched against the
//! rules to build a weight table over version labels, and an instance is drawn
//! from the healthy instances of those versions with probability proportional
//! to the weights. Services without rules use an ordinary load balancing
//! algorithm instead.
//!
//! ## Usage Example
//!
//! ```rust
//! use label_router::{
//!     Condition, LabelRoutingProperties, MatchService, RequestAttributes, Rule,
//!     RoutingDataRepository, RoutingLoadBalanceRule, RoutingRuleData, ServiceInstance,
//!     ServiceRegistry, TargetServiceChangedPublisher,
//! };
//! use std::sync::Arc;
//!
//! let repository = Arc::new(RoutingDataRepository::new());
//! repository.update_route_data(vec![RoutingRuleData::new("orders", "v1").with_match_service(
//!     MatchService::new("v2", 20).with_rule(Rule::header("X-Canary", Condition::Equal, "true")),
//! )]);
//!
//! let registry = Arc::new(ServiceRegistry::new());
//! registry.add_instance(ServiceInstance::new("orders-1", "orders", "10.0.0.1", 8080).with_version("v1"));
//!
//! let rule = RoutingLoadBalanceRule::new(
//!     repository,
//!     registry,
//!     Arc::new(TargetServiceChangedPublisher::new()),
//!     LabelRoutingProperties::default(),
//! );
//!
//! let chosen = rule.choose("orders", None, &RequestAttributes::new("/orders"));
//! assert_eq!(chosen.unwrap().id, "orders-1");
//! ```

/// Error types, configuration, constants and shared data structures
pub mod core;

/// Rule data model, condition matching, rule repository, evaluation and the
/// routing load balancer rule that ties them together
pub mod routing;

/// Weighted instance selection and the ordinary load balancing algorithms
pub mod load_balancing;

/// Registry client and change notification publisher
pub mod discovery;

/// Logging setup and routing metrics
pub mod observability;

// Re-export commonly used types for convenience
pub use crate::core::config::{LabelRoutingProperties, LogConfig, LogFormat, RouterConfig};
pub use crate::core::constants::{MIN_WEIGHT, SUM_WEIGHT};
pub use crate::core::error::{RoutingError, RoutingResult};
pub use crate::core::types::{HealthStatus, RequestAttributes, ServiceInstance};
pub use discovery::{
    InstanceRegistry, ServiceRegistry, TargetServiceChangedPublisher, TargetServicePublisher,
};
pub use load_balancing::{OrdinaryRuleRegistry, ZoneAffinity};
pub use routing::{
    Condition, Evaluation, MatchService, RouteRuleSet, RoutingDataRepository, RoutingLoadBalanceRule,
    RoutingRuleData, Rule, RuleKind, WeightTable,
};
