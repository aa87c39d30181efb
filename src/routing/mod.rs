pub mod condition;
pub mod evaluator;
pub mod load_balance_rule;
pub mod repository;
pub mod rule;

pub use evaluator::{evaluate, Evaluation, WeightTable};
pub use load_balance_rule::RoutingLoadBalanceRule;
pub use repository::{RouteRuleSet, RoutingDataRepository};
pub use rule::{Condition, MatchService, Rule, RuleKind, RoutingRuleData};
