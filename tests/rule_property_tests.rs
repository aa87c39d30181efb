//! Property tests for rule evaluation.

use label_router::routing::condition::CompiledPatterns;
use label_router::routing::evaluator::all_rules_match;
use label_router::routing::evaluate;
use label_router::{
    Condition, MatchService, RequestAttributes, RouteRuleSet, RoutingError, RoutingRuleData, Rule,
};
use proptest::prelude::*;

const KEYS: [&str; 3] = ["x-user", "x-tier", "x-region"];

fn condition() -> impl Strategy<Value = Condition> {
    prop_oneof![
        Just(Condition::Exact),
        Just(Condition::Equal),
        Just(Condition::Prefix),
        Just(Condition::Contain),
        Just(Condition::Greater),
        Just(Condition::Less),
        Just(Condition::NotEqual),
        Just(Condition::Regex),
        Just(Condition::Unsupported("~=".to_string())),
    ]
}

fn value() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-c]{0,3}".prop_map(String::from),
        (0u32..20).prop_map(|n| n.to_string()),
    ]
}

fn rule() -> impl Strategy<Value = Rule> {
    (prop::sample::select(KEYS.to_vec()), condition(), value())
        .prop_map(|(key, condition, value)| Rule::header(key, condition, value))
}

fn request() -> impl Strategy<Value = RequestAttributes> {
    prop::collection::vec((prop::sample::select(KEYS.to_vec()), value()), 0..3).prop_map(|headers| {
        headers
            .into_iter()
            .fold(RequestAttributes::new("/"), |attrs, (name, value)| attrs.with_header(name, value))
    })
}

fn outcome(result: Result<bool, RoutingError>) -> Option<bool> {
    match result {
        Ok(matched) => Some(matched),
        Err(RoutingError::Configuration { .. }) => None,
        Err(other) => panic!("unexpected error {:?}", other),
    }
}

proptest! {
    #[test]
    fn rule_order_never_changes_the_match(
        (rules, shuffled) in prop::collection::vec(rule(), 1..5)
            .prop_flat_map(|rules| (Just(rules.clone()), Just(rules).prop_shuffle())),
        attrs in request(),
    ) {
        let original = MatchService { rule_list: rules, ..MatchService::new("v2", 10) };
        let reordered = MatchService { rule_list: shuffled, ..MatchService::new("v2", 10) };

        let patterns = CompiledPatterns::compile(original.rule_list.iter());

        prop_assert_eq!(
            outcome(all_rules_match(&original, &attrs, &patterns)),
            outcome(all_rules_match(&reordered, &attrs, &patterns))
        );
    }

    #[test]
    fn evaluation_is_repeatable(
        rules in prop::collection::vec(rule(), 1..4),
        weight in 0u32..=100,
        attrs in request(),
    ) {
        let data = RoutingRuleData::new("orders", "v1")
            .with_match_service(MatchService { rule_list: rules, ..MatchService::new("v2", weight) }.with_fallback("v1"));
        let set = RouteRuleSet::build(&data);

        let first = evaluate(&set, &attrs);
        let second = evaluate(&set, &attrs);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn matched_and_default_weights_add_up_to_sum_weight(
        weight in 0u32..=100,
        tier in value(),
    ) {
        let data = RoutingRuleData::new("orders", "v1").with_match_service(
            MatchService::new("v2", weight).with_rule(Rule::header("x-tier", Condition::Equal, tier.clone())),
        );
        let set = RouteRuleSet::build(&data);
        let attrs = RequestAttributes::new("/").with_header("x-tier", tier);

        let evaluation = evaluate(&set, &attrs).unwrap();
        prop_assert_eq!(evaluation.total_weight(), 100);
        prop_assert_eq!(evaluation.weights.get("v2").copied().unwrap_or(0), weight);
    }
}
