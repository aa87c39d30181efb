//! # Rule Evaluator
//!
//! Turns one request's attributes and one service's [`RouteRuleSet`] into a
//! version → weight table, plus the fallback versions and their weights.
//!
//! Sources are tried in a fixed order and the first source that yields a match
//! wins: headers, then query parameters, then path-only rules. Within a key,
//! the first match service whose whole rule list matches is taken. Whatever
//! weight is left below `SUM_WEIGHT` goes to the service's default version.
//!
//! Evaluation is a pure function of its inputs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use crate::config_error;
use crate::core::constants::{MIN_WEIGHT, SUM_WEIGHT};
use crate::core::error::RoutingResult;
use crate::core::types::RequestAttributes;
use crate::routing::condition::CompiledPatterns;
use crate::routing::repository::RouteRuleSet;
use crate::routing::rule::{MatchService, Rule, RuleKind};

/// Version → weight
pub type WeightTable = BTreeMap<String, u32>;

/// Result of evaluating a request against a rule set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Weights of the matched versions and the default version
    pub weights: WeightTable,
    /// Fallback versions of the matched match services
    pub fallback_versions: BTreeSet<String>,
    /// Weights to use for the fallback versions
    pub fallback_weights: WeightTable,
}

impl Evaluation {
    /// Total weight of the primary table
    pub fn total_weight(&self) -> u32 {
        self.weights.values().sum()
    }
}

/// Reads the left-hand value of a rule out of the request
type ValueResolver = for<'a> fn(&'a Rule, &'a RequestAttributes) -> Option<&'a str>;

fn resolver(kind: &RuleKind) -> RoutingResult<ValueResolver> {
    match kind {
        RuleKind::Path => Ok(resolve_path),
        RuleKind::Header => Ok(resolve_header),
        RuleKind::Parameter => Ok(resolve_parameter),
        RuleKind::Unsupported(name) => Err(config_error!("unsupported rule type: {}", name)),
    }
}

fn resolve_path<'a>(_rule: &'a Rule, attrs: &'a RequestAttributes) -> Option<&'a str> {
    Some(attrs.path())
}

fn resolve_header<'a>(rule: &'a Rule, attrs: &'a RequestAttributes) -> Option<&'a str> {
    attrs.header(&rule.key)
}

fn resolve_parameter<'a>(rule: &'a Rule, attrs: &'a RequestAttributes) -> Option<&'a str> {
    attrs.param(&rule.key)
}

/// Evaluate a single rule against the request
pub fn rule_matches(
    rule: &Rule,
    attrs: &RequestAttributes,
    patterns: &CompiledPatterns,
) -> RoutingResult<bool> {
    let resolve = resolver(&rule.kind)?;
    rule.condition.matches(resolve(rule, attrs), &rule.value, patterns)
}

/// Whether every rule of a match service matches
///
/// All rules are evaluated, so a defective rule fails the package no matter
/// where it sits in the list.
pub fn all_rules_match(
    match_service: &MatchService,
    attrs: &RequestAttributes,
    patterns: &CompiledPatterns,
) -> RoutingResult<bool> {
    let mut matched = true;
    for rule in &match_service.rule_list {
        matched &= rule_matches(rule, attrs, patterns)?;
    }
    Ok(matched)
}

/// Evaluate `attrs` against the rules of one service
pub fn evaluate(rule_set: &RouteRuleSet, attrs: &RequestAttributes) -> RoutingResult<Evaluation> {
    let mut evaluation = Evaluation::default();
    let mut remaining = i64::from(SUM_WEIGHT);
    let mut matched = false;

    for name in attrs.header_names() {
        let Some(candidates) = rule_set.header_match_services(name) else {
            continue;
        };
        if let Some(weight) = match_key(candidates, attrs, rule_set.patterns(), &mut evaluation)? {
            debug!(service = %rule_set.service(), header = %name, weight, "Header rule matched");
            matched = true;
            remaining -= i64::from(weight);
            break;
        }
    }

    if !matched {
        for name in attrs.param_names() {
            let Some(candidates) = rule_set.match_services(name) else {
                continue;
            };
            if let Some(weight) = match_key(candidates, attrs, rule_set.patterns(), &mut evaluation)? {
                debug!(service = %rule_set.service(), parameter = %name, weight, "Parameter rule matched");
                matched = true;
                remaining -= i64::from(weight);
                break;
            }
        }
    }

    if !matched {
        // Only the value of the first rule is compared, and only for equality.
        for match_service in rule_set.path_only_rules() {
            let path_matches = match_service
                .rule_list
                .first()
                .map(|rule| rule.value == attrs.path())
                .unwrap_or(false);
            if path_matches {
                debug!(service = %rule_set.service(), path = %attrs.path(), version = %match_service.version, "Path rule matched");
                add_weight(&mut evaluation.weights, &match_service.version, match_service.weight);
                remaining -= i64::from(match_service.weight);
            }
        }
    }

    if remaining > i64::from(MIN_WEIGHT) && !rule_set.default_version().is_empty() {
        let remaining = u32::try_from(remaining).unwrap_or(SUM_WEIGHT);
        add_weight(&mut evaluation.weights, rule_set.default_version(), remaining);
    }

    Ok(evaluation)
}

/// First match service under one key whose rules all match; registers its
/// weights and returns its weight, or `None` when nothing under the key matched
fn match_key(
    candidates: &[Arc<MatchService>],
    attrs: &RequestAttributes,
    patterns: &CompiledPatterns,
    evaluation: &mut Evaluation,
) -> RoutingResult<Option<u32>> {
    for match_service in candidates {
        if !all_rules_match(match_service, attrs, patterns)? {
            continue;
        }

        add_weight(&mut evaluation.weights, &match_service.version, match_service.weight);
        if let Some(fallback) = &match_service.fallback_version {
            add_weight(&mut evaluation.fallback_weights, fallback, match_service.weight);
            evaluation.fallback_versions.insert(fallback.clone());
        }
        return Ok(Some(match_service.weight));
    }

    Ok(None)
}

fn add_weight(table: &mut WeightTable, version: &str, weight: u32) {
    let entry = table.entry(version.to_string()).or_insert(0);
    *entry = entry.saturating_add(weight);
}
