//! Condition matching.
//!
//! Pure comparison predicates between a request value (the candidate) and the
//! value written in a rule (the pattern). A missing candidate never matches.
//!
//! Regex patterns are compiled once per rule set into [`CompiledPatterns`],
//! which lives and dies with that rule set.

use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;

use crate::config_error;
use crate::core::error::{RoutingError, RoutingResult};
use crate::routing::rule::{Condition, Rule};

/// Anchored regexes of one rule set, keyed by the pattern text as written
///
/// A pattern that fails to compile keeps its error, so every decision that
/// reaches the rule reports it.
#[derive(Debug, Clone, Default)]
pub struct CompiledPatterns {
    patterns: HashMap<String, Result<Regex, RoutingError>>,
}

impl CompiledPatterns {
    /// Compile the pattern of every regex rule in `rules`
    pub fn compile<'a, I>(rules: I) -> Self
    where
        I: IntoIterator<Item = &'a Rule>,
    {
        let mut patterns = HashMap::new();
        for rule in rules {
            if rule.condition == Condition::Regex && !patterns.contains_key(&rule.value) {
                patterns.insert(rule.value.clone(), anchored(&rule.value));
            }
        }
        Self { patterns }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.patterns.contains_key(pattern)
    }

    /// Errors of the patterns that failed to compile
    pub fn errors(&self) -> impl Iterator<Item = &RoutingError> {
        self.patterns.values().filter_map(|compiled| compiled.as_ref().err())
    }

    /// The compiled form of `pattern`; patterns not seen at build time are
    /// compiled on the spot and not kept
    pub fn regex(&self, pattern: &str) -> RoutingResult<Cow<'_, Regex>> {
        match self.patterns.get(pattern) {
            Some(Ok(regex)) => Ok(Cow::Borrowed(regex)),
            Some(Err(e)) => Err(e.clone()),
            None => anchored(pattern).map(Cow::Owned),
        }
    }
}

impl Condition {
    /// Test `candidate` against `pattern`
    ///
    /// Fails with a configuration error for an unsupported condition or an
    /// invalid regex, whether or not a candidate is present.
    pub fn matches(
        &self,
        candidate: Option<&str>,
        pattern: &str,
        patterns: &CompiledPatterns,
    ) -> RoutingResult<bool> {
        if let Condition::Unsupported(name) = self {
            return Err(config_error!("unsupported condition: {}", name));
        }

        let Some(candidate) = candidate else {
            if matches!(self, Condition::Regex) {
                patterns.regex(pattern)?;
            }
            return Ok(false);
        };

        let matched = match self {
            Condition::Exact | Condition::Equal => exact_match(candidate, pattern),
            Condition::Regex => regex_match(candidate, pattern, patterns)?,
            Condition::Prefix => prefix_match(candidate, pattern),
            Condition::Contain => contain_match(candidate, pattern),
            Condition::Greater => greater_match(candidate, pattern),
            Condition::Less => less_match(candidate, pattern),
            Condition::NotEqual => !exact_match(candidate, pattern),
            Condition::Unsupported(name) => {
                return Err(config_error!("unsupported condition: {}", name))
            }
        };

        Ok(matched)
    }
}

pub fn exact_match(candidate: &str, pattern: &str) -> bool {
    candidate == pattern
}

/// Whole-string regex match
pub fn regex_match(candidate: &str, pattern: &str, patterns: &CompiledPatterns) -> RoutingResult<bool> {
    Ok(patterns.regex(pattern)?.is_match(candidate))
}

pub fn prefix_match(candidate: &str, pattern: &str) -> bool {
    candidate.starts_with(pattern)
}

pub fn contain_match(candidate: &str, pattern: &str) -> bool {
    candidate.contains(pattern)
}

/// `candidate > pattern`, both parsed as numbers; non-numeric input never matches
pub fn greater_match(candidate: &str, pattern: &str) -> bool {
    match parse_pair(candidate, pattern) {
        Some((candidate, pattern)) => candidate > pattern,
        None => false,
    }
}

/// `candidate < pattern`, both parsed as numbers; non-numeric input never matches
pub fn less_match(candidate: &str, pattern: &str) -> bool {
    match parse_pair(candidate, pattern) {
        Some((candidate, pattern)) => candidate < pattern,
        None => false,
    }
}

fn parse_pair(candidate: &str, pattern: &str) -> Option<(f64, f64)> {
    let candidate = candidate.trim().parse::<f64>().ok()?;
    let pattern = pattern.trim().parse::<f64>().ok()?;
    Some((candidate, pattern))
}

fn anchored(pattern: &str) -> RoutingResult<Regex> {
    Ok(Regex::new(&format!("^(?:{})$", pattern))?)
}
