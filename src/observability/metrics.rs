//! Routing metrics.
//!
//! Recorded through the `metrics` facade; installing an exporter is up to the
//! host process. Without one every call here is a no-op.

use std::time::Duration;

use crate::core::error::RoutingError;

pub const DECISIONS_TOTAL: &str = "label_routing_decisions_total";
pub const ERRORS_TOTAL: &str = "label_routing_errors_total";
pub const WEIGHT_OVERFLOW_TOTAL: &str = "label_routing_weight_overflow_total";
pub const DECISION_DURATION_SECONDS: &str = "label_routing_decision_duration_seconds";

/// How a routing decision ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// Chosen from the matched versions
    Selected,
    /// Chosen from the fallback versions
    FallbackSelected,
    /// Nothing chosen
    None,
    /// Delegated to the ordinary algorithm
    Ordinary,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Selected => "selected",
            DecisionOutcome::FallbackSelected => "fallback_selected",
            DecisionOutcome::None => "none",
            DecisionOutcome::Ordinary => "ordinary",
        }
    }
}

pub fn record_decision(outcome: DecisionOutcome, duration: Duration) {
    metrics::counter!(DECISIONS_TOTAL, "outcome" => outcome.as_str()).increment(1);
    metrics::histogram!(DECISION_DURATION_SECONDS).record(duration.as_secs_f64());
}

/// Count an error swallowed at the decision boundary
pub fn record_error(error: &RoutingError) {
    metrics::counter!(ERRORS_TOTAL, "error_type" => error.error_type()).increment(1);
}

pub fn record_weight_overflow(service: &str) {
    metrics::counter!(WEIGHT_OVERFLOW_TOTAL, "service" => service.to_string()).increment(1);
}
