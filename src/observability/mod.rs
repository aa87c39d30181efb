// Structured logging
pub mod logging;

// Routing metrics
pub mod metrics;

pub use logging::init_logging;
pub use metrics::DecisionOutcome;
