//! Process-wide metrics for agent-orchestra.
//!
//! A [`MetricsCollector`] owns its own `prometheus::Registry`, so tests
//! (and the gateway) construct isolated instances instead of touching a
//! global default registry.

mod collector;

pub use collector::MetricsCollector;
