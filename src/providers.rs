//! Collaborator traits supplied by the host.
//!
//! The governor owns no probes of its own: memory pressure, rendering load
//! and error reporting are injected at construction. Hosts without a probe
//! plug in the neutral implementations, which report "no pressure" rather
//! than blocking or failing.

use crate::error::Fault;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Memory pressure trend as reported by the host's heap probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTrend {
    #[default]
    Stable,
    Increasing,
    Critical,
}

/// Snapshot of host memory state, all values normalized to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Fraction of the budget currently in use.
    pub pressure: f64,
    pub trend: MemoryTrend,
    /// Fraction of the budget still available.
    pub available: f64,
}

impl MemoryMetrics {
    /// Substitute used when the provider is unavailable: assume no pressure.
    pub fn neutral() -> Self {
        Self {
            pressure: 0.0,
            trend: MemoryTrend::Stable,
            available: 1.0,
        }
    }
}

/// Snapshot of rendering load, normalized to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderingMetrics {
    pub load: f64,
}

impl RenderingMetrics {
    pub fn neutral() -> Self {
        Self { load: 0.0 }
    }
}

/// Host-side memory probe, polled synchronously on demand.
pub trait MemoryMetricsProvider {
    fn sample(&self) -> Result<MemoryMetrics, Fault>;
}

/// Host-side rendering load probe, polled synchronously on demand.
pub trait RenderingMetricsProvider {
    fn sample(&self) -> Result<RenderingMetrics, Fault>;
}

/// Sink for caught internal faults. Nothing escapes the governor as a
/// panic or error; every caught fault is forwarded here instead.
pub trait ErrorSink {
    fn log_error(&self, context: &str, fault: &Fault);
}

/// Default sink that forwards faults to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn log_error(&self, context: &str, fault: &Fault) {
        error!(context, %fault, "frame governor fault");
    }
}

/// Provider for hosts without a heap probe.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralMemoryProvider;

impl MemoryMetricsProvider for NeutralMemoryProvider {
    fn sample(&self) -> Result<MemoryMetrics, Fault> {
        Ok(MemoryMetrics::neutral())
    }
}

/// Provider for hosts without a rendering load probe.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralRenderingProvider;

impl RenderingMetricsProvider for NeutralRenderingProvider {
    fn sample(&self) -> Result<RenderingMetrics, Fault> {
        Ok(RenderingMetrics::neutral())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_memory_reports_no_pressure() {
        let metrics = NeutralMemoryProvider.sample().unwrap();
        assert_eq!(metrics.pressure, 0.0);
        assert_eq!(metrics.trend, MemoryTrend::Stable);
        assert_eq!(metrics.available, 1.0);
    }

    #[test]
    fn memory_trend_serializes_lowercase() {
        let json = serde_json::to_string(&MemoryTrend::Increasing).unwrap();
        assert_eq!(json, "\"increasing\"");
    }
}
