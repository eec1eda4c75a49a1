//! Adaptive frame performance stabilization.
//!
//! A closed-loop controller for render loops: the [`analyzer`] watches
//! per-frame timing and derives stability, trend and risk metrics, the
//! [`controller`] actuates quality-tier changes under cooldown and
//! anti-jitter gating, and the [`integrator`] fuses an external frame
//! pacer's telemetry into zone classification and a longer-horizon
//! stability analysis.
//!
//! Everything runs synchronously inside the host's frame tick. The crate
//! owns no probes and no clock of its own: frame times, memory metrics
//! and pacer status are pushed or polled through the traits in
//! [`providers`], and every time-gated operation has an explicit-`Instant`
//! variant for deterministic tests.
//!
//! No public method panics or returns an error to the render loop. Caught
//! faults are forwarded to the injected [`providers::ErrorSink`] and the
//! call falls back to a conservative neutral result.

pub mod analyzer;
pub mod config;
pub mod controller;
pub mod error;
pub mod integrator;
pub mod providers;

pub use analyzer::{
    AnalyzerStats, FramePerformanceAnalyzer, PerformancePrediction, StabilityMetrics, Trend,
};
pub use config::{AnalyzerConfig, ControlConfig, ControllerConfig, IntegratorConfig};
pub use controller::{
    AdaptiveQualityController, ObservedMetrics, OptimizationOutcome, PerformanceLevel,
    QualityLevel, QualitySettings,
};
pub use error::{ConfigError, Fault};
pub use integrator::{
    ForceStabilizationResult, FrameStabilityAnalysis, IntegrationResult, PacerStatus,
    PerformanceZone, StabilizationMode, StabilizerIntegrator,
};
pub use providers::{
    ErrorSink, MemoryMetrics, MemoryMetricsProvider, MemoryTrend, NeutralMemoryProvider,
    NeutralRenderingProvider, RenderingMetrics, RenderingMetricsProvider, TracingSink,
};
