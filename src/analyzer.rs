//! Frame performance analyzer.
//!
//! Ingests one frame-time sample per rendered frame, keeps a bounded
//! history, and derives variance, a stability score, a least-squares trend
//! and a risk-weighted prediction of impending degradation. This is a
//! monitoring component: it must never destabilize the render loop it
//! watches, so every public call is total and fail-soft.

use crate::config::AnalyzerConfig;
use crate::error::Fault;
use crate::providers::{
    ErrorSink, MemoryMetrics, MemoryMetricsProvider, MemoryTrend, RenderingMetrics,
    RenderingMetricsProvider,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Direction of the frame-time trend over the recent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Stable,
    Improving,
    Degrading,
    InsufficientData,
    Unknown,
}

/// Stability metrics derived from the frame-time history. Recomputed on
/// every call, never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StabilityMetrics {
    /// Population variance of the buffered frame times, in ms².
    pub variance: f64,
    /// Normalized [0, 1] consistency score; 1.0 is perfectly smooth.
    pub stability_score: f64,
    pub trend: Trend,
    /// Confidence in the score, [0, 1]; grows with sample count.
    pub confidence: f64,
}

impl StabilityMetrics {
    /// Conservative result returned when a computation fault is caught.
    fn neutral(variance: f64) -> Self {
        Self {
            variance,
            stability_score: 0.5,
            trend: Trend::Unknown,
            confidence: 0.0,
        }
    }
}

/// Risk-weighted forecast of near-term performance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformancePrediction {
    /// Expected stability of the next frames, [0, 1].
    pub next_frame_stability: f64,
    pub memory_risk: f64,
    pub degradation_risk: f64,
    /// `max(memory_risk, degradation_risk, 1 - next_frame_stability)`.
    pub overall_risk: f64,
    pub recommendations: Vec<String>,
}

/// Read-only analyzer snapshot for diagnostics/UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzerStats {
    pub samples: usize,
    pub average_frame_time_ms: f64,
    pub variance: f64,
    pub stability_score: f64,
    pub trend: Trend,
    pub estimated_fps: f64,
}

/// Bounded FIFO of frame-time samples. Oldest sample is evicted on
/// overflow, so the buffer always holds the most recent `capacity`
/// insertions.
#[derive(Debug)]
pub struct FrameTimeHistory {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl FrameTimeHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, time_ms: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(time_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Mean of all buffered samples, 0.0 when empty.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Population variance of all buffered samples, 0.0 below 2 samples.
    pub fn variance(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let mean = self.average();
        self.samples
            .iter()
            .map(|s| (s - mean).powi(2))
            .sum::<f64>()
            / self.samples.len() as f64
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    /// The most recent `window` samples, oldest first.
    fn tail(&self, window: usize) -> impl Iterator<Item = f64> + '_ {
        let skip = self.samples.len().saturating_sub(window);
        self.samples.iter().skip(skip).copied()
    }
}

/// Closed-loop frame timing monitor. Owns the frame-time history
/// exclusively; everything it hands out is a copy.
pub struct FramePerformanceAnalyzer {
    config: AnalyzerConfig,
    history: FrameTimeHistory,
    memory: Box<dyn MemoryMetricsProvider>,
    rendering: Box<dyn RenderingMetricsProvider>,
    error_sink: Box<dyn ErrorSink>,
}

impl FramePerformanceAnalyzer {
    pub fn new(
        config: AnalyzerConfig,
        memory: Box<dyn MemoryMetricsProvider>,
        rendering: Box<dyn RenderingMetricsProvider>,
        error_sink: Box<dyn ErrorSink>,
    ) -> Self {
        let history = FrameTimeHistory::with_capacity(config.max_history);
        Self {
            config,
            history,
            memory,
            rendering,
            error_sink,
        }
    }

    /// Record one frame duration. Always succeeds; a non-finite sample is
    /// reported to the error sink and dropped instead of poisoning the
    /// statistics.
    pub fn record_frame_time(&mut self, time_ms: f64) {
        if !time_ms.is_finite() || time_ms < 0.0 {
            self.error_sink.log_error(
                "analyzer.record_frame_time",
                &Fault::NonFiniteValue {
                    context: "frame time sample",
                    value: time_ms,
                },
            );
            return;
        }
        self.history.push(time_ms);
    }

    pub fn calculate_variance(&self) -> f64 {
        self.history.variance()
    }

    /// Derive stability metrics from the current history.
    ///
    /// Below the minimum sample count this fails open: the render loop is
    /// assumed stable until there is evidence otherwise.
    pub fn analyze_frame_stability(&self) -> StabilityMetrics {
        let variance = self.history.variance();
        if !variance.is_finite() {
            self.error_sink.log_error(
                "analyzer.analyze_frame_stability",
                &Fault::NonFiniteValue {
                    context: "frame time variance",
                    value: variance,
                },
            );
            return StabilityMetrics::neutral(0.0);
        }

        let frame_count = self.history.len();
        if frame_count < self.config.min_samples {
            return StabilityMetrics {
                variance,
                stability_score: 1.0,
                trend: Trend::InsufficientData,
                confidence: 0.1,
            };
        }

        let stability_score = (1.0 - variance / self.config.max_acceptable_variance).max(0.0);
        let trend = self.calculate_performance_trend();
        let sample_confidence = (frame_count as f64 / 60.0).min(1.0);
        let confidence = sample_confidence * if stability_score > 0.5 { 1.0 } else { 0.5 };

        StabilityMetrics {
            variance,
            stability_score,
            trend,
            confidence,
        }
    }

    /// Ordinary least-squares slope of frame time against sample index
    /// over the trailing trend window. A rising frame time is a degrading
    /// trend.
    pub fn calculate_performance_trend(&self) -> Trend {
        if self.history.len() < self.config.min_samples {
            return Trend::InsufficientData;
        }

        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_xx = 0.0;
        let mut n = 0.0;
        for (i, y) in self.history.tail(self.config.trend_window).enumerate() {
            let x = i as f64;
            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            sum_xx += x * x;
            n += 1.0;
        }

        let denominator = n * sum_xx - sum_x * sum_x;
        if denominator == 0.0 {
            return Trend::Unknown;
        }
        let slope = (n * sum_xy - sum_x * sum_y) / denominator;

        if slope.abs() < 0.01 {
            Trend::Stable
        } else if slope > 0.0 {
            Trend::Degrading
        } else {
            Trend::Improving
        }
    }

    /// Poll the injected providers and predict near-term performance risk.
    /// A failing provider is reported to the sink and replaced by its
    /// neutral substitute; the call itself never fails.
    pub fn predict_performance_issues(&self) -> PerformancePrediction {
        let memory = match self.memory.sample() {
            Ok(m) => m,
            Err(fault) => {
                self.error_sink
                    .log_error("analyzer.predict_performance_issues", &fault);
                MemoryMetrics::neutral()
            }
        };
        let rendering = match self.rendering.sample() {
            Ok(r) => r,
            Err(fault) => {
                self.error_sink
                    .log_error("analyzer.predict_performance_issues", &fault);
                RenderingMetrics::neutral()
            }
        };
        self.prediction_from(&memory, &rendering)
    }

    /// Pure prediction path for pre-sampled metrics.
    pub fn prediction_from(
        &self,
        memory: &MemoryMetrics,
        rendering: &RenderingMetrics,
    ) -> PerformancePrediction {
        let metrics = self.analyze_frame_stability();

        // Fixed weights: variance 0.4, trend 0.3, memory 0.3.
        let trend_component = match metrics.trend {
            Trend::Improving => 1.0,
            Trend::Stable => 0.8,
            Trend::Degrading => 0.3,
            Trend::InsufficientData | Trend::Unknown => 0.5,
        };
        let memory_component = (1.0 - memory.pressure).clamp(0.0, 1.0);
        let load_penalty = rendering.load.clamp(0.0, 1.0) * 0.1;
        let next_frame_stability = (metrics.stability_score * 0.4
            + trend_component * 0.3
            + memory_component * 0.3
            - load_penalty)
            .clamp(0.0, 1.0);

        let mut memory_risk = memory.pressure;
        memory_risk += match memory.trend {
            MemoryTrend::Stable => 0.0,
            MemoryTrend::Increasing => 0.2,
            MemoryTrend::Critical => 0.4,
        };
        if memory.available < 0.05 {
            memory_risk += 0.5;
        } else if memory.available < 0.1 {
            memory_risk += 0.3;
        }
        let memory_risk = memory_risk.clamp(0.0, 1.0);

        let mut degradation_risk = (1.0 - metrics.stability_score) + memory_risk * 0.5;
        if metrics.trend == Trend::Degrading {
            degradation_risk += 0.3;
        }
        if metrics.confidence < 0.5 {
            degradation_risk += 0.2;
        }
        let degradation_risk = degradation_risk.clamp(0.0, 1.0);

        let overall_risk = memory_risk
            .max(degradation_risk)
            .max(1.0 - next_frame_stability);

        let mut recommendations = Vec::new();
        if memory_risk > 0.7 {
            recommendations.push("schedule_memory_cleanup".to_string());
        }
        if degradation_risk > 0.6 {
            recommendations.push("reduce_quality".to_string());
        }
        if next_frame_stability < 0.4 {
            recommendations.push("stabilize_frame_pacing".to_string());
        }

        PerformancePrediction {
            next_frame_stability,
            memory_risk,
            degradation_risk,
            overall_risk,
            recommendations,
        }
    }

    /// Read-only snapshot for diagnostics and UI display.
    pub fn get_stats(&self) -> AnalyzerStats {
        let metrics = self.analyze_frame_stability();
        let average = self.history.average();
        let estimated_fps = if average > 0.0 { 1000.0 / average } else { 0.0 };
        AnalyzerStats {
            samples: self.history.len(),
            average_frame_time_ms: average,
            variance: metrics.variance,
            stability_score: metrics.stability_score,
            trend: metrics.trend,
            estimated_fps,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.history.len()
    }

    /// Clear the frame-time history.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}
