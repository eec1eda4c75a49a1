//! Adaptive quality controller.
//!
//! State machine over the coarse performance level with fixed quality
//! tables per level, cooldown/anti-jitter gating between automatic
//! changes, and a capped audit log of every optimization applied. The
//! controller is the exclusive owner of the quality settings; everything
//! else sees copies.

use crate::analyzer::PerformancePrediction;
use crate::config::ControllerConfig;
use crate::error::Fault;
use crate::providers::ErrorSink;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum retained optimization records.
const OPTIMIZATION_HISTORY_CAP: usize = 100;

/// Per-channel quality tier, ordered from fully off to full quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Off,
    Minimal,
    Low,
    Medium,
    High,
}

impl QualityLevel {
    /// One step down, saturating at `Off`.
    pub fn lowered(self) -> Self {
        match self {
            QualityLevel::High => QualityLevel::Medium,
            QualityLevel::Medium => QualityLevel::Low,
            QualityLevel::Low => QualityLevel::Minimal,
            QualityLevel::Minimal | QualityLevel::Off => QualityLevel::Off,
        }
    }
}

/// The authoritative quality snapshot, one tier per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualitySettings {
    pub render: QualityLevel,
    pub particle: QualityLevel,
    pub effect: QualityLevel,
    pub audio: QualityLevel,
}

impl QualitySettings {
    /// Fixed table mapping a performance level to all four channels.
    pub fn for_level(level: PerformanceLevel) -> Self {
        let tier = match level {
            PerformanceLevel::High => QualityLevel::High,
            PerformanceLevel::Medium => QualityLevel::Medium,
            PerformanceLevel::Low => QualityLevel::Low,
        };
        Self {
            render: tier,
            particle: tier,
            effect: tier,
            audio: tier,
        }
    }
}

/// Coarse performance tier driving the quality tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceLevel {
    High,
    Medium,
    Low,
}

impl PerformanceLevel {
    /// One step down, saturating at `Low`. Never skips a tier.
    pub fn degraded(self) -> Self {
        match self {
            PerformanceLevel::High => PerformanceLevel::Medium,
            PerformanceLevel::Medium | PerformanceLevel::Low => PerformanceLevel::Low,
        }
    }

    /// One step up, saturating at `High`. Never skips a tier.
    pub fn improved(self) -> Self {
        match self {
            PerformanceLevel::Low => PerformanceLevel::Medium,
            PerformanceLevel::Medium | PerformanceLevel::High => PerformanceLevel::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PerformanceLevel::High => "high",
            PerformanceLevel::Medium => "medium",
            PerformanceLevel::Low => "low",
        }
    }
}

impl FromStr for PerformanceLevel {
    type Err = Fault;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(PerformanceLevel::High),
            "medium" => Ok(PerformanceLevel::Medium),
            "low" => Ok(PerformanceLevel::Low),
            other => Err(Fault::UnknownPerformanceLevel(other.to_string())),
        }
    }
}

/// Observed per-tick metrics fed into adaptive optimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedMetrics {
    pub stability_score: f64,
    pub memory_pressure: f64,
}

impl Default for ObservedMetrics {
    fn default() -> Self {
        Self {
            stability_score: 1.0,
            memory_pressure: 0.0,
        }
    }
}

/// What kind of optimization produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationKind {
    Emergency,
    Degrade,
    Moderate,
    Improve,
    Proactive,
    AntiJitter,
    Manual,
}

/// Audit-trail entry; never read back for decisions except the latest.
#[derive(Debug, Clone)]
pub struct OptimizationRecord {
    pub at: Instant,
    pub level: PerformanceLevel,
    pub reason: String,
    pub kind: OptimizationKind,
}

/// Result of one optimization pass. A skipped or failed pass leaves the
/// prior state untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    pub optimized: bool,
    pub error: bool,
    pub level: PerformanceLevel,
    pub actions: Vec<String>,
    /// The host should consider hinting its allocator/GC when set.
    pub gc_hint: bool,
}

impl OptimizationOutcome {
    fn skipped(level: PerformanceLevel) -> Self {
        Self {
            optimized: false,
            error: false,
            level,
            actions: Vec::new(),
            gc_hint: false,
        }
    }

    fn failed(level: PerformanceLevel) -> Self {
        Self {
            optimized: false,
            error: true,
            level,
            actions: Vec::new(),
            gc_hint: false,
        }
    }
}

/// Gating state preventing rapid oscillation of automatic adjustments.
#[derive(Debug, Clone, Copy)]
pub struct AntiJitterState {
    last_adjustment: Option<Instant>,
    cooldown: Duration,
    minimum_stability_period: Duration,
}

impl AntiJitterState {
    fn new(cooldown: Duration, minimum_stability_period: Duration) -> Self {
        Self {
            last_adjustment: None,
            cooldown,
            minimum_stability_period,
        }
    }

    /// No two automatic changes may land within the cooldown.
    fn can_adjust(&self, now: Instant) -> bool {
        match self.last_adjustment {
            Some(last) => now.duration_since(last) >= self.cooldown,
            None => true,
        }
    }

    /// Improvements additionally require a sustained stable period.
    fn stable_long_enough(&self, now: Instant) -> bool {
        match self.last_adjustment {
            Some(last) => now.duration_since(last) >= self.minimum_stability_period,
            None => true,
        }
    }

    fn record_adjustment(&mut self, now: Instant) {
        self.last_adjustment = Some(now);
    }
}

/// Counters mirrored into the diagnostic snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControllerCounters {
    pub total_adjustments: u64,
    pub degrades: u64,
    pub improvements: u64,
    pub emergencies: u64,
}

/// Read-only controller snapshot for diagnostics/UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    pub level: PerformanceLevel,
    pub settings: QualitySettings,
    pub adaptive_mode: bool,
    pub counters: ControllerCounters,
}

/// Quality actuator for the frame governor.
pub struct AdaptiveQualityController {
    level: PerformanceLevel,
    settings: QualitySettings,
    adaptive_mode: bool,
    anti_jitter: AntiJitterState,
    history: VecDeque<OptimizationRecord>,
    counters: ControllerCounters,
    error_sink: Box<dyn ErrorSink>,
}

impl AdaptiveQualityController {
    pub fn new(config: &ControllerConfig, error_sink: Box<dyn ErrorSink>) -> Self {
        let level = config.initial_level;
        Self {
            level,
            settings: QualitySettings::for_level(level),
            adaptive_mode: config.adaptive_mode,
            anti_jitter: AntiJitterState::new(
                Duration::from_millis(config.cooldown_ms),
                Duration::from_millis(config.minimum_stability_period_ms),
            ),
            history: VecDeque::new(),
            counters: ControllerCounters::default(),
            error_sink,
        }
    }

    pub fn level(&self) -> PerformanceLevel {
        self.level
    }

    /// Read-only copy of the authoritative quality settings.
    pub fn settings(&self) -> QualitySettings {
        self.settings
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            level: self.level,
            settings: self.settings,
            adaptive_mode: self.adaptive_mode,
            counters: self.counters,
        }
    }

    pub fn set_adaptive_mode(&mut self, enabled: bool) {
        self.adaptive_mode = enabled;
        info!(enabled, "adaptive mode changed");
    }

    pub fn adaptive_mode(&self) -> bool {
        self.adaptive_mode
    }

    pub fn optimization_history(&self) -> impl Iterator<Item = &OptimizationRecord> {
        self.history.iter()
    }

    pub fn last_optimization(&self) -> Option<&OptimizationRecord> {
        self.history.back()
    }

    /// React to observed metrics. First matching branch wins; every branch
    /// that mutates state stamps the anti-jitter clock and appends an
    /// audit record.
    pub fn perform_adaptive_optimization(&mut self, metrics: &ObservedMetrics) -> OptimizationOutcome {
        self.perform_adaptive_optimization_at(metrics, Instant::now())
    }

    /// Adaptive optimization with an explicit timestamp (for testing).
    pub fn perform_adaptive_optimization_at(
        &mut self,
        metrics: &ObservedMetrics,
        now: Instant,
    ) -> OptimizationOutcome {
        if !metrics.stability_score.is_finite() || !metrics.memory_pressure.is_finite() {
            self.error_sink.log_error(
                "controller.perform_adaptive_optimization",
                &Fault::NonFiniteValue {
                    context: "observed metrics",
                    value: metrics.stability_score,
                },
            );
            return OptimizationOutcome::failed(self.level);
        }
        if !self.adaptive_mode {
            return OptimizationOutcome::skipped(self.level);
        }
        if !self.anti_jitter.can_adjust(now) {
            debug!("adaptive optimization skipped, cooldown active");
            return OptimizationOutcome::skipped(self.level);
        }

        if metrics.memory_pressure > 0.9 {
            return self.apply_emergency_optimization(now);
        }
        if metrics.stability_score < 0.3 {
            return self.degrade_performance_at(now, "stability critical");
        }
        if metrics.stability_score < 0.6 || metrics.memory_pressure > 0.8 {
            return self.apply_moderate_optimization(now);
        }
        if metrics.stability_score > 0.8 && metrics.memory_pressure < 0.4 {
            return self.consider_performance_improvement(now);
        }

        OptimizationOutcome::skipped(self.level)
    }

    /// Act on predicted rather than observed risk. Multiple triggers
    /// compose within one call; all applied actions are logged together.
    pub fn perform_proactive_optimization(
        &mut self,
        prediction: &PerformancePrediction,
    ) -> OptimizationOutcome {
        self.perform_proactive_optimization_at(prediction, Instant::now())
    }

    /// Proactive optimization with an explicit timestamp (for testing).
    pub fn perform_proactive_optimization_at(
        &mut self,
        prediction: &PerformancePrediction,
        now: Instant,
    ) -> OptimizationOutcome {
        if !prediction.overall_risk.is_finite() {
            self.error_sink.log_error(
                "controller.perform_proactive_optimization",
                &Fault::NonFiniteValue {
                    context: "prediction",
                    value: prediction.overall_risk,
                },
            );
            return OptimizationOutcome::failed(self.level);
        }
        if !self.adaptive_mode || !self.anti_jitter.can_adjust(now) {
            return OptimizationOutcome::skipped(self.level);
        }

        let mut actions = Vec::new();
        let mut gc_hint = false;

        if prediction.memory_risk > 0.7 {
            self.settings.particle = QualityLevel::Low.min(self.settings.particle);
            gc_hint = true;
            actions.push("proactive_memory_cleanup".to_string());
        }

        if prediction.degradation_risk > 0.8 {
            let degraded = self.level.degraded();
            if degraded != self.level {
                self.transition_to(degraded);
                self.counters.degrades += 1;
                actions.push("aggressive_degrade".to_string());
            }
        } else if prediction.degradation_risk > 0.6 {
            let lowered = self.settings.particle.lowered();
            if lowered != self.settings.particle {
                self.settings.particle = lowered;
                actions.push("moderate_degrade".to_string());
            }
        }

        if prediction.next_frame_stability < 0.4 {
            self.settings.render = self.settings.render.lowered();
            self.settings.effect = self.settings.effect.lowered();
            actions.push("frame_stabilization".to_string());
        }

        if actions.is_empty() {
            return OptimizationOutcome::skipped(self.level);
        }

        self.anti_jitter.record_adjustment(now);
        self.counters.total_adjustments += 1;
        self.push_record(now, actions.join(","), OptimizationKind::Proactive);
        info!(?actions, level = self.level.as_str(), "proactive optimization applied");

        OptimizationOutcome {
            optimized: true,
            error: false,
            level: self.level,
            actions,
            gc_hint,
        }
    }

    /// Replace the quality settings atomically from the level's fixed
    /// table. Always succeeds for a parsed level; string validation lives
    /// in [`PerformanceLevel::from_str`].
    pub fn set_performance_level(&mut self, level: PerformanceLevel) -> bool {
        let previous = self.level;
        self.transition_to(level);
        self.push_record(
            Instant::now(),
            format!("manual change from {}", previous.as_str()),
            OptimizationKind::Manual,
        );
        info!(
            from = previous.as_str(),
            to = level.as_str(),
            "performance level set"
        );
        true
    }

    /// Clamp quality channels downward in response to external jitter
    /// (normalized 0-1). Never moves the performance level.
    pub fn apply_anti_jitter_measures(&mut self, jitter_level: f64) -> OptimizationOutcome {
        self.apply_anti_jitter_measures_at(jitter_level, Instant::now())
    }

    /// Anti-jitter with an explicit timestamp (for testing).
    pub fn apply_anti_jitter_measures_at(
        &mut self,
        jitter_level: f64,
        now: Instant,
    ) -> OptimizationOutcome {
        if !jitter_level.is_finite() {
            self.error_sink.log_error(
                "controller.apply_anti_jitter_measures",
                &Fault::NonFiniteValue {
                    context: "jitter level",
                    value: jitter_level,
                },
            );
            return OptimizationOutcome::failed(self.level);
        }
        if jitter_level < 0.3 || !self.anti_jitter.can_adjust(now) {
            return OptimizationOutcome::skipped(self.level);
        }

        let action = if jitter_level >= 0.8 {
            self.settings.particle = self.settings.particle.lowered().lowered();
            self.settings.effect = self.settings.effect.lowered().lowered();
            "aggressive_stabilization"
        } else if jitter_level >= 0.5 {
            self.settings.particle = self.settings.particle.lowered();
            self.settings.effect = self.settings.effect.lowered();
            "moderate_stabilization"
        } else {
            self.settings.particle = self.settings.particle.lowered();
            "light_stabilization"
        };

        self.anti_jitter.record_adjustment(now);
        self.counters.total_adjustments += 1;
        self.push_record(now, format!("jitter {:.2}", jitter_level), OptimizationKind::AntiJitter);
        info!(jitter_level, action, "anti-jitter measures applied");

        OptimizationOutcome {
            optimized: true,
            error: false,
            level: self.level,
            actions: vec![action.to_string()],
            gc_hint: false,
        }
    }

    /// Clear the audit log and gating state; level and settings persist.
    pub fn reset(&mut self) {
        self.history.clear();
        self.counters = ControllerCounters::default();
        self.anti_jitter.last_adjustment = None;
    }

    fn apply_emergency_optimization(&mut self, now: Instant) -> OptimizationOutcome {
        // The one path allowed to skip tiers: straight to Low.
        self.transition_to(PerformanceLevel::Low);
        self.settings.particle = QualityLevel::Off;
        self.settings.effect = QualityLevel::Minimal;
        self.anti_jitter.record_adjustment(now);
        self.counters.total_adjustments += 1;
        self.counters.emergencies += 1;
        self.push_record(now, "memory pressure critical".to_string(), OptimizationKind::Emergency);
        warn!("emergency optimization: forced low level, particles off");

        OptimizationOutcome {
            optimized: true,
            error: false,
            level: self.level,
            actions: vec![
                "emergency_level_low".to_string(),
                "particles_off".to_string(),
                "effects_minimal".to_string(),
            ],
            gc_hint: true,
        }
    }

    fn degrade_performance_at(&mut self, now: Instant, reason: &str) -> OptimizationOutcome {
        let degraded = self.level.degraded();
        if degraded == self.level {
            return OptimizationOutcome::skipped(self.level);
        }
        self.transition_to(degraded);
        self.anti_jitter.record_adjustment(now);
        self.counters.total_adjustments += 1;
        self.counters.degrades += 1;
        self.push_record(now, reason.to_string(), OptimizationKind::Degrade);
        info!(level = self.level.as_str(), reason, "performance degraded");

        OptimizationOutcome {
            optimized: true,
            error: false,
            level: self.level,
            actions: vec!["degrade_level".to_string()],
            gc_hint: false,
        }
    }

    fn apply_moderate_optimization(&mut self, now: Instant) -> OptimizationOutcome {
        let lowered = self.settings.particle.lowered();
        if lowered == self.settings.particle {
            return OptimizationOutcome::skipped(self.level);
        }
        self.settings.particle = lowered;
        self.anti_jitter.record_adjustment(now);
        self.counters.total_adjustments += 1;
        self.push_record(now, "stability below target".to_string(), OptimizationKind::Moderate);
        info!(particle = ?self.settings.particle, "moderate optimization: particle tier lowered");

        OptimizationOutcome {
            optimized: true,
            error: false,
            level: self.level,
            actions: vec!["particle_step_down".to_string()],
            gc_hint: false,
        }
    }

    fn consider_performance_improvement(&mut self, now: Instant) -> OptimizationOutcome {
        if !self.anti_jitter.stable_long_enough(now) {
            debug!("improvement deferred, stability period not met");
            return OptimizationOutcome::skipped(self.level);
        }
        let improved = self.level.improved();
        if improved == self.level {
            return OptimizationOutcome::skipped(self.level);
        }
        self.transition_to(improved);
        self.anti_jitter.record_adjustment(now);
        self.counters.total_adjustments += 1;
        self.counters.improvements += 1;
        self.push_record(now, "sustained stability".to_string(), OptimizationKind::Improve);
        info!(level = self.level.as_str(), "performance improved");

        OptimizationOutcome {
            optimized: true,
            error: false,
            level: self.level,
            actions: vec!["improve_level".to_string()],
            gc_hint: false,
        }
    }

    fn transition_to(&mut self, level: PerformanceLevel) {
        self.level = level;
        self.settings = QualitySettings::for_level(level);
    }

    fn push_record(&mut self, at: Instant, reason: String, kind: OptimizationKind) {
        if self.history.len() >= OPTIMIZATION_HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(OptimizationRecord {
            at,
            level: self.level,
            reason,
            kind,
        });
    }
}
