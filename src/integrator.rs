//! Stabilizer integrator.
//!
//! Fuses the external frame pacer's status into the governor: zone
//! classification against fixed thresholds, jitter and FPS-sync
//! bookkeeping, a 5-second sliding-window stability analysis over the
//! fused history, and forced stabilization directives the controller
//! honors on its next cycle.

use crate::analyzer::Trend;
use crate::config::IntegratorConfig;
use crate::error::Fault;
use crate::providers::ErrorSink;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const PERFORMANCE_HISTORY_CAP: usize = 1000;
const ISSUE_HISTORY_CAP: usize = 500;
const ANALYSIS_WINDOW: Duration = Duration::from_millis(5000);
const ISSUE_WINDOW: Duration = Duration::from_millis(10_000);

/// How hard forced stabilization is allowed to push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilizationMode {
    Aggressive,
    Balanced,
    Conservative,
}

impl StabilizationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StabilizationMode::Aggressive => "aggressive",
            StabilizationMode::Balanced => "balanced",
            StabilizationMode::Conservative => "conservative",
        }
    }
}

impl fmt::Display for StabilizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StabilizationMode {
    type Err = Fault;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aggressive" => Ok(StabilizationMode::Aggressive),
            "balanced" => Ok(StabilizationMode::Balanced),
            "conservative" => Ok(StabilizationMode::Conservative),
            other => Err(Fault::UnknownStabilizationMode(other.to_string())),
        }
    }
}

/// Coarse stability classification of a pacer sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceZone {
    Optimal,
    Good,
    Poor,
    Critical,
}

impl PerformanceZone {
    pub fn as_str(self) -> &'static str {
        match self {
            PerformanceZone::Optimal => "optimal",
            PerformanceZone::Good => "good",
            PerformanceZone::Poor => "poor",
            PerformanceZone::Critical => "critical",
        }
    }
}

/// Thresholds a sample must satisfy to land in a zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneThresholds {
    pub min_stability: f64,
    /// Jitter on the pacer's 0-10 scale.
    pub max_jitter: f64,
}

/// The fixed zone table. First zone satisfied wins, checked in
/// optimal, good, poor, critical order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceZones {
    pub optimal: ZoneThresholds,
    pub good: ZoneThresholds,
    pub poor: ZoneThresholds,
    pub critical: ZoneThresholds,
}

impl Default for PerformanceZones {
    fn default() -> Self {
        Self {
            optimal: ZoneThresholds {
                min_stability: 0.9,
                max_jitter: 3.0,
            },
            good: ZoneThresholds {
                min_stability: 0.7,
                max_jitter: 5.0,
            },
            poor: ZoneThresholds {
                min_stability: 0.5,
                max_jitter: 7.0,
            },
            critical: ZoneThresholds {
                min_stability: 0.0,
                max_jitter: 10.0,
            },
        }
    }
}

impl PerformanceZones {
    /// Pure classification of a stability/jitter pair.
    pub fn classify(&self, stability: f64, jitter: f64) -> PerformanceZone {
        let table = [
            (PerformanceZone::Optimal, self.optimal),
            (PerformanceZone::Good, self.good),
            (PerformanceZone::Poor, self.poor),
        ];
        for (zone, thresholds) in table {
            if stability >= thresholds.min_stability && jitter <= thresholds.max_jitter {
                return zone;
            }
        }
        PerformanceZone::Critical
    }
}

/// Timing block of the pacer status.
#[derive(Debug, Clone, PartialEq)]
pub struct PacerTiming {
    pub variance: f64,
    pub stability_score: f64,
    /// 0-10 scale.
    pub jitter_level: f64,
    pub smoothness_index: f64,
    pub consistency_rating: String,
}

/// Adaptive block of the pacer status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacerAdaptive {
    pub performance_zone: PerformanceZone,
    pub confidence_level: f64,
    pub current_target_fps: u32,
}

/// Pacing block of the pacer status.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PacerPacing {
    pub vsync_detected: bool,
    pub tearing_risk: f64,
}

/// Recommendation kinds the pacer may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacerRecommendationKind {
    ReduceQuality,
    TargetFpsAdjustment,
    FramePacing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PacerRecommendation {
    pub kind: PacerRecommendationKind,
    pub description: Option<String>,
}

/// Full status object supplied by the external pacer, consumed verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct PacerStatus {
    pub timing: PacerTiming,
    pub adaptive: PacerAdaptive,
    pub recommendations: Vec<PacerRecommendation>,
    pub pacing: PacerPacing,
}

/// Actions taken during one integration pass, grouped by source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrationActions {
    pub zone: Vec<String>,
    pub jitter: Vec<String>,
    pub fps: Vec<String>,
    pub stabilization: Vec<String>,
}

/// Result of one integration pass.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationResult {
    pub integrated: bool,
    pub error: bool,
    pub reason: Option<&'static str>,
    pub actions: IntegrationActions,
    pub current_zone: Option<PerformanceZone>,
    pub stability_score: Option<f64>,
    pub jitter_level: Option<f64>,
}

impl IntegrationResult {
    fn disabled() -> Self {
        Self {
            integrated: false,
            error: false,
            reason: Some("integration disabled"),
            actions: IntegrationActions::default(),
            current_zone: None,
            stability_score: None,
            jitter_level: None,
        }
    }

    fn failed() -> Self {
        Self {
            integrated: false,
            error: true,
            reason: None,
            actions: IntegrationActions::default(),
            current_zone: None,
            stability_score: None,
            jitter_level: None,
        }
    }
}

/// Latest pacer insight snapshot, retained until the next integration.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizerInsights {
    pub zone: PerformanceZone,
    pub confidence_level: f64,
    pub jitter_level: f64,
    pub smoothness_index: f64,
    pub consistency_rating: String,
    pub vsync_detected: bool,
    pub tearing_risk: f64,
    pub at: Instant,
}

/// One fused sample in the sliding-window history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceHistoryEntry {
    pub at: Instant,
    pub stability_score: f64,
    pub variance: f64,
    pub jitter_level: f64,
    pub zone: PerformanceZone,
    pub confidence_level: f64,
}

/// Issue kinds recorded by zone and jitter handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    CriticalStabilityZone,
    PoorStabilityZone,
    HighFrameJitter,
}

impl IssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::CriticalStabilityZone => "critical_stability_zone",
            IssueKind::PoorStabilityZone => "poor_stability_zone",
            IssueKind::HighFrameJitter => "high_frame_jitter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IssueRecord {
    pub kind: IssueKind,
    pub at: Instant,
    pub stability_score: f64,
    pub jitter_level: f64,
}

/// Aggregate stability over the analysis window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverallStability {
    pub score: f64,
    pub confidence: f64,
    pub consistency: f64,
    pub jitter_score: f64,
    pub variability: f64,
}

impl OverallStability {
    fn neutral() -> Self {
        Self {
            score: 0.5,
            confidence: 0.0,
            consistency: 0.5,
            jitter_score: 0.5,
            variability: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityTrend {
    pub direction: Trend,
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    RecurringIssue,
    ChronicInstability,
}

/// A detected problem area in the recent window.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemArea {
    pub kind: ProblemKind,
    pub description: String,
    pub severity: Severity,
    pub count: Option<usize>,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationSeverity {
    Critical,
    Warning,
    Maintenance,
    Info,
}

/// Ranked textual recommendation attached to an analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityRecommendation {
    pub severity: RecommendationSeverity,
    pub action: &'static str,
    pub description: String,
}

/// Near-term outlook from comparing recent and older window means.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityPrediction {
    pub confidence: f64,
    pub prediction: Trend,
    pub change: Option<f64>,
}

/// Full output of [`StabilizerIntegrator::get_frame_stability_analysis`].
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStabilityAnalysis {
    pub overall: OverallStability,
    pub trend: StabilityTrend,
    pub problems: Vec<ProblemArea>,
    pub prediction: StabilityPrediction,
    pub recommendations: Vec<StabilityRecommendation>,
    pub insights: Option<StabilizerInsights>,
}

/// Fixed per-mode knobs for forced stabilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityReduction {
    Maximum,
    Moderate,
    Minimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameTargetAdjustment {
    Dynamic,
    Adaptive,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterTolerance {
    Minimal,
    Normal,
    Relaxed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeSettings {
    pub quality_reduction: QualityReduction,
    pub frame_target_adjustment: FrameTargetAdjustment,
    pub jitter_tolerance: JitterTolerance,
}

impl ModeSettings {
    pub fn for_mode(mode: StabilizationMode) -> Self {
        match mode {
            StabilizationMode::Aggressive => Self {
                quality_reduction: QualityReduction::Maximum,
                frame_target_adjustment: FrameTargetAdjustment::Dynamic,
                jitter_tolerance: JitterTolerance::Minimal,
            },
            StabilizationMode::Balanced => Self {
                quality_reduction: QualityReduction::Moderate,
                frame_target_adjustment: FrameTargetAdjustment::Adaptive,
                jitter_tolerance: JitterTolerance::Normal,
            },
            StabilizationMode::Conservative => Self {
                quality_reduction: QualityReduction::Minimal,
                frame_target_adjustment: FrameTargetAdjustment::Static,
                jitter_tolerance: JitterTolerance::Relaxed,
            },
        }
    }
}

/// Result of a forced stabilization directive.
#[derive(Debug, Clone, PartialEq)]
pub struct ForceStabilizationResult {
    pub forced: bool,
    pub error: bool,
    pub target_fps: u32,
    pub mode: StabilizationMode,
    pub previous_target: u32,
    pub previous_mode: StabilizationMode,
    pub actions: Vec<String>,
    pub settings: ModeSettings,
}

/// The active stabilization directive the controller reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StabilizationControl {
    pub target_fps: u32,
    pub target_frame_time_ms: f64,
    pub force_stabilization: bool,
    pub mode: StabilizationMode,
}

/// Read-only settings snapshot for diagnostics/UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntegrationSettings {
    pub enabled: bool,
    pub confidence_threshold: f64,
    pub control: StabilizationControl,
    pub zones: PerformanceZones,
}

/// External signal fusion for the frame governor.
pub struct StabilizerIntegrator {
    enabled: bool,
    confidence_threshold: f64,
    control: StabilizationControl,
    zones: PerformanceZones,
    latest_variance: f64,
    latest_stability: f64,
    insights: Option<StabilizerInsights>,
    performance_history: VecDeque<PerformanceHistoryEntry>,
    issue_history: VecDeque<IssueRecord>,
    error_sink: Box<dyn ErrorSink>,
}

impl StabilizerIntegrator {
    pub fn new(config: &IntegratorConfig, error_sink: Box<dyn ErrorSink>) -> Self {
        Self {
            enabled: config.enabled,
            confidence_threshold: config.confidence_threshold,
            control: StabilizationControl {
                target_fps: config.target_fps,
                target_frame_time_ms: 1000.0 / config.target_fps as f64,
                force_stabilization: false,
                mode: config.mode,
            },
            zones: PerformanceZones::default(),
            latest_variance: 0.0,
            latest_stability: 1.0,
            insights: None,
            performance_history: VecDeque::new(),
            issue_history: VecDeque::new(),
            error_sink,
        }
    }

    pub fn control(&self) -> StabilizationControl {
        self.control
    }

    pub fn get_integration_settings(&self) -> IntegrationSettings {
        IntegrationSettings {
            enabled: self.enabled,
            confidence_threshold: self.confidence_threshold,
            control: self.control,
            zones: self.zones,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        info!(enabled, "stabilizer integration toggled");
    }

    /// Merge one pacer status into the governor's state.
    pub fn integrate_stabilizer_recommendations(&mut self, status: &PacerStatus) -> IntegrationResult {
        self.integrate_stabilizer_recommendations_at(status, Instant::now())
    }

    /// Integration with an explicit timestamp (for testing).
    pub fn integrate_stabilizer_recommendations_at(
        &mut self,
        status: &PacerStatus,
        now: Instant,
    ) -> IntegrationResult {
        if !self.enabled {
            return IntegrationResult::disabled();
        }

        let timing = &status.timing;
        if !timing.variance.is_finite()
            || !timing.stability_score.is_finite()
            || !timing.jitter_level.is_finite()
        {
            self.error_sink.log_error(
                "integrator.integrate_stabilizer_recommendations",
                &Fault::NonFiniteValue {
                    context: "pacer timing",
                    value: timing.variance,
                },
            );
            return IntegrationResult::failed();
        }

        self.update_integrated_stats(timing, &status.adaptive, now);

        let actions = IntegrationActions {
            zone: self.handle_performance_zone(&status.adaptive, timing, now),
            jitter: self.handle_jitter_control(timing, now),
            fps: self.handle_adaptive_fps_sync(&status.adaptive),
            stabilization: self.process_recommendations(&status.adaptive, &status.recommendations),
        };

        self.store_insights(status, now);

        IntegrationResult {
            integrated: true,
            error: false,
            reason: None,
            actions,
            current_zone: Some(status.adaptive.performance_zone),
            stability_score: Some(timing.stability_score),
            jitter_level: Some(timing.jitter_level),
        }
    }

    /// Windowed stability analysis over the fused history.
    pub fn get_frame_stability_analysis(&self) -> FrameStabilityAnalysis {
        self.get_frame_stability_analysis_at(Instant::now())
    }

    /// Analysis with an explicit timestamp (for testing).
    pub fn get_frame_stability_analysis_at(&self, now: Instant) -> FrameStabilityAnalysis {
        let window: Vec<&PerformanceHistoryEntry> = self.recent_history(ANALYSIS_WINDOW, now);

        let overall = Self::calculate_overall_stability(&window);
        let trend = Self::calculate_stability_trend(&window);
        let problems = self.identify_problem_areas(&window, now);
        let prediction = Self::predict_stability_trend(&window);
        let recommendations = Self::generate_recommendations(&overall, &trend, &problems);

        FrameStabilityAnalysis {
            overall,
            trend,
            problems,
            prediction,
            recommendations,
            insights: self.insights.clone(),
        }
    }

    /// Override the stabilization directive. Quality settings themselves
    /// are untouched; the controller honors this on its next cycle.
    pub fn force_frame_stabilization(
        &mut self,
        target_fps: u32,
        mode: StabilizationMode,
    ) -> ForceStabilizationResult {
        if target_fps == 0 {
            self.error_sink.log_error(
                "integrator.force_frame_stabilization",
                &Fault::InvalidTargetFps,
            );
            return ForceStabilizationResult {
                forced: false,
                error: true,
                target_fps,
                mode,
                previous_target: self.control.target_fps,
                previous_mode: self.control.mode,
                actions: Vec::new(),
                settings: ModeSettings::for_mode(mode),
            };
        }

        let previous_target = self.control.target_fps;
        let previous_mode = self.control.mode;

        self.control.target_fps = target_fps;
        self.control.target_frame_time_ms = 1000.0 / target_fps as f64;
        self.control.mode = mode;
        self.control.force_stabilization = true;

        let settings = ModeSettings::for_mode(mode);
        let actions = vec![
            format!("force_stabilization_{}", mode),
            format!("target_fps_set_{}", target_fps),
        ];

        info!(
            target_fps,
            mode = mode.as_str(),
            previous_target,
            previous_mode = previous_mode.as_str(),
            "frame stabilization forced"
        );

        ForceStabilizationResult {
            forced: true,
            error: false,
            target_fps,
            mode,
            previous_target,
            previous_mode,
            actions,
            settings,
        }
    }

    /// Clear the directive flag once the controller has honored it.
    pub fn acknowledge_forced_stabilization(&mut self) {
        self.control.force_stabilization = false;
    }

    /// Clear histories and insights; the control directive persists.
    pub fn reset(&mut self) {
        self.performance_history.clear();
        self.issue_history.clear();
        self.insights = None;
        self.latest_variance = 0.0;
        self.latest_stability = 1.0;
    }

    fn update_integrated_stats(&mut self, timing: &PacerTiming, adaptive: &PacerAdaptive, now: Instant) {
        self.latest_variance = timing.variance;
        self.latest_stability = timing.stability_score;

        if self.performance_history.len() >= PERFORMANCE_HISTORY_CAP {
            self.performance_history.pop_front();
        }
        self.performance_history.push_back(PerformanceHistoryEntry {
            at: now,
            stability_score: timing.stability_score,
            variance: timing.variance,
            jitter_level: timing.jitter_level,
            zone: adaptive.performance_zone,
            confidence_level: adaptive.confidence_level,
        });
    }

    fn handle_performance_zone(
        &mut self,
        adaptive: &PacerAdaptive,
        timing: &PacerTiming,
        now: Instant,
    ) -> Vec<String> {
        let mut actions = Vec::new();
        match adaptive.performance_zone {
            PerformanceZone::Critical => {
                actions.push("critical_zone_entered".to_string());
                self.record_issue(IssueKind::CriticalStabilityZone, timing, now);
                warn!(
                    stability = timing.stability_score,
                    variance = timing.variance,
                    "critical performance zone"
                );
            }
            PerformanceZone::Poor => {
                actions.push("poor_zone_entered".to_string());
                self.record_issue(IssueKind::PoorStabilityZone, timing, now);
            }
            PerformanceZone::Optimal => {
                if timing.stability_score > 0.9 {
                    actions.push("optimal_performance_detected".to_string());
                }
            }
            PerformanceZone::Good => {}
        }
        actions
    }

    fn handle_jitter_control(&mut self, timing: &PacerTiming, now: Instant) -> Vec<String> {
        let mut actions = Vec::new();
        if timing.jitter_level > 7.0 {
            actions.push("high_jitter_detected".to_string());
            self.record_issue(IssueKind::HighFrameJitter, timing, now);
        } else if timing.jitter_level > 5.0 {
            actions.push("moderate_jitter_detected".to_string());
        }
        actions
    }

    fn handle_adaptive_fps_sync(&mut self, adaptive: &PacerAdaptive) -> Vec<String> {
        let mut actions = Vec::new();
        if adaptive.current_target_fps != self.control.target_fps && adaptive.current_target_fps > 0 {
            let old_target = self.control.target_fps;
            self.control.target_fps = adaptive.current_target_fps;
            self.control.target_frame_time_ms = 1000.0 / adaptive.current_target_fps as f64;
            actions.push(format!(
                "fps_sync_{}_to_{}",
                old_target, adaptive.current_target_fps
            ));
            info!(
                from = old_target,
                to = adaptive.current_target_fps,
                "target fps synchronized"
            );
        }
        actions
    }

    fn process_recommendations(
        &self,
        adaptive: &PacerAdaptive,
        recommendations: &[PacerRecommendation],
    ) -> Vec<String> {
        // Low-confidence pacer output is noise, not advice.
        if adaptive.confidence_level < self.confidence_threshold {
            return Vec::new();
        }
        recommendations
            .iter()
            .map(|r| {
                match r.kind {
                    PacerRecommendationKind::ReduceQuality => "quality_reduction_recommended",
                    PacerRecommendationKind::TargetFpsAdjustment => "fps_adjustment_recommended",
                    PacerRecommendationKind::FramePacing => "frame_pacing_recommended",
                }
                .to_string()
            })
            .collect()
    }

    fn store_insights(&mut self, status: &PacerStatus, now: Instant) {
        self.insights = Some(StabilizerInsights {
            zone: status.adaptive.performance_zone,
            confidence_level: status.adaptive.confidence_level,
            jitter_level: status.timing.jitter_level,
            smoothness_index: status.timing.smoothness_index,
            consistency_rating: status.timing.consistency_rating.clone(),
            vsync_detected: status.pacing.vsync_detected,
            tearing_risk: status.pacing.tearing_risk,
            at: now,
        });
    }

    fn record_issue(&mut self, kind: IssueKind, timing: &PacerTiming, now: Instant) {
        if self.issue_history.len() >= ISSUE_HISTORY_CAP {
            self.issue_history.pop_front();
        }
        self.issue_history.push_back(IssueRecord {
            kind,
            at: now,
            stability_score: timing.stability_score,
            jitter_level: timing.jitter_level,
        });
    }

    fn recent_history(&self, window: Duration, now: Instant) -> Vec<&PerformanceHistoryEntry> {
        self.performance_history
            .iter()
            .filter(|entry| now.duration_since(entry.at) <= window)
            .collect()
    }

    fn calculate_overall_stability(window: &[&PerformanceHistoryEntry]) -> OverallStability {
        if window.is_empty() {
            return OverallStability::neutral();
        }

        let n = window.len() as f64;
        let avg_score = window.iter().map(|e| e.stability_score).sum::<f64>() / n;
        let avg_variance = window.iter().map(|e| e.variance).sum::<f64>() / n;
        let avg_jitter = window.iter().map(|e| e.jitter_level).sum::<f64>() / n;

        let variance_spread = window
            .iter()
            .map(|e| (e.variance - avg_variance).powi(2))
            .sum::<f64>()
            / n;
        let consistency = (1.0 - variance_spread.sqrt() / 10.0).clamp(0.0, 1.0);
        let jitter_score = (1.0 - avg_jitter / 10.0).max(0.0);
        let variability = (1.0 - avg_variance / 10.0).max(0.0);

        OverallStability {
            score: avg_score,
            confidence: (n / 60.0).min(1.0),
            consistency,
            jitter_score,
            variability,
        }
    }

    fn calculate_stability_trend(window: &[&PerformanceHistoryEntry]) -> StabilityTrend {
        if window.len() < 10 {
            return StabilityTrend {
                direction: Trend::InsufficientData,
                strength: 0.0,
            };
        }

        let n = window.len() as f64;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_xx = 0.0;
        for (i, entry) in window.iter().enumerate() {
            let x = i as f64;
            sum_x += x;
            sum_y += entry.stability_score;
            sum_xy += x * entry.stability_score;
            sum_xx += x * x;
        }

        let denominator = n * sum_xx - sum_x * sum_x;
        if denominator == 0.0 {
            return StabilityTrend {
                direction: Trend::Unknown,
                strength: 0.0,
            };
        }
        let slope = (n * sum_xy - sum_x * sum_y) / denominator;
        let strength = slope.abs();

        // Stability score rising means the frame loop is improving.
        let direction = if strength < 0.001 {
            Trend::Stable
        } else if slope > 0.0 {
            Trend::Improving
        } else {
            Trend::Degrading
        };

        StabilityTrend { direction, strength }
    }

    fn identify_problem_areas(
        &self,
        window: &[&PerformanceHistoryEntry],
        now: Instant,
    ) -> Vec<ProblemArea> {
        let mut problems = Vec::new();

        let recent_issues: Vec<&IssueRecord> = self
            .issue_history
            .iter()
            .filter(|issue| now.duration_since(issue.at) <= ISSUE_WINDOW)
            .collect();

        for kind in [
            IssueKind::CriticalStabilityZone,
            IssueKind::PoorStabilityZone,
            IssueKind::HighFrameJitter,
        ] {
            let count = recent_issues.iter().filter(|i| i.kind == kind).count();
            if count >= 3 {
                problems.push(ProblemArea {
                    kind: ProblemKind::RecurringIssue,
                    description: format!("Recurring {}", kind.as_str()),
                    severity: if count > 5 {
                        Severity::High
                    } else {
                        Severity::Medium
                    },
                    count: Some(count),
                    percentage: None,
                });
            }
        }

        if !window.is_empty() {
            let low_count = window.iter().filter(|e| e.stability_score < 0.5).count();
            if low_count as f64 > window.len() as f64 * 0.3 {
                problems.push(ProblemArea {
                    kind: ProblemKind::ChronicInstability,
                    description: "Chronic frame stability issues".to_string(),
                    severity: Severity::High,
                    count: None,
                    percentage: Some(low_count as f64 / window.len() as f64 * 100.0),
                });
            }
        }

        problems
    }

    fn generate_recommendations(
        overall: &OverallStability,
        trend: &StabilityTrend,
        problems: &[ProblemArea],
    ) -> Vec<StabilityRecommendation> {
        let mut recommendations = Vec::new();

        if overall.score < 0.5 {
            recommendations.push(StabilityRecommendation {
                severity: RecommendationSeverity::Critical,
                action: "immediate_quality_reduction",
                description: "Stability has dropped severely. Reduce quality settings.".to_string(),
            });
        }

        if trend.direction == Trend::Degrading && trend.strength > 0.01 {
            recommendations.push(StabilityRecommendation {
                severity: RecommendationSeverity::Warning,
                action: "monitor_degradation",
                description: "Performance is trending downward. Increase monitoring.".to_string(),
            });
        }

        for problem in problems {
            if problem.kind == ProblemKind::RecurringIssue {
                recommendations.push(StabilityRecommendation {
                    severity: RecommendationSeverity::Maintenance,
                    action: "address_recurring_issue",
                    description: format!("Recurring problem: {}", problem.description),
                });
            }
        }

        if overall.confidence < 0.3 {
            recommendations.push(StabilityRecommendation {
                severity: RecommendationSeverity::Info,
                action: "collect_more_data",
                description: "Insufficient data. Longer observation is needed.".to_string(),
            });
        }

        recommendations
    }

    fn predict_stability_trend(window: &[&PerformanceHistoryEntry]) -> StabilityPrediction {
        if window.len() < 20 {
            return StabilityPrediction {
                confidence: 0.0,
                prediction: Trend::InsufficientData,
                change: None,
            };
        }

        let recent = &window[window.len() - 10..];
        let older = &window[window.len() - 20..window.len() - 10];
        let avg_recent = recent.iter().map(|e| e.stability_score).sum::<f64>() / 10.0;
        let avg_older = older.iter().map(|e| e.stability_score).sum::<f64>() / 10.0;

        let change = avg_recent - avg_older;
        let confidence = (window.len() as f64 / 100.0).min(1.0);

        let prediction = if change.abs() < 0.05 {
            Trend::Stable
        } else if change > 0.0 {
            Trend::Improving
        } else {
            Trend::Degrading
        };

        StabilityPrediction {
            confidence,
            prediction,
            change: Some(change),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::TracingSink;
    use proptest::prelude::*;

    fn integrator() -> StabilizerIntegrator {
        StabilizerIntegrator::new(&IntegratorConfig::default(), Box::new(TracingSink))
    }

    fn status(stability: f64, jitter: f64, zone: PerformanceZone) -> PacerStatus {
        PacerStatus {
            timing: PacerTiming {
                variance: 1.0,
                stability_score: stability,
                jitter_level: jitter,
                smoothness_index: 0.9,
                consistency_rating: "good".to_string(),
            },
            adaptive: PacerAdaptive {
                performance_zone: zone,
                confidence_level: 0.8,
                current_target_fps: 60,
            },
            recommendations: Vec::new(),
            pacing: PacerPacing::default(),
        }
    }

    #[test]
    fn zone_classification_first_match_wins() {
        let zones = PerformanceZones::default();
        assert_eq!(zones.classify(0.95, 2.0), PerformanceZone::Optimal);
        assert_eq!(zones.classify(0.95, 4.0), PerformanceZone::Good);
        assert_eq!(zones.classify(0.75, 4.0), PerformanceZone::Good);
        assert_eq!(zones.classify(0.6, 6.0), PerformanceZone::Poor);
        assert_eq!(zones.classify(0.2, 9.0), PerformanceZone::Critical);
        assert_eq!(zones.classify(0.95, 8.0), PerformanceZone::Critical);
    }

    #[test]
    fn disabled_integration_is_a_noop() {
        let mut i = integrator();
        i.set_enabled(false);
        let result = i.integrate_stabilizer_recommendations_at(
            &status(0.2, 9.0, PerformanceZone::Critical),
            Instant::now(),
        );
        assert!(!result.integrated);
        assert_eq!(result.reason, Some("integration disabled"));
        assert!(i.performance_history.is_empty());
    }

    #[test]
    fn critical_zone_records_issue_and_action() {
        let mut i = integrator();
        let result = i.integrate_stabilizer_recommendations_at(
            &status(0.2, 6.0, PerformanceZone::Critical),
            Instant::now(),
        );
        assert!(result.integrated);
        assert_eq!(result.actions.zone, vec!["critical_zone_entered".to_string()]);
        assert_eq!(i.issue_history.len(), 1);
        assert_eq!(i.issue_history[0].kind, IssueKind::CriticalStabilityZone);
    }

    #[test]
    fn optimal_zone_flags_only_above_point_nine() {
        let mut i = integrator();
        let modest = i.integrate_stabilizer_recommendations_at(
            &status(0.85, 2.0, PerformanceZone::Optimal),
            Instant::now(),
        );
        assert!(modest.actions.zone.is_empty());

        let strong = i.integrate_stabilizer_recommendations_at(
            &status(0.95, 2.0, PerformanceZone::Optimal),
            Instant::now(),
        );
        assert_eq!(
            strong.actions.zone,
            vec!["optimal_performance_detected".to_string()]
        );
    }

    #[test]
    fn jitter_tiers_detect_high_and_moderate() {
        let mut i = integrator();
        let high = i.integrate_stabilizer_recommendations_at(
            &status(0.7, 8.0, PerformanceZone::Good),
            Instant::now(),
        );
        assert_eq!(high.actions.jitter, vec!["high_jitter_detected".to_string()]);
        assert_eq!(i.issue_history.len(), 1);

        let moderate = i.integrate_stabilizer_recommendations_at(
            &status(0.7, 6.0, PerformanceZone::Good),
            Instant::now(),
        );
        assert_eq!(
            moderate.actions.jitter,
            vec!["moderate_jitter_detected".to_string()]
        );
        // Moderate jitter is noted but not an issue record.
        assert_eq!(i.issue_history.len(), 1);
    }

    #[test]
    fn fps_sync_adopts_external_target() {
        let mut i = integrator();
        let mut s = status(0.8, 3.0, PerformanceZone::Good);
        s.adaptive.current_target_fps = 30;
        let result = i.integrate_stabilizer_recommendations_at(&s, Instant::now());
        assert_eq!(result.actions.fps, vec!["fps_sync_60_to_30".to_string()]);
        assert_eq!(i.control().target_fps, 30);
        assert!((i.control().target_frame_time_ms - 33.333).abs() < 0.01);
    }

    #[test]
    fn recommendations_translate_to_action_tags() {
        let mut i = integrator();
        let mut s = status(0.8, 3.0, PerformanceZone::Good);
        s.recommendations = vec![
            PacerRecommendation {
                kind: PacerRecommendationKind::ReduceQuality,
                description: None,
            },
            PacerRecommendation {
                kind: PacerRecommendationKind::FramePacing,
                description: None,
            },
        ];
        let result = i.integrate_stabilizer_recommendations_at(&s, Instant::now());
        assert_eq!(
            result.actions.stabilization,
            vec![
                "quality_reduction_recommended".to_string(),
                "frame_pacing_recommended".to_string(),
            ]
        );
    }

    #[test]
    fn low_confidence_recommendations_are_ignored() {
        let mut i = integrator();
        let mut s = status(0.8, 3.0, PerformanceZone::Good);
        s.adaptive.confidence_level = 0.2;
        s.recommendations = vec![PacerRecommendation {
            kind: PacerRecommendationKind::ReduceQuality,
            description: None,
        }];
        let result = i.integrate_stabilizer_recommendations_at(&s, Instant::now());
        assert!(result.actions.stabilization.is_empty());
    }

    #[test]
    fn non_finite_timing_fails_soft() {
        let mut i = integrator();
        let mut s = status(f64::NAN, 3.0, PerformanceZone::Good);
        s.timing.stability_score = f64::NAN;
        let result = i.integrate_stabilizer_recommendations_at(&s, Instant::now());
        assert!(result.error);
        assert!(!result.integrated);
        assert!(i.performance_history.is_empty());
    }

    #[test]
    fn empty_history_analysis_is_neutral() {
        let i = integrator();
        let analysis = i.get_frame_stability_analysis_at(Instant::now());
        assert_eq!(analysis.overall, OverallStability::neutral());
        assert_eq!(analysis.trend.direction, Trend::InsufficientData);
        assert_eq!(analysis.prediction.prediction, Trend::InsufficientData);
    }

    #[test]
    fn stable_window_analysis_reports_stable_trend() {
        let mut i = integrator();
        let start = Instant::now();
        for k in 0..30 {
            i.integrate_stabilizer_recommendations_at(
                &status(0.95, 2.0, PerformanceZone::Optimal),
                start + Duration::from_millis(100 * k),
            );
        }
        let analysis = i.get_frame_stability_analysis_at(start + Duration::from_millis(3000));
        assert!((analysis.overall.score - 0.95).abs() < 1e-9);
        assert_eq!(analysis.trend.direction, Trend::Stable);
        assert_eq!(analysis.prediction.prediction, Trend::Stable);
        assert!(analysis.problems.is_empty());
    }

    #[test]
    fn analysis_windows_out_old_entries() {
        let mut i = integrator();
        let start = Instant::now();
        // Old bad entries outside the 5s window, then good recent ones.
        for k in 0..20 {
            i.integrate_stabilizer_recommendations_at(
                &status(0.2, 8.0, PerformanceZone::Critical),
                start + Duration::from_millis(10 * k),
            );
        }
        let late = start + Duration::from_millis(20_000);
        for k in 0..10 {
            i.integrate_stabilizer_recommendations_at(
                &status(0.9, 2.0, PerformanceZone::Optimal),
                late + Duration::from_millis(100 * k),
            );
        }
        let analysis = i.get_frame_stability_analysis_at(late + Duration::from_millis(1000));
        assert!((analysis.overall.score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn recurring_issues_surface_as_problems() {
        let mut i = integrator();
        let start = Instant::now();
        for k in 0..6 {
            i.integrate_stabilizer_recommendations_at(
                &status(0.2, 6.0, PerformanceZone::Critical),
                start + Duration::from_millis(500 * k),
            );
        }
        let analysis = i.get_frame_stability_analysis_at(start + Duration::from_millis(3000));
        let recurring: Vec<_> = analysis
            .problems
            .iter()
            .filter(|p| p.kind == ProblemKind::RecurringIssue)
            .collect();
        assert_eq!(recurring.len(), 1);
        assert_eq!(recurring[0].severity, Severity::High);
        assert_eq!(recurring[0].count, Some(6));
        // Chronic instability also fires: every score is below 0.5.
        assert!(analysis
            .problems
            .iter()
            .any(|p| p.kind == ProblemKind::ChronicInstability));
        assert!(analysis
            .recommendations
            .iter()
            .any(|r| r.severity == RecommendationSeverity::Critical));
    }

    #[test]
    fn prediction_compares_recent_against_older_mean() {
        let mut i = integrator();
        let start = Instant::now();
        for k in 0..10 {
            i.integrate_stabilizer_recommendations_at(
                &status(0.9, 2.0, PerformanceZone::Optimal),
                start + Duration::from_millis(100 * k),
            );
        }
        for k in 10..20 {
            i.integrate_stabilizer_recommendations_at(
                &status(0.5, 6.0, PerformanceZone::Poor),
                start + Duration::from_millis(100 * k),
            );
        }
        let analysis = i.get_frame_stability_analysis_at(start + Duration::from_millis(2000));
        assert_eq!(analysis.prediction.prediction, Trend::Degrading);
        let change = analysis.prediction.change.unwrap();
        assert!((change - (-0.4)).abs() < 1e-9);
    }

    #[test]
    fn forced_stabilization_applies_mode_settings() {
        let mut i = integrator();
        let result = i.force_frame_stabilization(30, StabilizationMode::Aggressive);
        assert!(result.forced);
        assert_eq!(result.target_fps, 30);
        assert_eq!(result.mode, StabilizationMode::Aggressive);
        assert_eq!(result.previous_target, 60);
        assert_eq!(result.previous_mode, StabilizationMode::Balanced);
        assert_eq!(result.settings.quality_reduction, QualityReduction::Maximum);
        assert_eq!(
            result.actions,
            vec![
                "force_stabilization_aggressive".to_string(),
                "target_fps_set_30".to_string(),
            ]
        );
        assert!(i.control().force_stabilization);
        assert_eq!(i.control().target_fps, 30);

        i.acknowledge_forced_stabilization();
        assert!(!i.control().force_stabilization);
    }

    #[test]
    fn zero_fps_force_is_rejected() {
        let mut i = integrator();
        let result = i.force_frame_stabilization(0, StabilizationMode::Balanced);
        assert!(!result.forced);
        assert!(result.error);
        assert_eq!(i.control().target_fps, 60);
    }

    #[test]
    fn unknown_mode_string_is_rejected() {
        assert!("extreme".parse::<StabilizationMode>().is_err());
        assert_eq!(
            "Aggressive".parse::<StabilizationMode>().unwrap(),
            StabilizationMode::Aggressive
        );
    }

    #[test]
    fn reset_clears_histories_but_not_control() {
        let mut i = integrator();
        i.integrate_stabilizer_recommendations_at(
            &status(0.2, 8.0, PerformanceZone::Critical),
            Instant::now(),
        );
        i.force_frame_stabilization(30, StabilizationMode::Conservative);
        i.reset();
        assert!(i.performance_history.is_empty());
        assert!(i.issue_history.is_empty());
        assert!(i.insights.is_none());
        assert_eq!(i.control().target_fps, 30);
    }

    proptest! {
        #[test]
        fn prop_histories_stay_capped(extra in 0usize..200usize) {
            let mut i = integrator();
            let start = Instant::now();
            for k in 0..(PERFORMANCE_HISTORY_CAP + extra) {
                i.integrate_stabilizer_recommendations_at(
                    &status(0.2, 8.0, PerformanceZone::Critical),
                    start + Duration::from_millis(k as u64),
                );
            }
            prop_assert!(i.performance_history.len() <= PERFORMANCE_HISTORY_CAP);
            prop_assert!(i.issue_history.len() <= ISSUE_HISTORY_CAP);
        }

        #[test]
        fn prop_overall_metrics_are_normalized(
            scores in proptest::collection::vec((0.0f64..=1.0f64, 0.0f64..=10.0f64), 1..100),
        ) {
            let mut i = integrator();
            let start = Instant::now();
            for (k, (score, jitter)) in scores.iter().enumerate() {
                let zone = PerformanceZones::default().classify(*score, *jitter);
                i.integrate_stabilizer_recommendations_at(
                    &status(*score, *jitter, zone),
                    start + Duration::from_millis(k as u64),
                );
            }
            let analysis = i.get_frame_stability_analysis_at(
                start + Duration::from_millis(scores.len() as u64),
            );
            prop_assert!((0.0..=1.0).contains(&analysis.overall.score));
            prop_assert!((0.0..=1.0).contains(&analysis.overall.confidence));
            prop_assert!((0.0..=1.0).contains(&analysis.overall.consistency));
            prop_assert!((0.0..=1.0).contains(&analysis.overall.jitter_score));
            prop_assert!((0.0..=1.0).contains(&analysis.overall.variability));
        }
    }
}
