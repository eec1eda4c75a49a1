//! Configuration for the frame governor.
//!
//! Explicit structs with named fields and documented defaults, validated
//! at construction, plus optional JSON persistence for hosts that want
//! user preferences to survive restarts.

use crate::controller::PerformanceLevel;
use crate::error::ConfigError;
use crate::integrator::StabilizationMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Analyzer tuning.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AnalyzerConfig {
    /// Frame-time history capacity. 120 samples is about 2s at 60Hz.
    pub max_history: usize,
    /// Samples considered by the trend regression.
    pub trend_window: usize,
    /// Below this sample count analysis fails open as insufficient data.
    pub min_samples: usize,
    /// Variance (ms²) at which the stability score reaches zero.
    pub max_acceptable_variance: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_history: 120,
            trend_window: 30,
            min_samples: 10,
            max_acceptable_variance: 5.0,
        }
    }
}

/// Controller tuning.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ControllerConfig {
    /// When false, only manual level changes are applied.
    pub adaptive_mode: bool,
    /// Minimum gap between automatic adjustments.
    pub cooldown_ms: u64,
    /// Minimum quiet period before an improvement is considered.
    pub minimum_stability_period_ms: u64,
    pub initial_level: PerformanceLevel,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            adaptive_mode: true,
            cooldown_ms: 1000,
            minimum_stability_period_ms: 2000,
            initial_level: PerformanceLevel::High,
        }
    }
}

/// Integrator tuning.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IntegratorConfig {
    /// When false, pacer integration is a no-op.
    pub enabled: bool,
    pub target_fps: u32,
    /// Pacer recommendations below this confidence are ignored.
    pub confidence_threshold: f64,
    pub mode: StabilizationMode,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_fps: 60,
            confidence_threshold: 0.5,
            mode: StabilizationMode::Balanced,
        }
    }
}

/// Top-level configuration for all three components.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ControlConfig {
    pub analyzer: AnalyzerConfig,
    pub controller: ControllerConfig,
    pub integrator: IntegratorConfig,
}

impl ControlConfig {
    /// Validate configuration values.
    /// Returns Ok(()) if valid, Err with descriptive message if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analyzer.max_history < 2 {
            return Err(ConfigError::ValidationError(format!(
                "max_history ({}) must be at least 2 samples",
                self.analyzer.max_history
            )));
        }

        if self.analyzer.min_samples > self.analyzer.max_history {
            return Err(ConfigError::ValidationError(format!(
                "min_samples ({}) cannot exceed max_history ({})",
                self.analyzer.min_samples, self.analyzer.max_history
            )));
        }

        if self.analyzer.trend_window < 2 {
            return Err(ConfigError::ValidationError(format!(
                "trend_window ({}) must be at least 2 samples",
                self.analyzer.trend_window
            )));
        }

        if self.analyzer.max_acceptable_variance <= 0.0
            || !self.analyzer.max_acceptable_variance.is_finite()
        {
            return Err(ConfigError::ValidationError(format!(
                "max_acceptable_variance ({}) must be a positive finite value",
                self.analyzer.max_acceptable_variance
            )));
        }

        if self.controller.cooldown_ms == 0 {
            return Err(ConfigError::ValidationError(
                "cooldown_ms must be greater than zero".to_string(),
            ));
        }

        if self.controller.minimum_stability_period_ms < self.controller.cooldown_ms {
            return Err(ConfigError::ValidationError(format!(
                "minimum_stability_period_ms ({}) cannot be less than cooldown_ms ({})",
                self.controller.minimum_stability_period_ms, self.controller.cooldown_ms
            )));
        }

        if self.integrator.target_fps == 0 || self.integrator.target_fps > 480 {
            return Err(ConfigError::ValidationError(format!(
                "target_fps ({}) must be between 1 and 480",
                self.integrator.target_fps
            )));
        }

        if !(0.0..=1.0).contains(&self.integrator.confidence_threshold) {
            return Err(ConfigError::ValidationError(format!(
                "confidence_threshold ({}) must be within [0, 1]",
                self.integrator.confidence_threshold
            )));
        }

        Ok(())
    }

    /// Load configuration from file or use defaults.
    /// A missing file yields the default config; a malformed or invalid
    /// file is an error rather than a silent fallback.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::ParseError(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("Invalid JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file using atomic write.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {}", e)))?;

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, path)?;

        Ok(())
    }
}

// Custom serialization for StabilizationMode
impl Serialize for StabilizationMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StabilizationMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "aggressive" => Ok(StabilizationMode::Aggressive),
            "balanced" => Ok(StabilizationMode::Balanced),
            "conservative" => Ok(StabilizationMode::Conservative),
            _ => Err(serde::de::Error::custom(format!(
                "invalid stabilization mode: {}, expected one of: aggressive, balanced, conservative",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.analyzer.max_history, 120);
        assert_eq!(config.analyzer.min_samples, 10);
        assert_eq!(config.controller.cooldown_ms, 1000);
        assert_eq!(config.controller.minimum_stability_period_ms, 2000);
        assert_eq!(config.integrator.target_fps, 60);
        assert_eq!(config.integrator.mode, StabilizationMode::Balanced);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nonexistent.json");

        let config = ControlConfig::load_or_default(&path).unwrap();
        assert_eq!(config, ControlConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = ControlConfig::default();
        config.analyzer.max_history = 240;
        config.integrator.target_fps = 120;
        config.integrator.mode = StabilizationMode::Aggressive;
        config.save(&path).unwrap();

        let loaded = ControlConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validation_rejects_min_samples_over_capacity() {
        let mut config = ControlConfig::default();
        config.analyzer.min_samples = 200;

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validation_rejects_zero_cooldown() {
        let mut config = ControlConfig::default();
        config.controller.cooldown_ms = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_stability_period_below_cooldown() {
        let mut config = ControlConfig::default();
        config.controller.minimum_stability_period_ms = 500;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_confidence() {
        let mut config = ControlConfig::default();
        config.integrator.confidence_threshold = 1.5;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_mode_deserialization() {
        let json = r#""extreme""#;
        let result: Result<StabilizationMode, _> = serde_json::from_str(json);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("invalid stabilization mode"));
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        let json = serde_json::to_string(&StabilizationMode::Conservative).unwrap();
        assert_eq!(json, "\"conservative\"");
    }

    fn mode_strategy() -> impl Strategy<Value = StabilizationMode> {
        prop_oneof![
            Just(StabilizationMode::Aggressive),
            Just(StabilizationMode::Balanced),
            Just(StabilizationMode::Conservative),
        ]
    }

    fn valid_config_strategy() -> impl Strategy<Value = ControlConfig> {
        (
            2usize..=1000usize,
            2usize..=120usize,
            1u64..=5000u64,
            1u32..=480u32,
            0.0f64..=1.0f64,
            mode_strategy(),
        )
            .prop_filter_map(
                "min_samples must fit in max_history",
                |(max_history, min_samples, cooldown_ms, target_fps, threshold, mode)| {
                    if min_samples > max_history {
                        return None;
                    }
                    let mut config = ControlConfig::default();
                    config.analyzer.max_history = max_history;
                    config.analyzer.min_samples = min_samples;
                    config.controller.cooldown_ms = cooldown_ms;
                    config.controller.minimum_stability_period_ms = cooldown_ms * 2;
                    config.integrator.target_fps = target_fps;
                    config.integrator.confidence_threshold = threshold;
                    config.integrator.mode = mode;
                    Some(config)
                },
            )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_json_round_trip(config in valid_config_strategy()) {
            let json = serde_json::to_string(&config).unwrap();
            let parsed: ControlConfig = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(config, parsed);
        }

        #[test]
        fn prop_config_file_round_trip(config in valid_config_strategy()) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("config.json");

            config.save(&path).unwrap();
            let loaded = ControlConfig::load_or_default(&path).unwrap();
            prop_assert_eq!(config, loaded);
        }

        #[test]
        fn prop_valid_configs_pass_validation(config in valid_config_strategy()) {
            prop_assert!(config.validate().is_ok());
        }
    }
}
