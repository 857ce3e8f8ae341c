//! Engine Configuration
//!
//! Every tunable constant of the stability, tempo and probe policies lives
//! here. Missing JSON fields fall back to the documented defaults.

use crate::{GrooveError, GrooveResult, MAX_FOLLOW_NUDGE, MAX_NUDGE_STRENGTH};
use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Grid deviation (ms) above which a window counts as unstable
    #[serde(default = "default_instability_threshold")]
    pub instability_threshold_ms: f64,
    /// Consecutive calm windows needed to leave RECOVERING
    #[serde(default = "default_hysteresis_windows")]
    pub hysteresis_windows: u32,
    /// Per-window drift clamp (fraction of target tempo)
    #[serde(default = "default_drift_clamp")]
    pub drift_clamp: f64,
    /// Accumulated drift that triggers a correction
    #[serde(default = "default_drift_correct_threshold")]
    pub drift_correct_threshold: f64,
    /// Absolute nudge bound
    #[serde(default = "default_nudge_limit")]
    pub nudge_limit: f64,
    /// Stable windows a trial runs before it is scored
    #[serde(default = "default_trial_duration")]
    pub trial_duration_windows: u32,
    /// Stable windows between a commit and the next trial
    #[serde(default = "default_probe_interval")]
    pub probe_interval_windows: u32,
    /// Windows blocked after a reverted trial
    #[serde(default = "default_probe_cooldown")]
    pub probe_cooldown_windows: u32,
    /// Allowed increase of mean grid deviation (ms) during a trial
    #[serde(default = "default_regression_tolerance")]
    pub regression_tolerance_ms: f64,
    /// Blend factor for the long-run tempo bias on commit
    #[serde(default = "default_tempo_bias_smoothing")]
    pub tempo_bias_smoothing: f64,
    /// Learned tempo bias below this magnitude does not steer candidate choice
    #[serde(default = "default_tempo_bias_deadband")]
    pub tempo_bias_deadband: f64,
    /// Lowest accepted target tempo
    #[serde(default = "default_min_bpm")]
    pub min_target_bpm: f64,
    /// Highest accepted target tempo
    #[serde(default = "default_max_bpm")]
    pub max_target_bpm: f64,
}

fn default_instability_threshold() -> f64 {
    45.0
}
fn default_hysteresis_windows() -> u32 {
    3
}
fn default_drift_clamp() -> f64 {
    0.05
}
fn default_drift_correct_threshold() -> f64 {
    0.03
}
fn default_nudge_limit() -> f64 {
    0.30
}
fn default_trial_duration() -> u32 {
    2
}
fn default_probe_interval() -> u32 {
    8
}
fn default_probe_cooldown() -> u32 {
    4
}
fn default_regression_tolerance() -> f64 {
    5.0
}
fn default_tempo_bias_smoothing() -> f64 {
    0.25
}
fn default_tempo_bias_deadband() -> f64 {
    0.01
}
fn default_min_bpm() -> f64 {
    20.0
}
fn default_max_bpm() -> f64 {
    300.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instability_threshold_ms: 45.0,
            hysteresis_windows: 3,
            drift_clamp: 0.05,
            drift_correct_threshold: 0.03,
            nudge_limit: 0.30,
            trial_duration_windows: 2,
            probe_interval_windows: 8,
            probe_cooldown_windows: 4,
            regression_tolerance_ms: 5.0,
            tempo_bias_smoothing: 0.25,
            tempo_bias_deadband: 0.01,
            min_target_bpm: 20.0,
            max_target_bpm: 300.0,
        }
    }
}

impl EngineConfig {
    /// Load configuration from JSON and validate it
    pub fn from_json(json: &str) -> GrooveResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config
            .validate()
            .map_err(|errors| GrooveError::InvalidConfig(errors.join("; ")))?;
        Ok(config)
    }

    /// Save configuration to JSON
    pub fn to_json(&self) -> GrooveResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let positive = [
            ("instability_threshold_ms", self.instability_threshold_ms),
            ("drift_clamp", self.drift_clamp),
            ("drift_correct_threshold", self.drift_correct_threshold),
            ("nudge_limit", self.nudge_limit),
            ("min_target_bpm", self.min_target_bpm),
            ("max_target_bpm", self.max_target_bpm),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                errors.push(format!("{} must be finite and > 0 (got {})", name, value));
            }
        }

        if !self.regression_tolerance_ms.is_finite() || self.regression_tolerance_ms < 0.0 {
            errors.push(format!(
                "regression_tolerance_ms must be finite and >= 0 (got {})",
                self.regression_tolerance_ms
            ));
        }
        if !(0.0..=1.0).contains(&self.tempo_bias_smoothing) {
            errors.push(format!(
                "tempo_bias_smoothing must be in [0, 1] (got {})",
                self.tempo_bias_smoothing
            ));
        }
        if !self.tempo_bias_deadband.is_finite() || self.tempo_bias_deadband < 0.0 {
            errors.push(format!(
                "tempo_bias_deadband must be finite and >= 0 (got {})",
                self.tempo_bias_deadband
            ));
        }
        if self.drift_clamp > MAX_FOLLOW_NUDGE {
            errors.push(format!(
                "drift_clamp {} exceeds follow bound {}",
                self.drift_clamp, MAX_FOLLOW_NUDGE
            ));
        }
        if self.nudge_limit > MAX_NUDGE_STRENGTH {
            errors.push(format!(
                "nudge_limit {} exceeds {}",
                self.nudge_limit, MAX_NUDGE_STRENGTH
            ));
        }
        if self.drift_correct_threshold >= self.nudge_limit {
            errors.push(format!(
                "drift_correct_threshold {} must be below nudge_limit {}",
                self.drift_correct_threshold, self.nudge_limit
            ));
        }
        if self.hysteresis_windows == 0 {
            errors.push("hysteresis_windows must be >= 1".to_string());
        }
        if self.trial_duration_windows == 0 {
            errors.push("trial_duration_windows must be >= 1".to_string());
        }
        if self.min_target_bpm >= self.max_target_bpm {
            errors.push(format!(
                "min_target_bpm {} must be below max_target_bpm {}",
                self.min_target_bpm, self.max_target_bpm
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
