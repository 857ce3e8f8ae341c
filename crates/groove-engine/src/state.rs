//! Engine State
//!
//! - `FastState`: volatile per-window values, owned and mutated only by the engine
//! - `SlowTraits`: session-scale values, changed only when a probe commits
//! - `PriorStateHint`: partial state supplied by the caller at hydration

use crate::config::EngineConfig;
use crate::context::StyleDefaults;
use crate::decision::TempoDecision;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stability classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum Stability {
    /// Player timing is steady
    #[default]
    Stable,
    /// Hard instability detected this window
    Unstable,
    /// Hysteresis countdown after instability
    Recovering,
    /// No usable engine context
    Frozen,
}

impl Stability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Unstable => "unstable",
            Self::Recovering => "recovering",
            Self::Frozen => "frozen",
        }
    }

    /// Whether the tempo policy may run in this state
    pub fn allows_tempo(&self) -> bool {
        matches!(self, Self::Stable | Self::Recovering)
    }
}

/// Arrangement / density setting handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    /// Arrangement identifier (e.g. "sparse_comp", "walking_bass")
    pub id: String,
    /// Note density (0.0 - 1.0)
    #[serde(default = "default_density")]
    pub density: f64,
    /// Additional renderer parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, f64>,
}

fn default_density() -> f64 {
    0.5
}

impl Default for Arrangement {
    fn default() -> Self {
        Self {
            id: "baseline".to_string(),
            density: 0.5,
            params: BTreeMap::new(),
        }
    }
}

impl Arrangement {
    /// Create an arrangement without extra parameters
    pub fn new(id: &str, density: f64) -> Self {
        Self {
            id: id.to_string(),
            density,
            params: BTreeMap::new(),
        }
    }

    /// Add a renderer parameter
    pub fn with_param(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    /// Validate arrangement values
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("arrangement id is empty".to_string());
        }
        if !self.density.is_finite() || !(0.0..=1.0).contains(&self.density) {
            return Err(format!(
                "arrangement '{}' density {} outside [0, 1]",
                self.id, self.density
            ));
        }
        if let Some((key, value)) = self.params.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!(
                "arrangement '{}' param '{}' is not finite ({})",
                self.id, key, value
            ));
        }
        Ok(())
    }
}

/// A probe trial in flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeTrial {
    /// Arrangement under trial
    pub candidate: Arrangement,
    /// Arrangement to restore on revert
    pub previous: Arrangement,
    /// Stable windows scored so far
    pub windows_run: u32,
    /// Grid deviation of the window the trial started in (ms)
    pub baseline_deviation_ms: f64,
    /// Sum of grid deviations over scored windows (ms)
    pub deviation_sum_ms: f64,
    /// Sum of clamped drift over scored windows
    pub drift_sum: f64,
}

impl ProbeTrial {
    pub fn new(candidate: Arrangement, previous: Arrangement, baseline_deviation_ms: f64) -> Self {
        Self {
            candidate,
            previous,
            windows_run: 0,
            baseline_deviation_ms,
            deviation_sum_ms: 0.0,
            drift_sum: 0.0,
        }
    }

    /// Mean grid deviation over scored windows (ms)
    pub fn mean_deviation_ms(&self) -> f64 {
        if self.windows_run == 0 {
            self.baseline_deviation_ms
        } else {
            self.deviation_sum_ms / self.windows_run as f64
        }
    }

    /// Mean clamped drift over scored windows
    pub fn mean_drift(&self) -> f64 {
        if self.windows_run == 0 {
            0.0
        } else {
            self.drift_sum / self.windows_run as f64
        }
    }
}

/// Volatile per-window engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastState {
    /// Persisted stability state (never `Unstable` between calls)
    pub stability: Stability,
    /// State to resume once a frozen engine gets a valid context again
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_freeze: Option<Stability>,
    /// Running sum of clamped per-window drift
    pub drift_accum: f64,
    /// Windows left before another probe may start after a revert
    pub probe_cooldown_windows: u32,
    /// Stable windows left before the next probe
    pub next_probe_in_windows: u32,
    /// Arrangement currently rendered
    pub current_arrangement: Arrangement,
    /// Calm windows counted while recovering
    pub consecutive_stable_windows: u32,
    /// Trial in flight, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_trial: Option<ProbeTrial>,
    /// Round-robin position in the trial pool
    #[serde(default)]
    pub trial_cursor: u32,
    /// Tempo sub-decision of the last evaluated window
    #[serde(default)]
    pub last_tempo: TempoDecision,
    /// Stability label of the last evaluated window
    #[serde(default)]
    pub last_label: Stability,
}

impl Default for FastState {
    fn default() -> Self {
        Self {
            stability: Stability::Stable,
            pre_freeze: None,
            drift_accum: 0.0,
            probe_cooldown_windows: 0,
            next_probe_in_windows: 0,
            current_arrangement: Arrangement::default(),
            consecutive_stable_windows: 0,
            active_trial: None,
            trial_cursor: 0,
            last_tempo: TempoDecision::default(),
            last_label: Stability::Stable,
        }
    }
}

impl FastState {
    /// Fresh state rendering the given arrangement
    pub fn with_arrangement(arrangement: Arrangement) -> Self {
        Self {
            current_arrangement: arrangement,
            ..Default::default()
        }
    }

    /// Whether a probe trial is running
    pub fn trial_active(&self) -> bool {
        self.active_trial.is_some()
    }
}

/// Session-scale learned values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowTraits {
    /// Arrangement the session falls back to
    pub baseline_arrangement: Arrangement,
    /// Last arrangement committed by a probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probed: Option<Arrangement>,
    /// Candidates the probe scheduler draws from
    #[serde(default)]
    pub trial_pool: Vec<Arrangement>,
    /// Long-run player tempo bias (fraction of target)
    #[serde(default)]
    pub tempo_bias: f64,
    /// Number of committed probes
    #[serde(default)]
    pub committed_probes: u32,
}

impl Default for SlowTraits {
    fn default() -> Self {
        Self {
            baseline_arrangement: Arrangement::default(),
            last_probed: None,
            trial_pool: Vec::new(),
            tempo_bias: 0.0,
            committed_probes: 0,
        }
    }
}

impl SlowTraits {
    /// Traits with a baseline and a trial pool
    pub fn new(baseline_arrangement: Arrangement, trial_pool: Vec<Arrangement>) -> Self {
        Self {
            baseline_arrangement,
            trial_pool,
            ..Default::default()
        }
    }
}

/// Partial state supplied by the caller at hydration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorStateHint {
    #[serde(default)]
    pub stability: Option<Stability>,
    #[serde(default)]
    pub drift_accum: Option<f64>,
    #[serde(default)]
    pub probe_cooldown_windows: Option<u32>,
    #[serde(default)]
    pub next_probe_in_windows: Option<u32>,
    #[serde(default)]
    pub consecutive_stable_windows: Option<u32>,
    #[serde(default)]
    pub current_arrangement: Option<Arrangement>,
    #[serde(default)]
    pub baseline_arrangement: Option<Arrangement>,
    #[serde(default)]
    pub last_probed: Option<Arrangement>,
    #[serde(default)]
    pub trial_pool: Option<Vec<Arrangement>>,
    #[serde(default)]
    pub tempo_bias: Option<f64>,
    #[serde(default)]
    pub committed_probes: Option<u32>,
    #[serde(default)]
    pub trial_cursor: Option<u32>,
}

/// Build initial state from an optional partial hint.
///
/// Missing fields take defaults; invalid values are sanitised rather than
/// rejected. A hinted `unstable` or `frozen` resumes as `recovering` so the
/// hysteresis has to be earned again.
pub fn hydrate(
    hint: Option<&PriorStateHint>,
    style: &StyleDefaults,
    config: &EngineConfig,
) -> (FastState, SlowTraits) {
    let empty = PriorStateHint::default();
    let hint = hint.unwrap_or(&empty);

    let baseline = valid_arrangement(hint.baseline_arrangement.as_ref())
        .unwrap_or_else(|| style.arrangement.clone());
    let current =
        valid_arrangement(hint.current_arrangement.as_ref()).unwrap_or_else(|| baseline.clone());

    let trial_pool = match &hint.trial_pool {
        Some(pool) => pool
            .iter()
            .filter(|a| match a.validate() {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("dropping hinted trial candidate: {}", e);
                    false
                }
            })
            .cloned()
            .collect(),
        None => style.trial_pool.clone(),
    };

    let stability = match hint.stability.unwrap_or_default() {
        Stability::Stable => Stability::Stable,
        Stability::Unstable | Stability::Recovering | Stability::Frozen => Stability::Recovering,
    };
    let consecutive_stable_windows = match stability {
        Stability::Recovering if hint.stability == Some(Stability::Recovering) => hint
            .consecutive_stable_windows
            .unwrap_or(0)
            .min(config.hysteresis_windows.saturating_sub(1)),
        _ => 0,
    };

    let drift_accum = match hint.drift_accum {
        Some(d) if d.is_finite() => d.clamp(
            -config.drift_correct_threshold,
            config.drift_correct_threshold,
        ),
        Some(d) => {
            log::warn!("hinted drift_accum {} is not finite, resetting", d);
            0.0
        }
        None => 0.0,
    };

    let tempo_bias = hint
        .tempo_bias
        .filter(|b| b.is_finite())
        .map(|b| b.clamp(-config.drift_clamp, config.drift_clamp))
        .unwrap_or(0.0);

    let fast = FastState {
        stability,
        pre_freeze: None,
        drift_accum,
        probe_cooldown_windows: hint.probe_cooldown_windows.unwrap_or(0),
        next_probe_in_windows: hint
            .next_probe_in_windows
            .unwrap_or(config.probe_interval_windows),
        current_arrangement: current,
        consecutive_stable_windows,
        active_trial: None,
        trial_cursor: hint.trial_cursor.unwrap_or(0),
        last_tempo: TempoDecision::default(),
        last_label: stability,
    };

    let slow = SlowTraits {
        baseline_arrangement: baseline,
        last_probed: valid_arrangement(hint.last_probed.as_ref()),
        trial_pool,
        tempo_bias,
        committed_probes: hint.committed_probes.unwrap_or(0),
    };

    (fast, slow)
}

fn valid_arrangement(arrangement: Option<&Arrangement>) -> Option<Arrangement> {
    let arrangement = arrangement?;
    match arrangement.validate() {
        Ok(()) => Some(arrangement.clone()),
        Err(e) => {
            log::warn!("ignoring hinted arrangement: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style() -> StyleDefaults {
        StyleDefaults {
            arrangement: Arrangement::new("comp", 0.4),
            trial_pool: vec![Arrangement::new("stride", 0.6)],
        }
    }

    #[test]
    fn test_stability_labels() {
        assert_eq!(Stability::Recovering.as_str(), "recovering");
        assert_eq!(
            serde_json::to_string(&Stability::Frozen).unwrap(),
            "\"frozen\""
        );
        assert!(Stability::Recovering.allows_tempo());
        assert!(!Stability::Unstable.allows_tempo());
        assert!(!Stability::Frozen.allows_tempo());
    }

    #[test]
    fn test_hydrate_without_hint() {
        let config = EngineConfig::default();
        let (fast, slow) = hydrate(None, &style(), &config);

        assert_eq!(fast.stability, Stability::Stable);
        assert_eq!(fast.drift_accum, 0.0);
        assert_eq!(fast.next_probe_in_windows, config.probe_interval_windows);
        assert_eq!(fast.current_arrangement.id, "comp");
        assert_eq!(slow.baseline_arrangement.id, "comp");
        assert_eq!(slow.trial_pool.len(), 1);
    }

    #[test]
    fn test_hydrate_partial_hint() {
        let config = EngineConfig::default();
        let hint: PriorStateHint = serde_json::from_str(
            r#"{ "stability": "recovering", "consecutive_stable_windows": 1,
                 "drift_accum": 0.02, "next_probe_in_windows": 0 }"#,
        )
        .unwrap();
        let (fast, _) = hydrate(Some(&hint), &style(), &config);

        assert_eq!(fast.stability, Stability::Recovering);
        assert_eq!(fast.consecutive_stable_windows, 1);
        assert!((fast.drift_accum - 0.02).abs() < 1e-12);
        assert_eq!(fast.next_probe_in_windows, 0);
    }

    #[test]
    fn test_hydrate_sanitises_hint() {
        let config = EngineConfig::default();
        let hint = PriorStateHint {
            stability: Some(Stability::Unstable),
            consecutive_stable_windows: Some(9),
            drift_accum: Some(0.9),
            current_arrangement: Some(Arrangement::new("broken", 3.0)),
            tempo_bias: Some(f64::NAN),
            ..Default::default()
        };
        let (fast, slow) = hydrate(Some(&hint), &style(), &config);

        assert_eq!(fast.stability, Stability::Recovering);
        assert_eq!(fast.consecutive_stable_windows, 0);
        assert!((fast.drift_accum - config.drift_correct_threshold).abs() < 1e-12);
        assert_eq!(fast.current_arrangement.id, "comp");
        assert_eq!(slow.tempo_bias, 0.0);
    }

    #[test]
    fn test_arrangement_validation() {
        assert!(Arrangement::new("ok", 0.5).validate().is_ok());
        assert!(Arrangement::new("", 0.5).validate().is_err());
        assert!(Arrangement::new("dense", 1.5).validate().is_err());
        assert!(Arrangement::new("p", 0.5)
            .with_param("swing", f64::INFINITY)
            .validate()
            .is_err());
    }

    #[test]
    fn test_trial_means() {
        let mut trial = ProbeTrial::new(Arrangement::new("a", 0.3), Arrangement::default(), 12.0);
        assert_eq!(trial.mean_deviation_ms(), 12.0);
        trial.windows_run = 2;
        trial.deviation_sum_ms = 20.0;
        trial.drift_sum = -0.02;
        assert!((trial.mean_deviation_ms() - 10.0).abs() < 1e-12);
        assert!((trial.mean_drift() + 0.01).abs() < 1e-12);
    }
}
