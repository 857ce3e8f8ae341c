//! State Snapshots
//!
//! Versioned JSON form of the state a caller persists between windows (or
//! between process restarts). The engine never writes snapshots itself.

use crate::state::{FastState, PriorStateHint, SlowTraits};
use crate::{GrooveError, GrooveResult};
use serde::{Deserialize, Serialize};

/// Snapshot format version
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Persisted engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Snapshot format version
    pub version: String,
    /// Format identifier
    #[serde(default = "default_format")]
    pub format: String,
    pub fast: FastState,
    pub slow: SlowTraits,
}

fn default_format() -> String {
    "groove_state".to_string()
}

impl EngineSnapshot {
    pub fn new(fast: FastState, slow: SlowTraits) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            format: default_format(),
            fast,
            slow,
        }
    }

    /// Load a snapshot from JSON
    pub fn from_json(json: &str) -> GrooveResult<Self> {
        let raw: serde_json::Value = serde_json::from_str(json)?;

        let version = raw["version"].as_str().unwrap_or("");
        match version {
            SNAPSHOT_VERSION => Ok(serde_json::from_value(raw)?),
            other => Err(GrooveError::Snapshot(format!(
                "Unknown snapshot version: '{}'",
                other
            ))),
        }
    }

    /// Save snapshot to JSON
    pub fn to_json(&self) -> GrooveResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Split into the state pair the engine consumes
    pub fn into_state(self) -> (FastState, SlowTraits) {
        (self.fast, self.slow)
    }

    /// Partial hint carrying the durable parts of this snapshot
    pub fn to_hint(&self) -> PriorStateHint {
        PriorStateHint {
            stability: Some(self.fast.stability),
            drift_accum: Some(self.fast.drift_accum),
            probe_cooldown_windows: Some(self.fast.probe_cooldown_windows),
            next_probe_in_windows: Some(self.fast.next_probe_in_windows),
            consecutive_stable_windows: Some(self.fast.consecutive_stable_windows),
            current_arrangement: Some(
                self.fast
                    .active_trial
                    .as_ref()
                    .map(|t| t.previous.clone())
                    .unwrap_or_else(|| self.fast.current_arrangement.clone()),
            ),
            baseline_arrangement: Some(self.slow.baseline_arrangement.clone()),
            last_probed: self.slow.last_probed.clone(),
            trial_pool: Some(self.slow.trial_pool.clone()),
            tempo_bias: Some(self.slow.tempo_bias),
            committed_probes: Some(self.slow.committed_probes),
            trial_cursor: Some(self.fast.trial_cursor),
        }
    }
}
