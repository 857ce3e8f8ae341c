//! Engine Context
//!
//! Caller-supplied, per-call configuration: target tempo, style defaults and
//! an optional partial prior-state hint. The engine treats an absent context
//! and a context that fails [`EngineContext::validate`] the same way: it freezes.

use crate::config::EngineConfig;
use crate::state::{Arrangement, PriorStateHint};
use crate::{GrooveError, GrooveResult};
use serde::{Deserialize, Serialize};

/// Style defaults for a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleDefaults {
    /// Arrangement to render when nothing has been learned yet
    #[serde(default)]
    pub arrangement: Arrangement,
    /// Alternate arrangements the probe scheduler may trial
    #[serde(default)]
    pub trial_pool: Vec<Arrangement>,
}

/// Per-call engine context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineContext {
    /// Tempo the accompaniment is meant to sit at (BPM)
    pub tempo_bpm_target: f64,
    /// Style defaults
    #[serde(default)]
    pub style: StyleDefaults,
    /// Partial state used at hydration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_state_hint: Option<PriorStateHint>,
}

impl EngineContext {
    /// Context with a target tempo and default style
    pub fn new(tempo_bpm_target: f64) -> Self {
        Self {
            tempo_bpm_target,
            style: StyleDefaults::default(),
            prior_state_hint: None,
        }
    }

    pub fn with_style(mut self, style: StyleDefaults) -> Self {
        self.style = style;
        self
    }

    pub fn with_hint(mut self, hint: PriorStateHint) -> Self {
        self.prior_state_hint = Some(hint);
        self
    }

    /// Parse a context from JSON (does not validate)
    pub fn from_json(json: &str) -> GrooveResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check that the context is fully formed for the given config
    pub fn validate(&self, config: &EngineConfig) -> GrooveResult<()> {
        let bpm = self.tempo_bpm_target;
        if !bpm.is_finite() {
            return Err(GrooveError::InvalidContext(format!(
                "tempo_bpm_target is not finite ({})",
                bpm
            )));
        }
        if !(config.min_target_bpm..=config.max_target_bpm).contains(&bpm) {
            return Err(GrooveError::InvalidContext(format!(
                "tempo_bpm_target {} outside {}..={}",
                bpm, config.min_target_bpm, config.max_target_bpm
            )));
        }

        self.style
            .arrangement
            .validate()
            .map_err(GrooveError::InvalidContext)?;
        for candidate in &self.style.trial_pool {
            candidate.validate().map_err(GrooveError::InvalidContext)?;
        }

        Ok(())
    }
}
