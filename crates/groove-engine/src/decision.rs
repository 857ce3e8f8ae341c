//! Control Decision
//!
//! The single immutable output of one engine call. Consumed by the external
//! accompaniment renderer; never exposes internal state.

use crate::state::{Arrangement, Stability};
use crate::{GrooveResult, MAX_FOLLOW_NUDGE, MAX_NUDGE_STRENGTH};
use serde::{Deserialize, Serialize};

/// Tempo policy for the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum TempoPolicy {
    /// Track the player gently
    #[default]
    FollowPlayer,
    /// Apply one bounded corrective nudge
    CorrectDrift,
    /// Hold tempo, no adaptation
    Freeze,
}

/// Tempo sub-decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoDecision {
    pub policy: TempoPolicy,
    /// Signed tempo adjustment as a fraction of the target
    pub nudge_strength: f64,
}

impl Default for TempoDecision {
    fn default() -> Self {
        Self::follow(0.0)
    }
}

impl TempoDecision {
    pub fn follow(nudge_strength: f64) -> Self {
        Self {
            policy: TempoPolicy::FollowPlayer,
            nudge_strength,
        }
    }

    pub fn correct(nudge_strength: f64) -> Self {
        Self {
            policy: TempoPolicy::CorrectDrift,
            nudge_strength,
        }
    }

    pub fn freeze() -> Self {
        Self {
            policy: TempoPolicy::Freeze,
            nudge_strength: 0.0,
        }
    }

    /// Whether the nudge respects the bound for its policy
    pub fn within_bounds(&self) -> bool {
        let limit = match self.policy {
            TempoPolicy::FollowPlayer => MAX_FOLLOW_NUDGE,
            TempoPolicy::CorrectDrift => MAX_NUDGE_STRENGTH,
            TempoPolicy::Freeze => 0.0,
        };
        self.nudge_strength.is_finite() && self.nudge_strength.abs() <= limit
    }
}

/// Arrangement / probe action for the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum ProbeAction {
    #[default]
    None,
    /// A trial arrangement starts this window
    Trial,
    /// The running trial succeeded and becomes the baseline
    Commit,
    /// The running trial failed; the previous arrangement is restored
    Revert,
}

/// Parameters accompanying a probe action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeParams {
    /// Arrangement the renderer should switch to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrangement: Option<Arrangement>,
}

/// Probe sub-decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeDecision {
    pub action: ProbeAction,
    #[serde(default)]
    pub params: ProbeParams,
}

impl ProbeDecision {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_arrangement(action: ProbeAction, arrangement: Arrangement) -> Self {
        Self {
            action,
            params: ProbeParams {
                arrangement: Some(arrangement),
            },
        }
    }
}

/// Complete decision for one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDecision {
    pub tempo: TempoDecision,
    pub probe: ProbeDecision,
    pub stability: Stability,
    /// Set on the window a hard corrective action was applied
    #[serde(default)]
    pub corrective: bool,
}

impl ControlDecision {
    /// Decision for a window without usable context
    pub fn frozen() -> Self {
        Self {
            tempo: TempoDecision::freeze(),
            probe: ProbeDecision::none(),
            stability: Stability::Frozen,
            corrective: false,
        }
    }

    pub fn to_json(&self) -> GrooveResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> GrooveResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
