//! Stability / Hysteresis Policy
//!
//! STABLE -> UNSTABLE -> RECOVERING -> STABLE, with any state -> FROZEN when the
//! engine context is missing and a return to the pre-freeze state once it
//! reappears.
//!
//! UNSTABLE lasts exactly one window: the corrective action is applied in the
//! window that detected the instability and the persisted state moves straight
//! on to RECOVERING. Leaving RECOVERING takes `hysteresis_windows` consecutive
//! calm windows; one unstable window restarts the countdown.

use crate::config::EngineConfig;
use crate::state::{FastState, Stability};

/// Result of classifying one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityStep {
    /// Label emitted with this window's decision
    pub label: Stability,
    /// State persisted for the next window
    pub next: Stability,
    /// Hysteresis counter persisted for the next window
    pub consecutive_stable_windows: u32,
    /// The window entered UNSTABLE (corrective action + drift reset)
    pub entered_instability: bool,
}

/// Hysteresis state machine
#[derive(Debug, Clone, Copy)]
pub struct StabilityPolicy {
    threshold_ms: f64,
    hysteresis_windows: u32,
}

impl StabilityPolicy {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            threshold_ms: config.instability_threshold_ms,
            hysteresis_windows: config.hysteresis_windows.max(1),
        }
    }

    /// Hard instability threshold (ms of grid deviation)
    pub fn threshold_ms(&self) -> f64 {
        self.threshold_ms
    }

    /// Whether a window's grid deviation counts as unstable
    #[inline]
    pub fn is_unstable(&self, grid_deviation_ms: f64) -> bool {
        grid_deviation_ms > self.threshold_ms
    }

    /// Advance the state machine by one evaluated window.
    ///
    /// `fast.stability` must not be `Frozen`; callers thaw first.
    pub fn step(&self, fast: &FastState, grid_deviation_ms: f64) -> StabilityStep {
        let unstable = self.is_unstable(grid_deviation_ms);

        if unstable {
            return StabilityStep {
                label: Stability::Unstable,
                next: Stability::Recovering,
                consecutive_stable_windows: 0,
                entered_instability: true,
            };
        }

        match fast.stability {
            Stability::Stable => StabilityStep {
                label: Stability::Stable,
                next: Stability::Stable,
                consecutive_stable_windows: fast.consecutive_stable_windows.saturating_add(1),
                entered_instability: false,
            },
            Stability::Recovering | Stability::Unstable | Stability::Frozen => {
                let calm = fast.consecutive_stable_windows.saturating_add(1);
                if calm >= self.hysteresis_windows {
                    log::debug!("hysteresis satisfied after {} calm windows", calm);
                    StabilityStep {
                        label: Stability::Stable,
                        next: Stability::Stable,
                        consecutive_stable_windows: calm,
                        entered_instability: false,
                    }
                } else {
                    StabilityStep {
                        label: Stability::Recovering,
                        next: Stability::Recovering,
                        consecutive_stable_windows: calm,
                        entered_instability: false,
                    }
                }
            }
        }
    }
}

/// Freeze the state, remembering where to resume.
///
/// Freezing an already frozen state keeps the original resume point.
pub fn freeze(fast: &mut FastState) {
    if fast.stability != Stability::Frozen {
        fast.pre_freeze = Some(fast.stability);
        fast.stability = Stability::Frozen;
    }
}

/// Return a frozen state to its pre-freeze stability.
///
/// Returns true if the state was frozen.
pub fn thaw(fast: &mut FastState) -> bool {
    if fast.stability != Stability::Frozen {
        return false;
    }
    let resume = match fast.pre_freeze.take() {
        Some(Stability::Unstable) | None => Stability::Recovering,
        Some(state) => state,
    };
    log::debug!("context restored, resuming {}", resume.as_str());
    fast.stability = resume;
    true
}
