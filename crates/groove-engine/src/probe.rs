//! Probing Scheduler
//!
//! Occasionally trials an alternate arrangement, scores it over a fixed number
//! of stable windows and either commits it into `SlowTraits` or reverts.
//!
//! Counters:
//! - `probe_cooldown_windows` decays by one on every evaluated window
//! - `next_probe_in_windows` decays by one on STABLE windows only
//!
//! Eligibility is judged on the counter values at the start of the window, so
//! a cooldown of `n` blocks exactly `n` windows.

use crate::config::EngineConfig;
use crate::decision::{ProbeAction, ProbeDecision};
use crate::state::{Arrangement, FastState, ProbeTrial, SlowTraits, Stability};

/// Per-window measurements the scheduler scores trials with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeObservation {
    /// Grid deviation of the window (ms)
    pub grid_deviation_ms: f64,
    /// Clamped tempo drift of the window
    pub drift_pct_clamped: f64,
}

/// Trial scheduler
#[derive(Debug, Clone, Copy)]
pub struct ProbeScheduler {
    trial_duration_windows: u32,
    probe_interval_windows: u32,
    probe_cooldown_windows: u32,
    regression_tolerance_ms: f64,
    tempo_bias_smoothing: f64,
    tempo_bias_deadband: f64,
}

impl ProbeScheduler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            trial_duration_windows: config.trial_duration_windows.max(1),
            probe_interval_windows: config.probe_interval_windows,
            probe_cooldown_windows: config.probe_cooldown_windows,
            regression_tolerance_ms: config.regression_tolerance_ms,
            tempo_bias_smoothing: config.tempo_bias_smoothing,
            tempo_bias_deadband: config.tempo_bias_deadband,
        }
    }

    /// Whether a trial may start given the state at the start of a window
    pub fn is_eligible(fast: &FastState, label: Stability) -> bool {
        label == Stability::Stable
            && fast.probe_cooldown_windows == 0
            && fast.next_probe_in_windows == 0
            && !fast.trial_active()
    }

    /// Advance the scheduler by one evaluated window.
    ///
    /// `label` is the stability label emitted for the window. An `Unstable`
    /// label reverts any running trial as part of the corrective action.
    pub fn step(
        &self,
        fast: &mut FastState,
        slow: &mut SlowTraits,
        label: Stability,
        observation: ProbeObservation,
    ) -> ProbeDecision {
        let eligible = Self::is_eligible(fast, label);

        fast.probe_cooldown_windows = fast.probe_cooldown_windows.saturating_sub(1);
        if label == Stability::Stable {
            fast.next_probe_in_windows = fast.next_probe_in_windows.saturating_sub(1);
        }

        match label {
            Stability::Unstable => match fast.active_trial.take() {
                Some(trial) => {
                    log::info!(
                        "instability during trial '{}', reverting to '{}'",
                        trial.candidate.id,
                        trial.previous.id
                    );
                    self.revert(fast, trial)
                }
                None => ProbeDecision::none(),
            },
            Stability::Stable => {
                if let Some(mut trial) = fast.active_trial.take() {
                    trial.windows_run += 1;
                    trial.deviation_sum_ms += observation.grid_deviation_ms;
                    trial.drift_sum += observation.drift_pct_clamped;

                    if trial.windows_run >= self.trial_duration_windows {
                        self.score(fast, slow, trial)
                    } else {
                        fast.active_trial = Some(trial);
                        ProbeDecision::none()
                    }
                } else if eligible {
                    self.start_trial(fast, slow, observation)
                } else {
                    ProbeDecision::none()
                }
            }
            Stability::Recovering | Stability::Frozen => ProbeDecision::none(),
        }
    }

    /// Pick the next candidate from the pool.
    ///
    /// The current arrangement is never a candidate, and neither is the last
    /// committed one while anything else is left. Once a probe has committed
    /// and the learned tempo bias is outside the deadband, the candidate is
    /// steered by density: a rushing player (positive bias) gets the sparsest
    /// arrangement below the current density, a dragging one the densest
    /// above it. Otherwise candidates rotate round-robin from `trial_cursor`.
    pub fn next_candidate(
        &self,
        fast: &FastState,
        slow: &SlowTraits,
    ) -> Option<(usize, Arrangement)> {
        let len = slow.trial_pool.len();
        if len == 0 {
            return None;
        }

        let current = &fast.current_arrangement;
        let start = fast.trial_cursor as usize % len;
        let rotation: Vec<usize> = (0..len)
            .map(|offset| (start + offset) % len)
            .filter(|&i| slow.trial_pool[i].id != current.id)
            .collect();

        let last_probed = slow.last_probed.as_ref().map(|a| a.id.as_str());
        let fresh: Vec<usize> = rotation
            .iter()
            .copied()
            .filter(|&i| Some(slow.trial_pool[i].id.as_str()) != last_probed)
            .collect();
        let order = if fresh.is_empty() { rotation } else { fresh };

        let biased =
            slow.committed_probes > 0 && slow.tempo_bias.abs() > self.tempo_bias_deadband;
        let steered = if biased {
            let rushing = slow.tempo_bias > 0.0;
            let density = |i: &usize| slow.trial_pool[*i].density;
            let toward = order.iter().copied().filter(|i| {
                if rushing {
                    density(i) < current.density
                } else {
                    density(i) > current.density
                }
            });
            if rushing {
                toward.min_by(|a, b| density(a).total_cmp(&density(b)))
            } else {
                toward.max_by(|a, b| density(a).total_cmp(&density(b)))
            }
        } else {
            None
        };

        steered
            .or_else(|| order.first().copied())
            .map(|i| (i, slow.trial_pool[i].clone()))
    }

    fn start_trial(
        &self,
        fast: &mut FastState,
        slow: &SlowTraits,
        observation: ProbeObservation,
    ) -> ProbeDecision {
        let Some((index, candidate)) = self.next_candidate(fast, slow) else {
            log::debug!("probe eligible but trial pool has no alternative");
            return ProbeDecision::none();
        };

        log::info!(
            "starting trial '{}' (from '{}')",
            candidate.id,
            fast.current_arrangement.id
        );

        fast.trial_cursor = ((index + 1) % slow.trial_pool.len()) as u32;
        let previous = std::mem::replace(&mut fast.current_arrangement, candidate.clone());
        fast.active_trial = Some(ProbeTrial::new(
            candidate.clone(),
            previous,
            observation.grid_deviation_ms,
        ));

        ProbeDecision::with_arrangement(ProbeAction::Trial, candidate)
    }

    fn score(
        &self,
        fast: &mut FastState,
        slow: &mut SlowTraits,
        trial: ProbeTrial,
    ) -> ProbeDecision {
        let mean = trial.mean_deviation_ms();
        let limit = trial.baseline_deviation_ms + self.regression_tolerance_ms;

        if mean <= limit {
            log::info!(
                "committing '{}': mean deviation {:.1} ms <= {:.1} ms",
                trial.candidate.id,
                mean,
                limit
            );
            self.commit(fast, slow, trial)
        } else {
            log::info!(
                "reverting '{}': mean deviation {:.1} ms > {:.1} ms",
                trial.candidate.id,
                mean,
                limit
            );
            self.revert(fast, trial)
        }
    }

    fn commit(
        &self,
        fast: &mut FastState,
        slow: &mut SlowTraits,
        trial: ProbeTrial,
    ) -> ProbeDecision {
        let a = self.tempo_bias_smoothing;
        slow.tempo_bias = (1.0 - a) * slow.tempo_bias + a * trial.mean_drift();
        slow.baseline_arrangement = trial.candidate.clone();
        slow.last_probed = Some(trial.candidate.clone());
        slow.committed_probes = slow.committed_probes.saturating_add(1);

        fast.current_arrangement = trial.candidate.clone();
        fast.next_probe_in_windows = self.probe_interval_windows;

        ProbeDecision::with_arrangement(ProbeAction::Commit, trial.candidate)
    }

    fn revert(&self, fast: &mut FastState, trial: ProbeTrial) -> ProbeDecision {
        fast.current_arrangement = trial.previous.clone();
        fast.probe_cooldown_windows = self.probe_cooldown_windows;

        ProbeDecision::with_arrangement(ProbeAction::Revert, trial.previous)
    }
}
