//! Tempo Drift Estimator / Corrector
//!
//! Estimates the player's tempo from the median inter-onset interval,
//! accumulates clamped per-window drift against the target tempo and decides
//! between gentle following and a single bounded correction:
//!
//! ```text
//! estimated_bpm = 60000 / median_ioi_ms
//! drift_pct     = (estimated_bpm - target_bpm) / target_bpm      clamped to ±drift_clamp
//! drift_accum  += drift_pct_clamped
//! |drift_accum| > threshold  => correct_drift(clamp(drift_accum, ±nudge_limit)), accum = 0
//! otherwise                  => follow_player(drift_pct_clamped)
//! ```

use crate::config::EngineConfig;
use crate::decision::TempoDecision;
use crate::window::EventWindow;

/// Tempo estimate for one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEstimate {
    /// Median inter-onset interval (ms)
    pub median_ioi_ms: f64,
    /// Player tempo (BPM)
    pub estimated_bpm: f64,
    /// Raw drift against the target (fraction)
    pub drift_pct: f64,
    /// Drift clamped to the per-window bound
    pub drift_pct_clamped: f64,
}

/// Result of one tempo policy run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoStep {
    pub decision: TempoDecision,
    /// Accumulator persisted for the next window
    pub drift_accum: f64,
}

/// Drift accumulation and correction policy
#[derive(Debug, Clone, Copy)]
pub struct DriftCorrector {
    drift_clamp: f64,
    correct_threshold: f64,
    nudge_limit: f64,
}

impl DriftCorrector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            drift_clamp: config.drift_clamp,
            correct_threshold: config.drift_correct_threshold,
            nudge_limit: config.nudge_limit,
        }
    }

    /// Estimate the player's tempo and its drift from the target
    pub fn estimate(&self, window: &EventWindow, target_bpm: f64) -> TempoEstimate {
        let median_ioi_ms = window.median_ioi_ms();
        let estimated_bpm = 60000.0 / median_ioi_ms;
        let drift_pct = (estimated_bpm - target_bpm) / target_bpm;
        let drift_pct_clamped = drift_pct.clamp(-self.drift_clamp, self.drift_clamp);

        TempoEstimate {
            median_ioi_ms,
            estimated_bpm,
            drift_pct,
            drift_pct_clamped,
        }
    }

    /// Accumulate drift and pick follow vs. correct
    pub fn decide(&self, drift_accum: f64, estimate: &TempoEstimate) -> TempoStep {
        let accum = drift_accum + estimate.drift_pct_clamped;

        let step = if accum.abs() > self.correct_threshold {
            let nudge = accum.clamp(-self.nudge_limit, self.nudge_limit);
            log::info!(
                "drift correction: accum {:+.4} -> nudge {:+.4} (player {:.2} BPM)",
                accum,
                nudge,
                estimate.estimated_bpm
            );
            TempoStep {
                decision: TempoDecision::correct(nudge),
                drift_accum: 0.0,
            }
        } else {
            TempoStep {
                decision: TempoDecision::follow(estimate.drift_pct_clamped),
                drift_accum: accum,
            }
        };

        debug_assert!(
            step.decision.within_bounds(),
            "nudge out of bounds: {:?}",
            step.decision
        );
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::TempoPolicy;
    use crate::window::events_from_ms;

    fn window(onsets: &[f64]) -> EventWindow {
        EventWindow::ingest(&events_from_ms(onsets)).unwrap()
    }

    fn run(
        corrector: &DriftCorrector,
        window: &EventWindow,
        drift_accum: f64,
    ) -> (TempoEstimate, TempoStep) {
        let estimate = corrector.estimate(window, 100.0);
        let step = corrector.decide(drift_accum, &estimate);
        (estimate, step)
    }

    #[test]
    fn test_small_drift_follows() {
        let corrector = DriftCorrector::new(&EngineConfig::default());
        let (estimate, step) = run(&corrector, &window(&[0.0, 610.0, 1220.0]), 0.0);

        assert!((estimate.median_ioi_ms - 610.0).abs() < 1e-9);
        assert!((estimate.estimated_bpm - 98.3607).abs() < 1e-3);
        assert!((estimate.drift_pct + 0.016393).abs() < 1e-5);
        assert_eq!(step.decision.policy, TempoPolicy::FollowPlayer);
        assert!((step.decision.nudge_strength - estimate.drift_pct).abs() < 1e-12);
        assert!((step.drift_accum - estimate.drift_pct).abs() < 1e-12);
    }

    #[test]
    fn test_large_drift_is_clamped_then_corrected() {
        let corrector = DriftCorrector::new(&EngineConfig::default());
        let (estimate, step) = run(&corrector, &window(&[0.0, 750.0, 1500.0]), 0.0);

        assert!((estimate.estimated_bpm - 80.0).abs() < 1e-9);
        assert!((estimate.drift_pct + 0.20).abs() < 1e-9);
        assert!((estimate.drift_pct_clamped + 0.05).abs() < 1e-12);
        assert_eq!(step.decision.policy, TempoPolicy::CorrectDrift);
        assert!((step.decision.nudge_strength + 0.05).abs() < 1e-12);
        assert_eq!(step.drift_accum, 0.0);
    }

    #[test]
    fn test_accumulates_until_threshold() {
        let corrector = DriftCorrector::new(&EngineConfig::default());
        // 60000 / 588 = 102.04 BPM at target 100 -> +2.04% per window
        let w = window(&[0.0, 588.0, 1176.0]);

        let (_, first) = run(&corrector, &w, 0.0);
        assert_eq!(first.decision.policy, TempoPolicy::FollowPlayer);

        let (_, second) = run(&corrector, &w, first.drift_accum);
        assert_eq!(second.decision.policy, TempoPolicy::CorrectDrift);
        assert!((second.decision.nudge_strength - 2.0 * first.drift_accum).abs() < 1e-12);
        assert_eq!(second.drift_accum, 0.0);
    }

    #[test]
    fn test_opposing_drift_cancels() {
        let corrector = DriftCorrector::new(&EngineConfig::default());
        let fast = window(&[0.0, 588.0, 1176.0]);
        let slow = window(&[0.0, 612.0, 1224.0]);

        let (_, a) = run(&corrector, &fast, 0.0);
        let (_, b) = run(&corrector, &slow, a.drift_accum);
        assert_eq!(b.decision.policy, TempoPolicy::FollowPlayer);
        assert!(b.drift_accum.abs() < 0.005);
    }

    #[test]
    fn test_on_target_is_zero_nudge() {
        let corrector = DriftCorrector::new(&EngineConfig::default());
        let (_, step) = run(&corrector, &window(&[0.0, 600.0, 1200.0, 1800.0]), 0.0);
        assert_eq!(step.decision, TempoDecision::follow(0.0));
    }
}
