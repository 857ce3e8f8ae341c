//! Groove Engine
//!
//! Pure orchestration of one window:
//!
//! 1. Validate context (missing/invalid -> FROZEN)
//! 2. Validate events (invalid -> echo previous decision, no mutation)
//! 3. Update stability
//! 4. Tempo drift policy (STABLE / RECOVERING only)
//! 5. Probe scheduler (trials only start on STABLE windows)
//! 6. Assemble the `ControlDecision`
//!
//! The engine holds configuration only. All state comes in through
//! arguments and goes out through the returned [`Evaluation`], so two calls
//! with identical inputs produce identical outputs.

use crate::config::EngineConfig;
use crate::context::{EngineContext, StyleDefaults};
use crate::decision::{ControlDecision, ProbeDecision, TempoDecision};
use crate::probe::{ProbeObservation, ProbeScheduler};
use crate::stability::{self, StabilityPolicy};
use crate::state::{self, FastState, SlowTraits, Stability};
use crate::tempo::{DriftCorrector, TempoEstimate};
use crate::window::{Event, EventDataError, EventWindow, WindowMeta};
use crate::{GrooveError, GrooveResult};

/// How a window was handled
#[derive(Debug, Clone, PartialEq)]
pub enum WindowOutcome {
    /// Window evaluated normally
    Evaluated,
    /// Context absent or malformed; engine froze
    MissingOrInvalidContext(String),
    /// Onsets rejected; previous decision echoed, state untouched
    InvalidEventData(EventDataError),
}

impl WindowOutcome {
    pub fn is_evaluated(&self) -> bool {
        matches!(self, Self::Evaluated)
    }
}

/// Measurements taken from an evaluated window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowDiagnostics {
    /// Grid deviation used for the stability decision (ms)
    pub grid_deviation_ms: f64,
    /// Tempo estimate against the target
    pub tempo: TempoEstimate,
}

/// Output of one engine call
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: ControlDecision,
    /// FastState to persist for the next window
    pub fast: FastState,
    /// SlowTraits to persist for the next window
    pub slow: SlowTraits,
    pub outcome: WindowOutcome,
    /// Present for evaluated windows only
    pub diagnostics: Option<WindowDiagnostics>,
}

/// Adaptive groove control engine
#[derive(Debug, Clone)]
pub struct GrooveEngine {
    config: EngineConfig,
    stability: StabilityPolicy,
    tempo: DriftCorrector,
    probe: ProbeScheduler,
}

impl Default for GrooveEngine {
    fn default() -> Self {
        Self::build(EngineConfig::default())
    }
}

impl GrooveEngine {
    /// Create an engine from a validated configuration
    pub fn new(config: EngineConfig) -> GrooveResult<Self> {
        config
            .validate()
            .map_err(|errors| GrooveError::InvalidConfig(errors.join("; ")))?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        Self {
            stability: StabilityPolicy::new(&config),
            tempo: DriftCorrector::new(&config),
            probe: ProbeScheduler::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Initial state for a session, from the context's prior-state hint
    pub fn hydrate(&self, context: Option<&EngineContext>) -> (FastState, SlowTraits) {
        match context {
            Some(ctx) => state::hydrate(ctx.prior_state_hint.as_ref(), &ctx.style, &self.config),
            None => state::hydrate(None, &StyleDefaults::default(), &self.config),
        }
    }

    /// Evaluate one window of raw onsets
    pub fn evaluate(
        &self,
        fast: &FastState,
        slow: &SlowTraits,
        events: &[Event],
        context: Option<&EngineContext>,
    ) -> Evaluation {
        self.evaluate_with_meta(fast, slow, events, WindowMeta::default(), context)
    }

    /// Evaluate one window of raw onsets with caller metadata
    pub fn evaluate_with_meta(
        &self,
        fast: &FastState,
        slow: &SlowTraits,
        events: &[Event],
        meta: WindowMeta,
        context: Option<&EngineContext>,
    ) -> Evaluation {
        let context = match context {
            None => return self.freeze(fast, slow, "engine context missing".to_string()),
            Some(ctx) => match ctx.validate(&self.config) {
                Ok(()) => ctx,
                Err(e) => return self.freeze(fast, slow, e.to_string()),
            },
        };

        match EventWindow::ingest_with_meta(events, meta) {
            Ok(window) => self.evaluate_window(fast, slow, &window, context),
            Err(e) => Self::echo(fast, slow, e),
        }
    }

    /// Evaluate an already ingested window against a validated context
    fn evaluate_window(
        &self,
        fast: &FastState,
        slow: &SlowTraits,
        window: &EventWindow,
        context: &EngineContext,
    ) -> Evaluation {
        let mut next = fast.clone();
        let mut next_slow = slow.clone();

        stability::thaw(&mut next);

        let grid_deviation_ms = window.grid_deviation_ms();
        let step = self.stability.step(&next, grid_deviation_ms);
        next.stability = step.next;
        next.consecutive_stable_windows = step.consecutive_stable_windows;

        let estimate = self.tempo.estimate(window, context.tempo_bpm_target);

        let tempo = if step.entered_instability {
            log::info!(
                "hard instability: grid deviation {:.1} ms > {:.1} ms, holding tempo",
                grid_deviation_ms,
                self.stability.threshold_ms()
            );
            next.drift_accum = 0.0;
            TempoDecision::freeze()
        } else if step.label.allows_tempo() {
            let tempo_step = self.tempo.decide(next.drift_accum, &estimate);
            next.drift_accum = tempo_step.drift_accum;
            tempo_step.decision
        } else {
            next.drift_accum = 0.0;
            TempoDecision::freeze()
        };

        let probe = self.probe.step(
            &mut next,
            &mut next_slow,
            step.label,
            ProbeObservation {
                grid_deviation_ms,
                drift_pct_clamped: estimate.drift_pct_clamped,
            },
        );

        log::debug!(
            "window {:?}: {} dev={:.1}ms bpm={:.2} tempo={:?}({:+.4}) probe={:?} accum={:+.4}",
            window.meta().index,
            step.label.as_str(),
            grid_deviation_ms,
            estimate.estimated_bpm,
            tempo.policy,
            tempo.nudge_strength,
            probe.action,
            next.drift_accum
        );

        let decision = ControlDecision {
            tempo,
            probe,
            stability: step.label,
            corrective: step.entered_instability,
        };

        debug_assert!(
            decision.tempo.within_bounds(),
            "tempo decision out of bounds: {:?}",
            decision.tempo
        );
        debug_assert!(
            next.drift_accum.abs() <= self.config.drift_correct_threshold,
            "drift_accum out of bounds: {}",
            next.drift_accum
        );

        next.last_tempo = decision.tempo;
        next.last_label = decision.stability;

        Evaluation {
            decision,
            fast: next,
            slow: next_slow,
            outcome: WindowOutcome::Evaluated,
            diagnostics: Some(WindowDiagnostics {
                grid_deviation_ms,
                tempo: estimate,
            }),
        }
    }

    /// Missing or invalid context: freeze, reset drift, suppress tempo and probe
    pub(crate) fn freeze(&self, fast: &FastState, slow: &SlowTraits, reason: String) -> Evaluation {
        log::warn!("freezing: {}", reason);

        let mut next = fast.clone();
        stability::freeze(&mut next);
        next.drift_accum = 0.0;

        let decision = ControlDecision::frozen();
        next.last_tempo = decision.tempo;
        next.last_label = Stability::Frozen;

        Evaluation {
            decision,
            fast: next,
            slow: slow.clone(),
            outcome: WindowOutcome::MissingOrInvalidContext(reason),
            diagnostics: None,
        }
    }

    /// Invalid onsets: echo the previous decision, mutate nothing
    pub(crate) fn echo(fast: &FastState, slow: &SlowTraits, error: EventDataError) -> Evaluation {
        log::debug!("skipping window: {}", error);

        Evaluation {
            decision: ControlDecision {
                tempo: fast.last_tempo,
                probe: ProbeDecision::none(),
                stability: fast.last_label,
                corrective: false,
            },
            fast: fast.clone(),
            slow: slow.clone(),
            outcome: WindowOutcome::InvalidEventData(error),
            diagnostics: None,
        }
    }
}
