//! Session
//!
//! Caller-side convenience that threads state through successive windows of
//! one voice. Each session owns its own state; nothing is shared between
//! sessions, so independent sessions need no locking.

use crate::context::EngineContext;
use crate::decision::ControlDecision;
use crate::engine::{Evaluation, GrooveEngine, WindowDiagnostics, WindowOutcome};
use crate::fixture::WindowFixture;
use crate::snapshot::EngineSnapshot;
use crate::state::{FastState, SlowTraits};
use crate::window::Event;

/// Result of feeding one window to a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStep {
    /// Position of the window in the session (0-based)
    pub window: u64,
    pub decision: ControlDecision,
    pub outcome: WindowOutcome,
    pub diagnostics: Option<WindowDiagnostics>,
}

/// One voice's evaluation session
#[derive(Debug, Clone)]
pub struct Session {
    engine: GrooveEngine,
    fast: FastState,
    slow: SlowTraits,
    windows_seen: u64,
}

impl Session {
    /// Start a session, hydrating from the context's prior-state hint
    pub fn new(engine: GrooveEngine, context: Option<&EngineContext>) -> Self {
        let (fast, slow) = engine.hydrate(context);
        Self::with_state(engine, fast, slow)
    }

    /// Start a session from explicit state
    pub fn with_state(engine: GrooveEngine, fast: FastState, slow: SlowTraits) -> Self {
        Self {
            engine,
            fast,
            slow,
            windows_seen: 0,
        }
    }

    /// Resume from a persisted snapshot
    pub fn from_snapshot(engine: GrooveEngine, snapshot: EngineSnapshot) -> Self {
        let (fast, slow) = snapshot.into_state();
        Self::with_state(engine, fast, slow)
    }

    /// Evaluate the next window of onsets
    pub fn push(&mut self, events: &[Event], context: Option<&EngineContext>) -> SessionStep {
        let eval = self.engine.evaluate(&self.fast, &self.slow, events, context);
        self.accept(eval)
    }

    /// Evaluate the next raw fixture window
    pub fn push_fixture(&mut self, fixture: &WindowFixture) -> SessionStep {
        let eval = self.engine.evaluate_fixture(&self.fast, &self.slow, fixture);
        self.accept(eval)
    }

    fn accept(&mut self, eval: Evaluation) -> SessionStep {
        let Evaluation {
            decision,
            fast,
            slow,
            outcome,
            diagnostics,
        } = eval;

        self.fast = fast;
        self.slow = slow;
        let window = self.windows_seen;
        self.windows_seen += 1;

        SessionStep {
            window,
            decision,
            outcome,
            diagnostics,
        }
    }

    pub fn engine(&self) -> &GrooveEngine {
        &self.engine
    }

    pub fn fast(&self) -> &FastState {
        &self.fast
    }

    pub fn slow(&self) -> &SlowTraits {
        &self.slow
    }

    /// Windows fed so far, including skipped ones
    pub fn windows_seen(&self) -> u64 {
        self.windows_seen
    }

    /// Persistable copy of the current state
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::new(self.fast.clone(), self.slow.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StyleDefaults;
    use crate::decision::{ProbeAction, TempoPolicy};
    use crate::state::{Arrangement, PriorStateHint, Stability};
    use crate::window::events_from_ms;

    fn context() -> EngineContext {
        EngineContext::new(100.0)
            .with_style(StyleDefaults {
                arrangement: Arrangement::new("comp", 0.4),
                trial_pool: vec![Arrangement::new("walking_bass", 0.7)],
            })
            .with_hint(PriorStateHint {
                next_probe_in_windows: Some(1),
                ..Default::default()
            })
    }

    fn steady() -> Vec<crate::window::Event> {
        events_from_ms(&[0.0, 600.0, 1200.0, 1800.0, 2400.0])
    }

    #[test]
    fn test_session_threads_state() {
        let ctx = context();
        let mut session = Session::new(GrooveEngine::default(), Some(&ctx));
        assert_eq!(session.fast().current_arrangement.id, "comp");

        // next_probe 1 -> decays on the first stable window, trial on the second
        let first = session.push(&steady(), Some(&ctx));
        assert_eq!(first.decision.probe.action, ProbeAction::None);
        assert_eq!(session.fast().next_probe_in_windows, 0);

        let second = session.push(&steady(), Some(&ctx));
        assert_eq!(second.window, 1);
        assert_eq!(second.decision.probe.action, ProbeAction::Trial);
        assert_eq!(session.fast().current_arrangement.id, "walking_bass");

        session.push(&steady(), Some(&ctx));
        let commit = session.push(&steady(), Some(&ctx));
        assert_eq!(commit.decision.probe.action, ProbeAction::Commit);
        assert_eq!(session.slow().baseline_arrangement.id, "walking_bass");
        assert_eq!(session.windows_seen(), 4);
    }

    #[test]
    fn test_snapshot_resume_is_equivalent() {
        let ctx = context();
        let mut a = Session::new(GrooveEngine::default(), Some(&ctx));
        a.push(&steady(), Some(&ctx));

        let json = a.snapshot().to_json().unwrap();
        let mut b = Session::from_snapshot(
            GrooveEngine::default(),
            EngineSnapshot::from_json(&json).unwrap(),
        );

        let next = events_from_ms(&[0.0, 610.0, 1220.0, 1830.0]);
        assert_eq!(
            a.push(&next, Some(&ctx)).decision,
            b.push(&next, Some(&ctx)).decision
        );
        assert_eq!(a.fast(), b.fast());
        assert_eq!(a.slow(), b.slow());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let ctx = context();
        let mut a = Session::new(GrooveEngine::default(), Some(&ctx));
        let b = Session::new(GrooveEngine::default(), Some(&ctx));

        let step = a.push(&steady(), None);
        assert_eq!(step.decision.tempo.policy, TempoPolicy::Freeze);
        assert_eq!(a.fast().stability, Stability::Frozen);
        assert_eq!(b.fast().stability, Stability::Stable);
    }
}
