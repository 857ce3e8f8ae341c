//! Fixtures
//!
//! JSON input fixtures as produced by callers:
//!
//! ```json
//! {
//!   "engine_context": { "tempo_bpm_target": 100 },
//!   "events": [ { "t_onset_ms": 0 }, { "t_onset_ms": 610 }, { "t_onset_ms": 1220 } ],
//!   "prior_state_hint": { "next_probe_in_windows": 0 }
//! }
//! ```
//!
//! Context and events are kept as raw JSON until evaluation so that a
//! malformed context freezes the engine and malformed onsets skip the window,
//! instead of failing the whole file.

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::engine::{Evaluation, GrooveEngine};
use crate::state::{FastState, PriorStateHint, SlowTraits};
use crate::window::{Event, EventDataError, WindowMeta};
use crate::{GrooveError, GrooveResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One window as supplied by a caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowFixture {
    /// Raw engine context (`null` or absent means missing)
    #[serde(default)]
    pub engine_context: Option<Value>,
    /// Raw onset entries
    #[serde(default)]
    pub events: Vec<Value>,
    /// Partial prior state, used at hydration only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_state_hint: Option<PriorStateHint>,
    /// Caller's window sequence number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_index: Option<u64>,
}

impl WindowFixture {
    /// Build a fixture from typed values
    pub fn new(context: Option<&EngineContext>, events: &[Event]) -> GrooveResult<Self> {
        Ok(Self {
            engine_context: context.map(serde_json::to_value).transpose()?,
            events: events
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<_, _>>()?,
            prior_state_hint: None,
            window_index: None,
        })
    }

    /// Typed context, or the reason it is unusable
    pub fn context(&self) -> Result<EngineContext, String> {
        match &self.engine_context {
            None | Some(Value::Null) => Err("engine context missing".to_string()),
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| format!("malformed engine context: {}", e)),
        }
    }

    /// Typed onsets; entries without a numeric `t_onset_ms` are malformed
    pub fn events(&self) -> Result<Vec<Event>, EventDataError> {
        self.events
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                raw.get("t_onset_ms")
                    .and_then(Value::as_f64)
                    .map(Event::at)
                    .ok_or(EventDataError::Malformed { index })
            })
            .collect()
    }

    /// Hint for hydration: the top-level hint wins over the context's
    pub fn hint(&self) -> Option<PriorStateHint> {
        self.prior_state_hint
            .clone()
            .or_else(|| self.context().ok().and_then(|c| c.prior_state_hint))
    }

    fn meta(&self) -> WindowMeta {
        WindowMeta {
            index: self.window_index,
            source: None,
        }
    }
}

/// A sequence of windows for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionFixture {
    /// Engine configuration override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<EngineConfig>,
    /// Windows in causal order
    #[serde(default)]
    pub windows: Vec<WindowFixture>,
}

impl SessionFixture {
    /// Parse a session file.
    ///
    /// Accepts `{ "windows": [...] }`, a bare array of windows, or a single
    /// window object.
    pub fn from_json(json: &str) -> GrooveResult<Self> {
        let raw: Value = serde_json::from_str(json)?;

        let fixture = match raw {
            Value::Array(_) => Self {
                config: None,
                windows: serde_json::from_value(raw)?,
            },
            Value::Object(ref map) if map.contains_key("windows") => serde_json::from_value(raw)?,
            Value::Object(_) => Self {
                config: None,
                windows: vec![serde_json::from_value(raw)?],
            },
            _ => {
                return Err(GrooveError::InvalidFixture(
                    "fixture must be an object or an array of windows".to_string(),
                ));
            }
        };

        if let Some(config) = &fixture.config {
            config
                .validate()
                .map_err(|errors| GrooveError::InvalidConfig(errors.join("; ")))?;
        }

        Ok(fixture)
    }

    pub fn to_json(&self) -> GrooveResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Context of the first window that has a usable one
    pub fn first_context(&self) -> Option<EngineContext> {
        self.windows.iter().find_map(|w| w.context().ok())
    }

    /// Hint of the first window that carries one
    pub fn first_hint(&self) -> Option<PriorStateHint> {
        self.windows.iter().find_map(WindowFixture::hint)
    }
}

impl GrooveEngine {
    /// Evaluate a raw caller fixture
    pub fn evaluate_fixture(
        &self,
        fast: &FastState,
        slow: &SlowTraits,
        fixture: &WindowFixture,
    ) -> Evaluation {
        let context = match fixture.context() {
            Ok(ctx) => ctx,
            Err(reason) => return self.freeze(fast, slow, reason),
        };

        match fixture.events() {
            Ok(events) => {
                self.evaluate_with_meta(fast, slow, &events, fixture.meta(), Some(&context))
            }
            Err(e) => match context.validate(self.config()) {
                Ok(()) => Self::echo(fast, slow, e),
                Err(reason) => self.freeze(fast, slow, reason.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::TempoPolicy;
    use crate::engine::WindowOutcome;
    use crate::state::Stability;

    const SCENARIO_A: &str = r#"{
        "engine_context": { "tempo_bpm_target": 100 },
        "events": [ { "t_onset_ms": 0 }, { "t_onset_ms": 610 }, { "t_onset_ms": 1220 } ],
        "prior_state_hint": { "next_probe_in_windows": 3 }
    }"#;

    #[test]
    fn test_single_window_fixture() {
        let session = SessionFixture::from_json(SCENARIO_A).unwrap();
        assert_eq!(session.windows.len(), 1);

        let window = &session.windows[0];
        assert_eq!(window.context().unwrap().tempo_bpm_target, 100.0);
        assert_eq!(window.events().unwrap().len(), 3);
        assert_eq!(
            session.first_hint().and_then(|h| h.next_probe_in_windows),
            Some(3)
        );
    }

    #[test]
    fn test_array_and_object_forms() {
        let array = format!("[{}, {}]", SCENARIO_A, SCENARIO_A);
        assert_eq!(SessionFixture::from_json(&array).unwrap().windows.len(), 2);

        let object = format!(
            r#"{{ "config": {{ "hysteresis_windows": 2 }}, "windows": [{}] }}"#,
            SCENARIO_A
        );
        let session = SessionFixture::from_json(&object).unwrap();
        assert_eq!(session.config.unwrap().hysteresis_windows, 2);

        assert!(matches!(
            SessionFixture::from_json("42"),
            Err(GrooveError::InvalidFixture(_))
        ));
    }

    #[test]
    fn test_null_context_freezes() {
        let fixture: WindowFixture = serde_json::from_str(
            r#"{ "engine_context": null,
                 "events": [ { "t_onset_ms": 0 }, { "t_onset_ms": 500 } ] }"#,
        )
        .unwrap();
        let engine = GrooveEngine::default();
        let eval = engine.evaluate_fixture(&FastState::default(), &SlowTraits::default(), &fixture);

        assert_eq!(eval.decision.stability, Stability::Frozen);
        assert_eq!(eval.decision.tempo.policy, TempoPolicy::Freeze);
    }

    #[test]
    fn test_malformed_context_freezes() {
        let fixture: WindowFixture = serde_json::from_str(
            r#"{ "engine_context": { "tempo": "fast" }, "events": [] }"#,
        )
        .unwrap();
        let engine = GrooveEngine::default();
        let eval = engine.evaluate_fixture(&FastState::default(), &SlowTraits::default(), &fixture);

        match eval.outcome {
            WindowOutcome::MissingOrInvalidContext(reason) => assert!(reason.contains("malformed")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_malformed_events_skip_window() {
        let fixture: WindowFixture = serde_json::from_str(
            r#"{ "engine_context": { "tempo_bpm_target": 90 },
                 "events": [ { "t_onset_ms": 0 }, { "t_onset_ms": "late" } ] }"#,
        )
        .unwrap();
        assert_eq!(
            fixture.events(),
            Err(EventDataError::Malformed { index: 1 })
        );

        let engine = GrooveEngine::default();
        let fast = FastState::default();
        let eval = engine.evaluate_fixture(&fast, &SlowTraits::default(), &fixture);
        assert_eq!(
            eval.outcome,
            WindowOutcome::InvalidEventData(EventDataError::Malformed { index: 1 })
        );
        assert_eq!(eval.fast, fast);
    }

    #[test]
    fn test_typed_round_trip_into_fixture() {
        let ctx = EngineContext::new(120.0);
        let fixture = WindowFixture::new(Some(&ctx), &[Event::at(0.0), Event::at(500.0)]).unwrap();
        assert_eq!(fixture.context().unwrap(), ctx);
        assert_eq!(fixture.events().unwrap(), vec![Event::at(0.0), Event::at(500.0)]);
    }
}
