//! # Adaptive Groove Control Engine
//!
//! Deterministic, per-window decision engine that watches a performer's
//! note-onset timing and decides how an automatic accompanist should adapt.
//!
//! ## Architecture
//!
//! - **Window**: Onset timestamps grouped into one bounded evaluation window
//! - **State**: FastState (per-window) and SlowTraits (session-scale)
//! - **Stability**: STABLE / UNSTABLE / RECOVERING / FROZEN with hysteresis
//! - **Tempo**: Median-IOI tempo estimate, drift accumulation, bounded correction
//! - **Probe**: Sparse, scored arrangement trials (commit or revert)
//! - **Engine**: Pure orchestration `(state, window, context) -> (decision, state')`
//!
//! ## Ownership of output dimensions
//!
//! The tempo policy owns `ControlDecision::tempo` and `drift_accum`. The probe
//! scheduler owns `ControlDecision::probe`, `current_arrangement` and both probe
//! counters. The stability policy owns the stability label and the hysteresis
//! counter. No two policies write the same field within one window.

pub mod config;
pub mod context;
pub mod decision;
pub mod engine;
pub mod fixture;
pub mod probe;
pub mod session;
pub mod snapshot;
pub mod stability;
pub mod state;
pub mod tempo;
pub mod window;

pub use config::*;
pub use context::*;
pub use decision::*;
pub use engine::*;
pub use fixture::*;
pub use probe::*;
pub use session::*;
pub use snapshot::*;
pub use stability::*;
pub use state::*;
pub use tempo::*;
pub use window::*;

use thiserror::Error;

/// Groove engine error types
///
/// Only loading and construction fail with these. Per-window problems
/// (missing context, bad onsets) are reported through [`WindowOutcome`].
#[derive(Debug, Error)]
pub enum GrooveError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid context: {0}")]
    InvalidContext(String),

    #[error("Invalid fixture: {0}")]
    InvalidFixture(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type GrooveResult<T> = Result<T, GrooveError>;

/// Absolute bound on any emitted nudge strength
pub const MAX_NUDGE_STRENGTH: f64 = 0.30;

/// Bound on nudge strength while following the player
pub const MAX_FOLLOW_NUDGE: f64 = 0.05;

/// Minimum number of onsets for a usable window
pub const MIN_WINDOW_EVENTS: usize = 2;

/// Nominal window span bounds (ms)
pub const MIN_WINDOW_SPAN_MS: f64 = 10_000.0;
pub const MAX_WINDOW_SPAN_MS: f64 = 30_000.0;
