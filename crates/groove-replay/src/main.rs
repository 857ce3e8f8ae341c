//! Groove Replay
//!
//! Feeds a fixture file of onset windows through the groove engine and prints
//! one JSON line per window.
//!
//! Usage:
//!   groove-replay session.json
//!   groove-replay session.json --config engine.json --state-out state.json
//!   groove-replay next.json --state-in state.json --pretty

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use groove_engine::{
    ControlDecision, EngineConfig, EngineSnapshot, GrooveEngine, Session, SessionFixture,
    SessionStep, StyleDefaults, WindowOutcome, hydrate,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "groove-replay", about = "Replay onset windows through the groove engine")]
struct Cli {
    /// Fixture file (single window, array of windows, or `{ "windows": [...] }`)
    fixture: PathBuf,

    /// Engine configuration JSON (overrides any config in the fixture)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resume from a saved state snapshot instead of hydrating
    #[arg(long)]
    state_in: Option<PathBuf>,

    /// Write the final state snapshot here
    #[arg(long)]
    state_out: Option<PathBuf>,

    /// Pretty-print each line
    #[arg(long)]
    pretty: bool,
}

/// One output line
#[derive(Serialize)]
struct ReplayLine<'a> {
    window: u64,
    outcome: String,
    #[serde(flatten)]
    decision: &'a ControlDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    grid_deviation_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimated_bpm: Option<f64>,
}

impl<'a> ReplayLine<'a> {
    fn from_step(step: &'a SessionStep) -> Self {
        let outcome = match &step.outcome {
            WindowOutcome::Evaluated => "evaluated".to_string(),
            WindowOutcome::MissingOrInvalidContext(reason) => format!("frozen: {}", reason),
            WindowOutcome::InvalidEventData(e) => format!("skipped: {}", e),
        };

        Self {
            window: step.window,
            outcome,
            decision: &step.decision,
            grid_deviation_ms: step.diagnostics.map(|d| d.grid_deviation_ms),
            estimated_bpm: step.diagnostics.map(|d| d.tempo.estimated_bpm),
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let fixture = load_fixture(&cli.fixture)?;
    let engine = build_engine(cli.config.as_deref(), &fixture)?;
    let mut session = open_session(engine, &fixture, cli.state_in.as_deref())?;

    log::info!(
        "replaying {} window(s) from {}",
        fixture.windows.len(),
        cli.fixture.display()
    );

    for window in &fixture.windows {
        let step = session.push_fixture(window);
        let line = ReplayLine::from_step(&step);
        let json = if cli.pretty {
            serde_json::to_string_pretty(&line)?
        } else {
            serde_json::to_string(&line)?
        };
        println!("{}", json);
    }

    if let Some(path) = &cli.state_out {
        let json = session.snapshot().to_json()?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write state to {}", path.display()))?;
        log::info!("state written to {}", path.display());
    }

    Ok(())
}

fn load_fixture(path: &Path) -> Result<SessionFixture> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture {}", path.display()))?;
    SessionFixture::from_json(&json)
        .with_context(|| format!("Failed to parse fixture {}", path.display()))
}

fn build_engine(config_path: Option<&Path>, fixture: &SessionFixture) -> Result<GrooveEngine> {
    let config = match config_path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            EngineConfig::from_json(&json)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => fixture.config.clone().unwrap_or_default(),
    };
    Ok(GrooveEngine::new(config)?)
}

fn open_session(
    engine: GrooveEngine,
    fixture: &SessionFixture,
    state_in: Option<&Path>,
) -> Result<Session> {
    if let Some(path) = state_in {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state {}", path.display()))?;
        let snapshot = EngineSnapshot::from_json(&json)
            .with_context(|| format!("Failed to load state {}", path.display()))?;
        return Ok(Session::from_snapshot(engine, snapshot));
    }

    let style = fixture
        .first_context()
        .map(|ctx| ctx.style)
        .unwrap_or_else(StyleDefaults::default);
    let hint = fixture.first_hint();
    let (fast, slow) = hydrate(hint.as_ref(), &style, engine.config());
    Ok(Session::with_state(engine, fast, slow))
}
