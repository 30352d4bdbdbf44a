//! Melon Drop headless runner
//!
//! Plays sessions with a random agent or replays recorded action logs.
//! Rendering front ends drive the same `GameSession` one step per frame.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use melon_drop::GameConfig;
use melon_drop::persistence::{ActionLog, RecordingSession};
use melon_drop::sim::{Action, GameSession, Snapshot};

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
struct CommandArgs {
    /// Game config JSON; missing fields use the defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the final snapshot as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Play a session with a random agent
    Play(PlayArg),
    /// Replay a recorded action log
    Replay(ReplayArg),
}

#[derive(Debug, Clone, Args)]
struct PlayArg {
    /// Session seed (random if omitted)
    #[arg(long)]
    seed: Option<u64>,
    /// Maximum number of steps to play
    #[arg(long, default_value_t = 10_000)]
    frames: u64,
    /// Per-step probability of each movement flag
    #[arg(long, default_value_t = 0.5)]
    move_chance: f64,
    /// Per-step probability of requesting a drop
    #[arg(long, default_value_t = 0.5)]
    drop_chance: f64,
    /// Write the action log here when the session ends
    #[arg(long)]
    record: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct ReplayArg {
    /// Action log to replay
    log: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = CommandArgs::parse();

    let config = match &args.config {
        Some(path) => GameConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => GameConfig::default(),
    };

    let snapshot = match &args.mode {
        Mode::Play(arg) => run_play(arg, config)?,
        Mode::Replay(arg) => run_replay(arg, config)?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    Ok(())
}

fn run_play(arg: &PlayArg, config: GameConfig) -> anyhow::Result<Snapshot> {
    anyhow::ensure!(
        (0.0..=1.0).contains(&arg.move_chance) && (0.0..=1.0).contains(&arg.drop_chance),
        "probabilities must be within 0..=1"
    );
    let seed = arg
        .seed
        .unwrap_or_else(|| rand::rng().random_range(2000..10_000));
    log::info!("Playing seed {} for up to {} steps", seed, arg.frames);

    // The agent draws from its own stream so the session's draws stay
    // identical to a replay of the recorded log
    let mut agent = Pcg32::seed_from_u64(seed.wrapping_add(1));
    let mut recorder = RecordingSession::new(config, seed)?;
    for _ in 0..arg.frames {
        if !recorder.is_running() {
            break;
        }
        let action = Action::new(
            agent.random_bool(arg.move_chance),
            agent.random_bool(arg.move_chance),
            agent.random_bool(arg.drop_chance),
        );
        recorder.update(&action)?;
    }

    let (session, log) = recorder.finish();
    report(&session);
    if let Some(path) = &arg.record {
        log.save(path)
            .with_context(|| format!("failed to write action log {}", path.display()))?;
    }
    Ok(session.snapshot().clone())
}

fn run_replay(arg: &ReplayArg, config: GameConfig) -> anyhow::Result<Snapshot> {
    let log = ActionLog::load(&arg.log)
        .with_context(|| format!("failed to read action log {}", arg.log.display()))?;
    let session = log.replay(config)?;
    if session.time_ticks() < log.len() as u64 {
        log::info!(
            "Session ended after {} of {} logged steps",
            session.time_ticks(),
            log.len()
        );
    }
    report(&session);
    Ok(session.snapshot().clone())
}

fn report(session: &GameSession) {
    println!(
        "seed {} | steps {} | fruit {} | score {} | {}",
        session.seed(),
        session.time_ticks(),
        session.fruits().len(),
        session.score(),
        if session.is_running() { "running" } else { "game over" }
    );
}
