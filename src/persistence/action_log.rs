//! Plain-text action logs
//!
//! Layout: the first line holds the integer seed, every following line one
//! step's `move_left`, `move_right`, `drop` flags as `0`/`1`:
//!
//! ```text
//! 4821
//! 000
//! 101
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::error::{ActionLogError, SimError};
use crate::sim::{Action, GameSession, RapierWorld};

/// Seed plus one action per step
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionLog {
    pub seed: u64,
    pub actions: Vec<Action>,
}

impl ActionLog {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Parse the text layout; trailing whitespace and blank lines are ignored
    pub fn parse(text: &str) -> Result<Self, ActionLogError> {
        let mut lines = text.lines().enumerate();

        let seed_line = lines
            .by_ref()
            .map(|(_, line)| line.trim())
            .find(|line| !line.is_empty())
            .ok_or(ActionLogError::MissingSeed)?;
        let seed = seed_line
            .parse::<u64>()
            .map_err(|_| ActionLogError::InvalidSeed(seed_line.to_string()))?;

        let mut actions = Vec::new();
        for (index, line) in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let action = Action::from_flags(line).ok_or_else(|| ActionLogError::InvalidAction {
                line: index + 1,
                value: line.to_string(),
            })?;
            actions.push(action);
        }

        Ok(Self { seed, actions })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ActionLogError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let log = Self::parse(&text)?;
        log::info!(
            "Loaded action log {} (seed {}, {} steps)",
            path.as_ref().display(),
            log.seed,
            log.len()
        );
        Ok(log)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ActionLogError> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        write!(writer, "{self}")?;
        writer.flush()?;
        log::info!(
            "Saved action log {} ({} steps)",
            path.as_ref().display(),
            self.len()
        );
        Ok(())
    }

    /// Replay the log into a fresh session on the built-in physics backend
    ///
    /// Stops early if the session ends before the log does.
    pub fn replay(&self, config: GameConfig) -> Result<GameSession<RapierWorld>, SimError> {
        let mut session = GameSession::new(config, self.seed)?;
        for action in &self.actions {
            if !session.is_running() {
                break;
            }
            session.update(action)?;
        }
        Ok(session)
    }
}

impl fmt::Display for ActionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.seed)?;
        for action in &self.actions {
            writeln!(f, "{action}")?;
        }
        Ok(())
    }
}
