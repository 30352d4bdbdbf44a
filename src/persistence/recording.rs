//! Recording wrapper around a game session

use std::ops::Deref;

use super::action_log::ActionLog;
use crate::config::GameConfig;
use crate::error::SimError;
use crate::sim::{Action, GameSession, RapierWorld, PhysicsWorld, Snapshot};

/// A [`GameSession`] that logs every action it is stepped with.
///
/// Only read access to the session is exposed (via `Deref`), so every
/// state change goes through [`RecordingSession::update`] and is recorded.
#[derive(Debug)]
pub struct RecordingSession<W: PhysicsWorld = RapierWorld> {
    session: GameSession<W>,
    log: ActionLog,
}

impl<W: PhysicsWorld> Deref for RecordingSession<W> {
    type Target = GameSession<W>;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl RecordingSession<RapierWorld> {
    pub fn new(config: GameConfig, seed: u64) -> Result<Self, SimError> {
        Ok(Self::wrap(GameSession::new(config, seed)?))
    }
}

impl<W: PhysicsWorld> RecordingSession<W> {
    /// Start recording a session that has not been stepped yet
    pub fn wrap(session: GameSession<W>) -> Self {
        let log = ActionLog::new(session.seed());
        Self { session, log }
    }

    /// Step the session and record the action
    ///
    /// Actions sent after the game ended are not recorded, since they cannot
    /// affect a replay.
    pub fn update(&mut self, action: &Action) -> Result<&Snapshot, SimError> {
        if self.session.is_running() {
            self.log.push(*action);
        }
        self.session.update(action)
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// Consume the recorder, returning the session and its log
    pub fn finish(self) -> (GameSession<W>, ActionLog) {
        (self.session, self.log)
    }
}
