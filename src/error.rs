//! Error types for the simulation and its persistence layer

use thiserror::Error;

use crate::sim::BodyHandle;

/// Errors raised while constructing or stepping a game session.
#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    /// A configuration value was rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The physics world was asked to advance by a non-positive or non-finite step.
    #[error("invalid physics timestep {0}")]
    InvalidTimestep(f32),
    /// A body ended a step with a non-finite position or velocity.
    #[error("physics integration produced a non-finite state for body {0}")]
    Integration(BodyHandle),
    /// The session was stepped after a physics failure ended it.
    #[error("session was aborted by an earlier physics failure")]
    Aborted,
    /// A fruit refers to a body the physics world does not know about.
    #[error("physics body {0} is not registered")]
    UnknownBody(BodyHandle),
}

/// Errors raised while reading a recorded action log.
#[derive(Debug, Error)]
pub enum ActionLogError {
    #[error("failed to access action log: {0}")]
    Io(#[from] std::io::Error),
    #[error("action log is empty, expected a seed on the first line")]
    MissingSeed,
    #[error("line 1: invalid seed {0:?}")]
    InvalidSeed(String),
    #[error("line {line}: invalid action {value:?}, expected three of '0'/'1'")]
    InvalidAction { line: usize, value: String },
}
