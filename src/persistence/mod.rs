//! Recorded sessions
//!
//! A session is fully determined by its seed and the action taken on each
//! step, so persisting those two is enough to replay it exactly.
//! - `action_log`: plain-text log format and replay
//! - `recording`: wrapper that records actions while playing

pub mod action_log;
pub mod recording;

pub use action_log::ActionLog;
pub use recording::RecordingSession;
