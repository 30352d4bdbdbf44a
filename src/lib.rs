//! Melon Drop - a physics fruit-merging arcade game
//!
//! Core modules:
//! - `sim`: Deterministic simulation (physics, merge resolution, game session)
//! - `config`: Data-driven game tuning
//! - `persistence`: Recorded action logs and replay
//! - `error`: Error types shared by the modules above

pub mod config;
pub mod error;
pub mod persistence;
pub mod sim;

pub use config::{GameConfig, TopTierPolicy};
pub use error::{ActionLogError, SimError};

/// Game configuration constants
pub mod consts {
    /// Play field dimensions (y grows downward, floor at `FIELD_HEIGHT`)
    pub const FIELD_WIDTH: f32 = 400.0;
    pub const FIELD_HEIGHT: f32 = 600.0;

    /// Fixed simulation rate; one `update` call advances 1 / FRAME_RATE seconds
    pub const FRAME_RATE: u32 = 60;

    /// Radius of a tier-1 fruit; tier n has radius n * FRUIT_UNIT
    pub const FRUIT_UNIT: f32 = 12.0;
    /// Highest tier a merge can produce
    pub const MAX_TIER: u8 = 11;
    /// Pending fruit are drawn uniformly from tiers 1..=PENDING_TIERS
    pub const PENDING_TIERS: u8 = 3;

    /// Height at which new fruit are dropped
    pub const DROP_HEIGHT: f32 = 100.0;
    /// Fruit whose top edge is above this line count toward the loss timer
    pub const LOSS_HEIGHT: f32 = 160.0;
    /// Horizontal cursor speed (units/s)
    pub const CURSOR_SPEED: f32 = 200.0;

    /// Downward gravity (units/s²)
    pub const GRAVITY: f32 = 1000.0;
    /// Half-thickness of the floor and walls
    pub const WALL_RADIUS: f32 = 10.0;
    pub const WALL_FRICTION: f32 = 1.0;
    pub const FRUIT_ELASTICITY: f32 = 0.2;
    /// Fruit surfaces are frictionless by default; combined by multiplication
    pub const FRUIT_FRICTION: f32 = 0.0;
    /// Share of each contact's total impulse fed back by the post-solve handlers
    pub const CONTACT_DAMPING: f32 = 0.1;
}

/// Triangular number n(n+1)/2
#[inline]
pub fn triangular(n: u64) -> u64 {
    n * (n + 1) / 2
}
