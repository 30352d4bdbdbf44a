//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (fruit in insertion order, bodies by handle)
//! - No rendering or platform dependencies

pub mod fruit;
pub mod physics;
pub mod snapshot;
pub mod state;
pub mod tick;
pub mod world;

pub use fruit::{Fruit, MERGE_TOLERANCE, MergeCheck, Tier};
pub use physics::{
    Arbiter, ArbiterImpulse, BodyDesc, BodyHandle, CollisionType, PhysicsWorld, PostSolve,
    StaticSegment,
};
pub use snapshot::{FruitView, Snapshot};
pub use state::{GameEvent, GamePhase, GameSession};
pub use tick::Action;
pub use world::RapierWorld;
