//! Physics world contract
//!
//! The game session only talks to physics through [`PhysicsWorld`], so any
//! rigid-body engine can sit behind it. [`super::world::RapierWorld`] is the
//! default backend.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Opaque handle to a body registered with a physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyHandle(pub(crate) u32);

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tag used to select post-solve handlers for a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionType {
    Fruit,
    Ground,
}

/// A dynamic body together with its circle shape
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    pub position: Vec2,
    pub radius: f32,
    pub mass: f32,
    pub moment: f32,
    pub elasticity: f32,
    pub friction: f32,
    pub collision_type: CollisionType,
}

impl BodyDesc {
    /// Solid disc whose mass is radius squared
    pub fn disc(position: Vec2, radius: f32) -> Self {
        let mass = radius * radius;
        Self {
            position,
            radius,
            mass,
            moment: moment_for_disc(mass, radius),
            elasticity: 0.0,
            friction: 0.0,
            collision_type: CollisionType::Fruit,
        }
    }

    pub fn with_elasticity(mut self, elasticity: f32) -> Self {
        self.elasticity = elasticity;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_collision_type(mut self, collision_type: CollisionType) -> Self {
        self.collision_type = collision_type;
        self
    }
}

/// Moment of inertia of a solid disc about its center
#[inline]
pub fn moment_for_disc(mass: f32, radius: f32) -> f32 {
    0.5 * mass * radius * radius
}

/// Immovable boundary geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticSegment {
    pub a: Vec2,
    pub b: Vec2,
    /// Thickness radius around the segment
    pub radius: f32,
    pub friction: f32,
    pub elasticity: f32,
    pub collision_type: CollisionType,
}

/// Contact summary handed to post-solve handlers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arbiter {
    pub type_a: CollisionType,
    pub type_b: CollisionType,
    /// World-space contact point
    pub point: Vec2,
    /// Accumulated impulse the solver applied to `b` (and its negation to `a`)
    pub total_impulse: Vec2,
}

/// Extra impulses a post-solve handler wants applied at the contact point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ArbiterImpulse {
    pub on_a: Vec2,
    pub on_b: Vec2,
}

/// Post-solve handler, run once per contact after the solver finishes
pub type PostSolve = fn(Arbiter) -> ArbiterImpulse;

/// Everything the game session needs from a rigid-body engine
pub trait PhysicsWorld {
    fn set_gravity(&mut self, gravity: Vec2);

    /// Register a body and its shape as one unit
    fn add_body(&mut self, desc: &BodyDesc) -> BodyHandle;

    /// Unregister a body and its shape; returns false for unknown handles
    fn remove_body(&mut self, handle: BodyHandle) -> bool;

    fn add_static_segment(&mut self, segment: StaticSegment);

    /// Install a handler for contacts between the two collision types
    fn add_collision_handler(&mut self, a: CollisionType, b: CollisionType, post_solve: PostSolve);

    fn position(&self, handle: BodyHandle) -> Option<Vec2>;

    fn body_count(&self) -> usize;

    /// Advance the simulation by one fixed timestep
    fn step(&mut self, dt: f32) -> Result<(), SimError>;
}

/// A world that registers bodies but never moves them
///
/// Used to exercise merge and loss rules with exact positions.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct FrozenWorld {
    bodies: Vec<(BodyHandle, Vec2)>,
    next_handle: u32,
    pub steps: u32,
    pub segments: usize,
    pub handlers: usize,
}

#[cfg(test)]
impl PhysicsWorld for FrozenWorld {
    fn set_gravity(&mut self, _gravity: Vec2) {}

    fn add_body(&mut self, desc: &BodyDesc) -> BodyHandle {
        self.next_handle += 1;
        let handle = BodyHandle(self.next_handle);
        self.bodies.push((handle, desc.position));
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) -> bool {
        let before = self.bodies.len();
        self.bodies.retain(|(h, _)| *h != handle);
        self.bodies.len() != before
    }

    fn add_static_segment(&mut self, _segment: StaticSegment) {
        self.segments += 1;
    }

    fn add_collision_handler(&mut self, _a: CollisionType, _b: CollisionType, _f: PostSolve) {
        self.handlers += 1;
    }

    fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        self.bodies.iter().find(|(h, _)| *h == handle).map(|(_, p)| *p)
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn step(&mut self, dt: f32) -> Result<(), SimError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimError::InvalidTimestep(dt));
        }
        self.steps += 1;
        Ok(())
    }
}
