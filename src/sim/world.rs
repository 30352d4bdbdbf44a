//! rapier2d physics backend
//!
//! Fruit are dynamic balls and the boundary is fixed capsules. Each step:
//! 1. rapier advances the simulation with the session's fixed dt
//! 2. post-solve handlers see every touching contact pair and its impulse
//! 3. the impulses they return are applied before the next step
//!
//! # Determinism
//!
//! rapier2d is compiled with `enhanced-determinism`. Bodies are tracked in
//! handle order and handlers run in narrow-phase order, so a given sequence
//! of calls always produces the same positions on the same platform.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use glam::Vec2;
use rapier2d::prelude::*;

use super::physics::{
    Arbiter, BodyDesc, BodyHandle, CollisionType, PhysicsWorld, PostSolve, StaticSegment,
};
use crate::error::SimError;

/// Length scale handed to rapier's tolerances, about one small fruit radius
const LENGTH_UNIT: Real = 10.0;

#[inline]
fn to_vec2(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

/// rapier handles backing one registered body
#[derive(Debug, Clone, Copy)]
struct Body {
    rigid: RigidBodyHandle,
    collider: ColliderHandle,
}

fn ball_collider(desc: &BodyDesc) -> Collider {
    ColliderBuilder::ball(desc.radius)
        .mass_properties(MassProperties::new(point![0.0, 0.0], desc.mass, desc.moment))
        .restitution(desc.elasticity)
        .friction(desc.friction)
        .restitution_combine_rule(CoefficientCombineRule::Multiply)
        .friction_combine_rule(CoefficientCombineRule::Multiply)
        .build()
}

fn segment_collider(segment: &StaticSegment) -> Collider {
    let shape = SharedShape::capsule(
        point![segment.a.x, segment.a.y],
        point![segment.b.x, segment.b.y],
        segment.radius,
    );
    ColliderBuilder::new(shape)
        .restitution(segment.elasticity)
        .friction(segment.friction)
        .restitution_combine_rule(CoefficientCombineRule::Multiply)
        .friction_combine_rule(CoefficientCombineRule::Multiply)
        .build()
}

/// Physics world backed by a rapier2d pipeline
pub struct RapierWorld {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    /// Registered bodies in handle order
    bodies: BTreeMap<BodyHandle, Body>,
    /// Collision type of every collider, boundary included
    collision_types: HashMap<ColliderHandle, CollisionType>,
    handlers: HashMap<(CollisionType, CollisionType), PostSolve>,
    segments: usize,
    next_handle: u32,
}

impl Default for RapierWorld {
    fn default() -> Self {
        Self::new(Vec2::ZERO)
    }
}

impl fmt::Debug for RapierWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RapierWorld")
            .field("gravity", &self.gravity())
            .field("bodies", &self.bodies.len())
            .field("segments", &self.segments)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl RapierWorld {
    pub fn new(gravity: Vec2) -> Self {
        let mut integration_params = IntegrationParameters::default();
        integration_params.length_unit = LENGTH_UNIT;
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![gravity.x, gravity.y],
            integration_params,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            bodies: BTreeMap::new(),
            collision_types: HashMap::new(),
            handlers: HashMap::new(),
            segments: 0,
            next_handle: 0,
        }
    }

    pub fn gravity(&self) -> Vec2 {
        to_vec2(&self.gravity)
    }

    /// Number of static boundary segments
    pub fn segment_count(&self) -> usize {
        self.segments
    }

    pub fn velocity(&self, handle: BodyHandle) -> Option<Vec2> {
        let body = self.bodies.get(&handle)?;
        self.rigid_body_set
            .get(body.rigid)
            .map(|rb| to_vec2(rb.linvel()))
    }

    /// Fail on the first body with a non-finite position or velocity
    fn check_finite(&self) -> Result<(), SimError> {
        for (handle, body) in &self.bodies {
            let rb = self
                .rigid_body_set
                .get(body.rigid)
                .ok_or(SimError::UnknownBody(*handle))?;
            let pos = to_vec2(rb.translation());
            if !(pos.is_finite() && to_vec2(rb.linvel()).is_finite() && rb.angvel().is_finite()) {
                log::error!("Physics body {} diverged at {:?}", handle, pos);
                return Err(SimError::Integration(*handle));
            }
        }
        Ok(())
    }

    /// Run the installed handlers over every touching pair and apply their
    /// impulses
    fn run_post_solve(&mut self) {
        if self.handlers.is_empty() {
            return;
        }

        let mut kicks: Vec<(ColliderHandle, Vec2, Vec2)> = Vec::new();
        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let (Some(&t1), Some(&t2)) = (
                self.collision_types.get(&pair.collider1),
                self.collision_types.get(&pair.collider2),
            ) else {
                continue;
            };

            // rapier's impulse is the one applied to collider2
            let impulse = to_vec2(&pair.total_impulse());
            let (a, b, type_a, type_b, total_impulse) = if self.handlers.contains_key(&(t1, t2)) {
                (pair.collider1, pair.collider2, t1, t2, impulse)
            } else {
                (pair.collider2, pair.collider1, t2, t1, -impulse)
            };
            let Some(&handler) = self.handlers.get(&(type_a, type_b)) else {
                continue;
            };

            let point = self.contact_point(pair);
            let response = handler(Arbiter {
                type_a,
                type_b,
                point,
                total_impulse,
            });
            kicks.push((a, response.on_a, point));
            kicks.push((b, response.on_b, point));
        }

        for (collider, impulse, point) in kicks {
            if impulse == Vec2::ZERO {
                continue;
            }
            // Boundary colliders have no parent body
            let Some(parent) = self.collider_set.get(collider).and_then(|c| c.parent()) else {
                continue;
            };
            if let Some(rb) = self.rigid_body_set.get_mut(parent) {
                rb.apply_impulse_at_point(
                    vector![impulse.x, impulse.y],
                    point![point.x, point.y],
                    true,
                );
            }
        }
    }

    /// Mean of the solver contact points, or the midpoint of both colliders
    fn contact_point(&self, pair: &ContactPair) -> Vec2 {
        let (sum, count) = pair
            .manifolds
            .iter()
            .flat_map(|m| m.data.solver_contacts.iter())
            .fold((Vec2::ZERO, 0u32), |(sum, n), c| {
                (sum + Vec2::new(c.point.x, c.point.y), n + 1)
            });
        if count > 0 {
            return sum / count as f32;
        }
        let center = |h: ColliderHandle| {
            self.collider_set
                .get(h)
                .map_or(Vec2::ZERO, |c| to_vec2(c.translation()))
        };
        (center(pair.collider1) + center(pair.collider2)) * 0.5
    }
}

impl PhysicsWorld for RapierWorld {
    fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = vector![gravity.x, gravity.y];
    }

    fn add_body(&mut self, desc: &BodyDesc) -> BodyHandle {
        let rigid = RigidBodyBuilder::dynamic()
            .translation(vector![desc.position.x, desc.position.y])
            .can_sleep(false)
            .build();
        let rigid = self.rigid_body_set.insert(rigid);
        let collider = self.collider_set.insert_with_parent(
            ball_collider(desc),
            rigid,
            &mut self.rigid_body_set,
        );
        self.collision_types.insert(collider, desc.collision_type);

        self.next_handle += 1;
        let handle = BodyHandle(self.next_handle);
        self.bodies.insert(handle, Body { rigid, collider });
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) -> bool {
        let Some(body) = self.bodies.remove(&handle) else {
            return false;
        };
        self.collision_types.remove(&body.collider);
        self.rigid_body_set.remove(
            body.rigid,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        true
    }

    fn add_static_segment(&mut self, segment: StaticSegment) {
        let collider = self.collider_set.insert(segment_collider(&segment));
        self.collision_types.insert(collider, segment.collision_type);
        self.segments += 1;
    }

    fn add_collision_handler(&mut self, a: CollisionType, b: CollisionType, post_solve: PostSolve) {
        self.handlers.insert((a, b), post_solve);
    }

    fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        let body = self.bodies.get(&handle)?;
        self.rigid_body_set
            .get(body.rigid)
            .map(|rb| to_vec2(rb.translation()))
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn step(&mut self, dt: f32) -> Result<(), SimError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimError::InvalidTimestep(dt));
        }
        // Never hand a diverged body to rapier
        self.check_finite()?;

        self.integration_params.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
        self.run_post_solve();
        self.check_finite()
    }
}
