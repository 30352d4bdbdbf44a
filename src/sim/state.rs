//! Game session state
//!
//! The session exclusively owns the physics world and the active fruit. A
//! fruit and its physics body are always added and removed together.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::fruit::{Fruit, Tier};
use super::physics::{
    Arbiter, ArbiterImpulse, BodyDesc, CollisionType, PhysicsWorld, StaticSegment,
};
use super::snapshot::Snapshot;
use super::world::RapierWorld;
use crate::config::GameConfig;
use crate::consts::CONTACT_DAMPING;
use crate::error::SimError;

/// Current phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Accepting input and stepping
    Running,
    /// Loss condition reached; `update` no longer changes anything
    GameOver,
    /// The physics world failed; `update` returns [`SimError::Aborted`]
    Aborted,
}

/// Things that happened during the last step, for presentation layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    Dropped { tier: Tier, x: f32 },
    Merged { from: Tier, into: Tier, pos: Vec2, points: u64 },
    /// Two top-tier fruit met and were removed without a product
    Discarded { tier: Tier, pos: Vec2 },
    GameOver { score: u64 },
}

/// Damping for fruit/fruit contacts: feed back a share of the impulse to both sides
fn damp_fruit_contact(arbiter: Arbiter) -> ArbiterImpulse {
    let impulse = arbiter.total_impulse * CONTACT_DAMPING;
    ArbiterImpulse {
        on_a: impulse,
        on_b: -impulse,
    }
}

/// Damping for fruit/boundary contacts: only the fruit is affected
fn damp_ground_contact(arbiter: Arbiter) -> ArbiterImpulse {
    ArbiterImpulse {
        on_a: arbiter.total_impulse * CONTACT_DAMPING,
        on_b: Vec2::ZERO,
    }
}

/// A single game of fruit dropping
#[derive(Debug, Clone)]
pub struct GameSession<W: PhysicsWorld = RapierWorld> {
    pub(crate) config: GameConfig,
    /// Run seed for reproducibility
    pub(crate) seed: u64,
    pub(crate) rng: Pcg32,
    pub(crate) world: W,
    /// Active fruit in insertion order
    pub(crate) fruits: Vec<Fruit>,
    /// Horizontal position of the pending drop
    pub(crate) drop_x: f32,
    /// Tier of the pending drop
    pub(crate) next_tier: Tier,
    pub(crate) score: u64,
    /// Steps remaining before another drop is allowed
    pub(crate) drop_cooldown: u32,
    /// Consecutive steps with a fruit above the loss line
    pub(crate) loss_timer: u32,
    pub(crate) phase: GamePhase,
    /// Simulation step counter
    pub(crate) time_ticks: u64,
    pub(crate) events: Vec<GameEvent>,
    pub(crate) snapshot: Snapshot,
    /// Next fruit ID
    next_id: u32,
}

impl GameSession<RapierWorld> {
    /// Create a session on the rapier2d backend
    pub fn new(config: GameConfig, seed: u64) -> Result<Self, SimError> {
        Self::with_world(config, seed, RapierWorld::default())
    }
}

impl<W: PhysicsWorld> GameSession<W> {
    /// Create a session on an injected physics world
    ///
    /// Installs gravity, the floor and both walls, and the contact damping
    /// handlers on `world`.
    pub fn with_world(config: GameConfig, seed: u64, mut world: W) -> Result<Self, SimError> {
        config.validate()?;

        world.set_gravity(config.gravity_vec());
        let (w, h) = (config.field_width, config.field_height);
        let boundary = [
            (Vec2::new(0.0, h), Vec2::new(w, h)),
            (Vec2::new(0.0, h), Vec2::new(0.0, 0.0)),
            (Vec2::new(w, 0.0), Vec2::new(w, h)),
        ];
        for (a, b) in boundary {
            world.add_static_segment(StaticSegment {
                a,
                b,
                radius: config.wall_radius,
                friction: config.wall_friction,
                elasticity: 0.0,
                collision_type: CollisionType::Ground,
            });
        }
        world.add_collision_handler(CollisionType::Fruit, CollisionType::Fruit, damp_fruit_contact);
        world.add_collision_handler(CollisionType::Fruit, CollisionType::Ground, damp_ground_contact);

        let mut rng = Pcg32::seed_from_u64(seed);
        let next_tier = Tier::new(rng.random_range(1..=config.pending_tiers));
        let drop_x = (w / 2.0).floor();

        let mut session = Self {
            snapshot: Snapshot::default(),
            config,
            seed,
            rng,
            world,
            fruits: Vec::new(),
            drop_x,
            next_tier,
            score: 0,
            drop_cooldown: 0,
            loss_timer: 0,
            phase: GamePhase::Running,
            time_ticks: 0,
            events: Vec::new(),
            next_id: 1,
        };
        session.snapshot = session.build_snapshot();

        log::info!(
            "New session: seed={} field={}x{} first={}",
            seed,
            w,
            h,
            session.next_tier
        );
        Ok(session)
    }

    /// Allocate a new fruit ID
    fn next_fruit_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Create a fruit and its physics body together, appending it to the
    /// active collection
    pub fn spawn_fruit(&mut self, tier: Tier, pos: Vec2) -> u32 {
        let radius = self.config.tier_radius(tier);
        let desc = BodyDesc::disc(pos, radius)
            .with_elasticity(self.config.fruit_elasticity)
            .with_friction(self.config.fruit_friction)
            .with_collision_type(CollisionType::Fruit);
        let body = self.world.add_body(&desc);
        let id = self.next_fruit_id();
        self.fruits.push(Fruit::new(id, tier, radius, body, pos));
        id
    }

    /// Remove a fruit and its physics body together
    pub(crate) fn despawn_fruit(&mut self, id: u32) -> bool {
        let Some(index) = self.fruits.iter().position(|f| f.id == id) else {
            return false;
        };
        let fruit = self.fruits.remove(index);
        if !self.world.remove_body(fruit.body()) {
            log::warn!("Fruit {} had no physics body {}", fruit.id, fruit.body());
        }
        true
    }

    /// Draw the next pending tier from the smallest tiers
    pub(crate) fn roll_next_tier(&mut self) -> Tier {
        Tier::new(self.rng.random_range(1..=self.config.pending_tiers))
    }

    /// Copy body positions from the physics world onto the fruit
    pub(crate) fn sync_positions(&mut self) -> Result<(), SimError> {
        for fruit in &mut self.fruits {
            fruit.pos = self
                .world
                .position(fruit.body())
                .ok_or(SimError::UnknownBody(fruit.body()))?;
        }
        Ok(())
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn fruits(&self) -> &[Fruit] {
        &self.fruits
    }

    pub fn drop_x(&self) -> f32 {
        self.drop_x
    }

    pub fn next_tier(&self) -> Tier {
        self.next_tier
    }

    pub fn next_radius(&self) -> f32 {
        self.config.tier_radius(self.next_tier)
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn drop_cooldown(&self) -> u32 {
        self.drop_cooldown
    }

    pub fn loss_timer(&self) -> u32 {
        self.loss_timer
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == GamePhase::Running
    }

    pub fn time_ticks(&self) -> u64 {
        self.time_ticks
    }

    /// Events recorded during the most recent step
    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    /// State published at the end of the most recent step
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}
