//! Fruit entities and the pairwise merge rule
//!
//! The merge rule sits on top of ordinary physics contacts: two fruit that
//! touch bounce through the physics world, and additionally merge when they
//! share a tier and neither has already been claimed this step.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::physics::BodyHandle;

/// Slack added to the contact distance when testing for a merge
pub const MERGE_TOLERANCE: f32 = 1.0;

/// Rank on the fruit ladder (tier n has radius n * unit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tier(u8);

impl Tier {
    pub const SMALLEST: Tier = Tier(1);

    /// Tiers start at 1; a rank of 0 is bumped to the smallest tier
    pub const fn new(rank: u8) -> Self {
        if rank == 0 { Self::SMALLEST } else { Tier(rank) }
    }

    #[inline]
    pub const fn rank(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn next(self) -> Self {
        Tier(self.0.saturating_add(1))
    }

    /// Points awarded when a merge produces this tier
    #[inline]
    pub fn merge_score(self) -> u64 {
        crate::triangular(u64::from(self.0))
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {}", self.0)
    }
}

/// Outcome of testing one fruit against another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeCheck {
    /// A fruit was compared with itself
    SameFruit,
    /// Not touching
    Apart,
    /// Touching, but different tiers or one side already consumed
    Touching,
    /// Touching, same tier, both now consumed
    Merge,
}

/// A physics-backed fruit
#[derive(Debug, Clone)]
pub struct Fruit {
    pub id: u32,
    tier: Tier,
    radius: f32,
    /// Physics body carrying the circle shape
    body: BodyHandle,
    /// Last position reported by the physics world
    pub(crate) pos: Vec2,
    /// Claimed by a merge this step
    pub consumed: bool,
}

impl Fruit {
    pub fn new(id: u32, tier: Tier, radius: f32, body: BodyHandle, pos: Vec2) -> Self {
        Self {
            id,
            tier,
            radius,
            body,
            pos,
            consumed: false,
        }
    }

    #[inline]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        self.pos
    }

    #[inline]
    pub fn body(&self) -> BodyHandle {
        self.body
    }

    /// y coordinate of the top edge (y grows downward)
    #[inline]
    pub fn top(&self) -> f32 {
        self.pos.y - self.radius
    }

    /// Whether two fruit are close enough to count as touching for merges
    #[inline]
    pub fn touches(&self, other: &Fruit) -> bool {
        self.pos.distance(other.pos) - MERGE_TOLERANCE < self.radius + other.radius
    }

    /// Test this fruit against `other`, consuming both on a merge
    ///
    /// Callers resolve pairs in ascending index order so the first eligible
    /// pair for a fruit claims it.
    pub fn check_collision(&mut self, other: &mut Fruit) -> MergeCheck {
        if self.id == other.id {
            return MergeCheck::SameFruit;
        }
        if !self.touches(other) {
            return MergeCheck::Apart;
        }
        if self.tier == other.tier && !self.consumed && !other.consumed {
            self.consumed = true;
            other.consumed = true;
            return MergeCheck::Merge;
        }
        MergeCheck::Touching
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fruit(id: u32, rank: u8, x: f32, y: f32) -> Fruit {
        let tier = Tier::new(rank);
        Fruit::new(id, tier, rank as f32 * 12.0, BodyHandle(id), Vec2::new(x, y))
    }

    #[test]
    fn test_same_fruit_is_not_applicable() {
        let mut a = fruit(1, 1, 0.0, 0.0);
        let mut twin = a.clone();
        assert_eq!(a.check_collision(&mut twin), MergeCheck::SameFruit);
        assert!(!a.consumed);
    }

    #[test]
    fn test_merge_uses_one_unit_tolerance() {
        // 23 apart: 23 - 1 < 24 => touching
        let mut a = fruit(1, 1, 100.0, 300.0);
        let mut b = fruit(2, 1, 123.0, 300.0);
        assert_eq!(a.check_collision(&mut b), MergeCheck::Merge);
        assert!(a.consumed && b.consumed);

        // Exactly 25 apart: 25 - 1 == 24 => not touching
        let mut a = fruit(1, 1, 100.0, 300.0);
        let mut b = fruit(2, 1, 125.0, 300.0);
        assert_eq!(a.check_collision(&mut b), MergeCheck::Apart);
        assert!(!a.consumed && !b.consumed);

        // 24.5 apart is still inside the tolerance band
        let mut b = fruit(2, 1, 124.5, 300.0);
        assert_eq!(a.check_collision(&mut b), MergeCheck::Merge);
    }

    #[test]
    fn test_different_tiers_only_touch() {
        let mut a = fruit(1, 1, 0.0, 0.0);
        let mut b = fruit(2, 2, 30.0, 0.0);
        assert_eq!(a.check_collision(&mut b), MergeCheck::Touching);
        assert!(!a.consumed && !b.consumed);
    }

    #[test]
    fn test_consumed_fruit_cannot_merge_again() {
        let mut a = fruit(1, 1, 0.0, 0.0);
        let mut b = fruit(2, 1, 20.0, 0.0);
        let mut c = fruit(3, 1, -20.0, 0.0);

        assert_eq!(a.check_collision(&mut b), MergeCheck::Merge);
        assert_eq!(a.check_collision(&mut c), MergeCheck::Touching);
        assert_eq!(b.check_collision(&mut c), MergeCheck::Apart);
        assert!(!c.consumed);
    }

    #[test]
    fn test_tier_ladder() {
        assert_eq!(Tier::new(0), Tier::SMALLEST);
        assert_eq!(Tier::new(3).next(), Tier::new(4));
        assert!(Tier::new(2) < Tier::new(10));
        assert_eq!(Tier::new(2).merge_score(), 3);
        assert_eq!(Tier::new(11).merge_score(), 66);
        assert_eq!(Tier::new(4).to_string(), "tier 4");
    }

    #[test]
    fn test_top_edge() {
        let f = fruit(1, 2, 50.0, 124.0);
        assert_eq!(f.top(), 100.0);
    }
}
