//! Game tuning and validation
//!
//! Every constant the simulation reads lives here so sessions can be
//! reproduced from a JSON file. Missing fields fall back to [`crate::consts`].

use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::SimError;
use crate::sim::Tier;

/// What happens when two fruit of the highest tier touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TopTierPolicy {
    /// Both fruit are consumed and removed; nothing spawns and no score is awarded
    #[default]
    Discard,
    /// Top-tier pairs are never matched and stay in play
    Keep,
}

impl TopTierPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopTierPolicy::Discard => "discard",
            TopTierPolicy::Keep => "keep",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "discard" => Some(TopTierPolicy::Discard),
            "keep" => Some(TopTierPolicy::Keep),
            _ => None,
        }
    }
}

/// Game configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    // === Field ===
    pub field_width: f32,
    pub field_height: f32,
    /// Simulation steps per second
    pub frame_rate: u32,

    // === Fruit ===
    /// Radius of a tier-1 fruit
    pub fruit_unit: f32,
    /// Highest tier a merge can produce
    pub max_tier: u8,
    /// Pending fruit are drawn from tiers 1..=pending_tiers
    pub pending_tiers: u8,
    pub top_tier_policy: TopTierPolicy,

    // === Dropping ===
    pub drop_height: f32,
    pub cursor_speed: f32,
    pub loss_height: f32,

    // === Physics ===
    pub gravity: f32,
    pub wall_radius: f32,
    pub wall_friction: f32,
    pub fruit_elasticity: f32,
    pub fruit_friction: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            field_width: FIELD_WIDTH,
            field_height: FIELD_HEIGHT,
            frame_rate: FRAME_RATE,

            fruit_unit: FRUIT_UNIT,
            max_tier: MAX_TIER,
            pending_tiers: PENDING_TIERS,
            top_tier_policy: TopTierPolicy::Discard,

            drop_height: DROP_HEIGHT,
            cursor_speed: CURSOR_SPEED,
            loss_height: LOSS_HEIGHT,

            gravity: GRAVITY,
            wall_radius: WALL_RADIUS,
            wall_friction: WALL_FRICTION,
            fruit_elasticity: FRUIT_ELASTICITY,
            fruit_friction: FRUIT_FRICTION,
        }
    }
}

impl GameConfig {
    /// Parse a configuration from JSON, defaulting any missing field
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        serde_json::from_str(json).map_err(|e| SimError::InvalidConfig(e.to_string()))
    }

    /// Load a configuration file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SimError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config = Self::from_json(&json)?;
        config.validate()?;
        log::info!("Loaded game config from {}", path.display());
        Ok(config)
    }

    /// Reject configurations the session cannot run with
    pub fn validate(&self) -> Result<(), SimError> {
        fn invalid(msg: impl Into<String>) -> Result<(), SimError> {
            Err(SimError::InvalidConfig(msg.into()))
        }

        let positive = [
            ("field_width", self.field_width),
            ("field_height", self.field_height),
            ("fruit_unit", self.fruit_unit),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("{name} must be positive, got {value}"));
            }
        }
        let finite = [
            ("drop_height", self.drop_height),
            ("cursor_speed", self.cursor_speed),
            ("loss_height", self.loss_height),
            ("gravity", self.gravity),
            ("wall_radius", self.wall_radius),
            ("wall_friction", self.wall_friction),
            ("fruit_elasticity", self.fruit_elasticity),
            ("fruit_friction", self.fruit_friction),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return invalid(format!("{name} must be finite, got {value}"));
            }
        }
        if self.wall_radius < 0.0 || self.wall_friction < 0.0 || self.fruit_friction < 0.0 {
            return invalid("wall_radius and friction coefficients must not be negative");
        }
        if self.frame_rate == 0 {
            return invalid("frame_rate must be at least 1");
        }
        if self.pending_tiers == 0 {
            return invalid("pending_tiers must be at least 1");
        }
        if self.max_tier < self.pending_tiers {
            return invalid(format!(
                "max_tier ({}) must not be below pending_tiers ({})",
                self.max_tier, self.pending_tiers
            ));
        }
        let widest = self.tier_radius(Tier::new(self.pending_tiers));
        if self.field_width < 2.0 * widest {
            return invalid(format!(
                "field_width ({}) cannot fit a pending fruit of radius {widest}",
                self.field_width
            ));
        }
        Ok(())
    }

    /// Fixed simulation timestep in seconds
    #[inline]
    pub fn dt(&self) -> f32 {
        1.0 / self.frame_rate as f32
    }

    /// Steps the drop cooldown lasts after each spawn
    #[inline]
    pub fn drop_cooldown_steps(&self) -> u32 {
        self.frame_rate / 2
    }

    /// Consecutive violating steps tolerated before the session ends
    #[inline]
    pub fn loss_grace_steps(&self) -> u32 {
        self.frame_rate * 2
    }

    #[inline]
    pub fn gravity_vec(&self) -> Vec2 {
        Vec2::new(0.0, self.gravity)
    }

    #[inline]
    pub fn tier_radius(&self, tier: Tier) -> f32 {
        tier.rank() as f32 * self.fruit_unit
    }

    #[inline]
    pub fn max_tier(&self) -> Tier {
        Tier::new(self.max_tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GameConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.drop_cooldown_steps(), 30);
        assert_eq!(config.loss_grace_steps(), 120);
        assert!((config.dt() - 1.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_fruit_friction_defaults_to_zero() {
        assert_eq!(GameConfig::default().fruit_friction, 0.0);
        let config = GameConfig::from_json(r#"{ "fruit_friction": 0.5 }"#).unwrap();
        assert_eq!(config.fruit_friction, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_dimensions() {
        for config in [
            GameConfig {
                field_width: 0.0,
                ..Default::default()
            },
            GameConfig {
                field_height: -5.0,
                ..Default::default()
            },
            GameConfig {
                fruit_unit: 0.0,
                ..Default::default()
            },
            GameConfig {
                fruit_unit: f32::NAN,
                ..Default::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(SimError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_rejects_field_too_narrow_for_pending_fruit() {
        // Largest pending fruit is tier 3 => radius 36 => needs 72 units
        let config = GameConfig {
            field_width: 70.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GameConfig {
            field_width: 72.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_frame_rate_and_bad_ladder() {
        let config = GameConfig {
            frame_rate: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GameConfig {
            max_tier: 2,
            pending_tiers: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            GameConfig::from_json(r#"{ "frame_rate": 30, "top_tier_policy": "keep" }"#).unwrap();
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.top_tier_policy, TopTierPolicy::Keep);
        assert_eq!(config.field_width, FIELD_WIDTH);
        assert_eq!(config.drop_cooldown_steps(), 15);
    }

    #[test]
    fn test_policy_names() {
        for policy in [TopTierPolicy::Discard, TopTierPolicy::Keep] {
            assert_eq!(TopTierPolicy::from_str(policy.as_str()), Some(policy));
        }
        assert_eq!(TopTierPolicy::from_str("KEEP"), Some(TopTierPolicy::Keep));
        assert_eq!(TopTierPolicy::from_str("melt"), None);
    }
}
