//! Immutable per-step state export
//!
//! Renderers and training loops read this instead of touching the session.

use serde::{Deserialize, Serialize};

use super::physics::PhysicsWorld;
use super::state::GameSession;

/// One circle to draw
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FruitView {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

/// Published state at the end of a step
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Active fruit in insertion order
    pub fruit: Vec<FruitView>,
    /// The fruit waiting to be dropped
    pub pending: FruitView,
    pub score: u64,
    pub drop_x: f32,
    pub running: bool,
}

impl Snapshot {
    /// Active fruit followed by the pending drop
    pub fn all_fruit(&self) -> impl Iterator<Item = &FruitView> {
        self.fruit.iter().chain(std::iter::once(&self.pending))
    }
}

impl<W: PhysicsWorld> GameSession<W> {
    pub(crate) fn build_snapshot(&self) -> Snapshot {
        Snapshot {
            fruit: self
                .fruits
                .iter()
                .map(|f| FruitView {
                    x: f.position().x,
                    y: f.position().y,
                    radius: f.radius(),
                })
                .collect(),
            pending: FruitView {
                x: self.drop_x,
                y: self.config.drop_height,
                radius: self.next_radius(),
            },
            score: self.score,
            drop_x: self.drop_x,
            running: self.is_running(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_fruit_appends_pending() {
        let snapshot = Snapshot {
            fruit: vec![
                FruitView {
                    x: 1.0,
                    y: 2.0,
                    radius: 12.0,
                },
                FruitView {
                    x: 3.0,
                    y: 4.0,
                    radius: 24.0,
                },
            ],
            pending: FruitView {
                x: 200.0,
                y: 100.0,
                radius: 36.0,
            },
            score: 3,
            drop_x: 200.0,
            running: true,
        };
        let radii: Vec<f32> = snapshot.all_fruit().map(|f| f.radius).collect();
        assert_eq!(radii, vec![12.0, 24.0, 36.0]);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = Snapshot {
            pending: FruitView {
                x: 200.0,
                y: 100.0,
                radius: 12.0,
            },
            running: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["pending"]["radius"], 12.0);
        assert_eq!(json["score"], 0);
        assert_eq!(json["running"], true);
        assert!(json["fruit"].as_array().unwrap().is_empty());
    }
}
