//! Simulated zombies.

use horde_types::ZombieMove;
use serde::{Deserialize, Serialize};

/// A zombie standing on a grid cell.
///
/// Owned by the [`EventGenerator`](crate::EventGenerator); only the
/// generator moves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zombie {
    /// Identifier sent to clients in every move.
    pub id: String,
    /// Current x coordinate.
    pub x: i32,
    /// Current y coordinate.
    pub y: i32,
}

impl Zombie {
    /// Create a zombie at the given position.
    pub fn new(id: impl Into<String>, x: i32, y: i32) -> Self {
        Self { id: id.into(), x, y }
    }

    /// The move event describing the zombie's current position.
    pub fn to_move(&self) -> ZombieMove {
        ZombieMove::new(self.id.clone(), self.x, self.y)
    }
}
