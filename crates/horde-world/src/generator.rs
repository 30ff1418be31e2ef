//! Periodic movement generation.
//!
//! Each call to [`EventGenerator::next_move`] advances one zombie by a random
//! step of `-1`, `0` or `+1` on each axis. Zombies take turns in round-robin
//! order, so a single-zombie generator moves the same zombie every tick.
//!
//! # Bounds
//!
//! A step that would leave the grid is clamped to the nearest cell on that
//! axis. A zombie at `x = 0` that rolls `-1` stays at `0`; it never wraps or
//! teleports.
//!
//! # Determinism
//!
//! The generator draws all randomness from the RNG it was built with. A
//! generator built by [`EventGenerator::seeded`] with the same seed, grid and
//! starting zombies produces exactly the same sequence of moves.

use std::collections::BTreeSet;

use horde_types::ZombieMove;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::error::GeneratorError;
use crate::grid::WorldGrid;
use crate::zombie::Zombie;

/// Produces zombie movement events on a [`WorldGrid`].
#[derive(Debug, Clone)]
pub struct EventGenerator<R = StdRng> {
    grid: WorldGrid,
    zombies: Vec<Zombie>,
    rng: R,
    cursor: usize,
}

impl EventGenerator<StdRng> {
    /// Build a generator backed by a [`StdRng`] seeded with `seed`.
    ///
    /// # Errors
    ///
    /// See [`EventGenerator::new`].
    pub fn seeded(grid: WorldGrid, zombies: Vec<Zombie>, seed: u64) -> Result<Self, GeneratorError> {
        Self::new(grid, zombies, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> EventGenerator<R> {
    /// Build a generator for the given zombies.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::NoEntities`] for an empty zombie list,
    /// [`GeneratorError::DuplicateEntity`] if two zombies share an id, and
    /// [`GeneratorError::EntityOutOfBounds`] if a zombie does not start on a
    /// grid cell.
    pub fn new(grid: WorldGrid, zombies: Vec<Zombie>, rng: R) -> Result<Self, GeneratorError> {
        if zombies.is_empty() {
            return Err(GeneratorError::NoEntities);
        }

        let mut seen = BTreeSet::new();
        for zombie in &zombies {
            if !seen.insert(zombie.id.as_str()) {
                return Err(GeneratorError::DuplicateEntity(zombie.id.clone()));
            }
            if !grid.contains_cell(zombie.x, zombie.y) {
                return Err(out_of_bounds(zombie));
            }
        }

        Ok(Self {
            grid,
            zombies,
            rng,
            cursor: 0,
        })
    }

    /// Move the next zombie and return its new position.
    ///
    /// # Errors
    ///
    /// Only on invariant violations (a zombie found off the grid, or
    /// arithmetic overflow). Callers should treat any error as fatal.
    pub fn next_move(&mut self) -> Result<ZombieMove, GeneratorError> {
        let count = self.zombies.len();
        let index = self
            .cursor
            .checked_rem(count)
            .ok_or(GeneratorError::NoEntities)?;
        self.cursor = index.wrapping_add(1);

        let zombie = self
            .zombies
            .get_mut(index)
            .ok_or(GeneratorError::NoEntities)?;

        if !self.grid.contains_cell(zombie.x, zombie.y) {
            return Err(out_of_bounds(zombie));
        }

        let dx: i32 = self.rng.random_range(-1..=1);
        let dy: i32 = self.rng.random_range(-1..=1);

        let x = step_clamped(zombie.x, dx, self.grid.width())
            .ok_or_else(|| GeneratorError::CoordinateOverflow(zombie.id.clone()))?;
        let y = step_clamped(zombie.y, dy, self.grid.height())
            .ok_or_else(|| GeneratorError::CoordinateOverflow(zombie.id.clone()))?;

        trace!(id = %zombie.id, from_x = zombie.x, from_y = zombie.y, x, y, "zombie moved");

        zombie.x = x;
        zombie.y = y;
        Ok(zombie.to_move())
    }

    /// The grid the zombies move on.
    pub const fn grid(&self) -> &WorldGrid {
        &self.grid
    }

    /// Current zombie positions.
    pub fn zombies(&self) -> &[Zombie] {
        &self.zombies
    }
}

/// Apply `delta` to `value` and clamp into `[0, extent)`.
fn step_clamped(value: i32, delta: i32, extent: u16) -> Option<i32> {
    let last = i32::from(extent.checked_sub(1)?);
    let moved = value.checked_add(delta)?;
    Some(moved.min(last).max(0))
}

fn out_of_bounds(zombie: &Zombie) -> GeneratorError {
    GeneratorError::EntityOutOfBounds {
        id: zombie.id.clone(),
        x: zombie.x,
        y: zombie.y,
    }
}
