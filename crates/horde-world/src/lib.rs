//! World model for the Horde broadcast server.
//!
//! # Modules
//!
//! - [`grid`] -- [`WorldGrid`] bounds, cells, tile ids and the `mapCreate`
//!   snapshot.
//! - [`zombie`] -- The simulated entities.
//! - [`generator`] -- [`EventGenerator`], the seeded source of `zombieMove`
//!   events.
//! - [`error`] -- Error types for grid and generator operations.

pub mod error;
pub mod generator;
pub mod grid;
pub mod zombie;

pub use error::{GeneratorError, WorldError};
pub use generator::EventGenerator;
pub use grid::{Axis, WorldGrid};
pub use zombie::Zombie;
