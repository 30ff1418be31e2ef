//! Error types for the `horde-world` crate.
//!
//! Grid operations return [`WorldError`]; the movement generator returns
//! [`GeneratorError`]. A generator error is an invariant violation and is
//! fatal to the game loop that owns the generator.

/// Errors that can occur during grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// A raw axis code was neither X (`1`) nor Y (`2`).
    #[error("not a valid axis type: {0}")]
    InvalidAxis(i32),

    /// An axis name was neither `x` nor `y`.
    #[error("not a valid axis name: {0:?}")]
    InvalidAxisName(String),

    /// A cell lies outside the grid.
    #[error("cell ({x}, {y}) is outside the {width}x{height} grid")]
    CellOutOfBounds {
        /// The x coordinate.
        x: i32,
        /// The y coordinate.
        y: i32,
        /// Grid width.
        width: u16,
        /// Grid height.
        height: u16,
    },
}

/// Errors that can occur while generating movement events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeneratorError {
    /// The generator has no zombies to move.
    #[error("generator has no zombies")]
    NoEntities,

    /// A zombie was found outside the grid before moving.
    #[error("zombie {id} at ({x}, {y}) is outside the grid")]
    EntityOutOfBounds {
        /// The zombie identifier.
        id: String,
        /// The x coordinate.
        x: i32,
        /// The y coordinate.
        y: i32,
    },

    /// Two zombies share the same identifier.
    #[error("duplicate zombie id: {0}")]
    DuplicateEntity(String),

    /// Arithmetic overflow while applying a move.
    #[error("coordinate overflow while moving zombie {0}")]
    CoordinateOverflow(String),
}
