//! The rectangular world grid.
//!
//! A [`WorldGrid`] is immutable after creation. Two notions of "inside"
//! exist and both are used:
//!
//! - **Map bounds** ([`WorldGrid::is_in_map`]) are what clients see in the
//!   `mapCreate` snapshot: `[0, width]` on x and `[0, height]` on y, with the
//!   maximum included.
//! - **Cells** ([`WorldGrid::contains_cell`]) are the addressable tiles:
//!   `0 <= x < width`, `0 <= y < height`. Zombies only ever stand on cells.

use std::fmt;
use std::str::FromStr;

use horde_types::MapCreate;
use serde::{Deserialize, Serialize};

use crate::error::WorldError;

/// One axis of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Horizontal axis.
    X,
    /// Vertical axis.
    Y,
}

impl Axis {
    /// Numeric code of the axis (`1` for X, `2` for Y).
    pub const fn code(self) -> i32 {
        match self {
            Self::X => 1,
            Self::Y => 2,
        }
    }
}

impl TryFrom<i32> for Axis {
    type Error = WorldError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::X),
            2 => Ok(Self::Y),
            other => Err(WorldError::InvalidAxis(other)),
        }
    }
}

impl FromStr for Axis {
    type Err = WorldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "x" | "X" => Ok(Self::X),
            "y" | "Y" => Ok(Self::Y),
            other => Err(WorldError::InvalidAxisName(other.to_owned())),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => f.write_str("x"),
            Self::Y => f.write_str("y"),
        }
    }
}

/// Rectangular coordinate space the zombies move in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldGrid {
    width: u16,
    height: u16,
    include_tiles: bool,
}

impl WorldGrid {
    /// Create a grid without tile data in its snapshot.
    pub const fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            include_tiles: false,
        }
    }

    /// Create a grid whose snapshot carries the dense tile mapping.
    pub const fn with_tiles(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            include_tiles: true,
        }
    }

    /// Grid width.
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Grid height.
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// Whether snapshots include the tile matrix.
    pub const fn includes_tiles(&self) -> bool {
        self.include_tiles
    }

    /// Whether `value` lies within the map bounds on `axis`.
    ///
    /// The advertised maximum is inclusive: on a 30-wide grid, `30` is in
    /// the map and `31` is not.
    pub fn is_in_map(&self, value: i32, axis: Axis) -> bool {
        let max = match axis {
            Axis::X => i32::from(self.width),
            Axis::Y => i32::from(self.height),
        };
        (0..=max).contains(&value)
    }

    /// Variant of [`is_in_map`](Self::is_in_map) taking a raw axis code.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidAxis`] if `axis_code` is neither X nor Y.
    pub fn is_in_map_code(&self, value: i32, axis_code: i32) -> Result<bool, WorldError> {
        let axis = Axis::try_from(axis_code)?;
        Ok(self.is_in_map(value, axis))
    }

    /// Whether `(x, y)` is an addressable cell.
    pub fn contains_cell(&self, x: i32, y: i32) -> bool {
        (0..i32::from(self.width)).contains(&x) && (0..i32::from(self.height)).contains(&y)
    }

    /// Tile id of a cell, `y * width + x`.
    ///
    /// Returns `None` for coordinates outside the cell range.
    pub fn tile(&self, x: i32, y: i32) -> Option<u32> {
        if !self.contains_cell(x, y) {
            return None;
        }
        let x = u32::try_from(x).ok()?;
        let y = u32::try_from(y).ok()?;
        y.checked_mul(u32::from(self.width))?.checked_add(x)
    }

    /// Like [`tile`](Self::tile), but reports which cell was rejected.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::CellOutOfBounds`] for coordinates outside the grid.
    pub fn try_tile(&self, x: i32, y: i32) -> Result<u32, WorldError> {
        self.tile(x, y).ok_or(WorldError::CellOutOfBounds {
            x,
            y,
            width: self.width,
            height: self.height,
        })
    }

    /// Build the `mapCreate` snapshot for a newly connected client.
    pub fn snapshot(&self) -> MapCreate {
        let tiles = self.include_tiles.then(|| {
            (0..i32::from(self.height))
                .map(|y| {
                    (0..i32::from(self.width))
                        .filter_map(|x| self.tile(x, y))
                        .collect()
                })
                .collect()
        });

        MapCreate {
            min_x: 0,
            max_x: i32::from(self.width),
            min_y: 0,
            max_y: i32::from(self.height),
            tiles,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_bounds() {
        let snapshot = WorldGrid::new(30, 30).snapshot();
        assert_eq!(snapshot.min_x, 0);
        assert_eq!(snapshot.max_x, 30);
        assert_eq!(snapshot.min_y, 0);
        assert_eq!(snapshot.max_y, 30);
        assert!(snapshot.tiles.is_none());
    }

    #[test]
    fn is_in_map_includes_advertised_max() {
        let grid = WorldGrid::new(30, 30);
        assert!(grid.is_in_map(30, Axis::X));
        assert!(grid.is_in_map(0, Axis::X));
        assert!(!grid.is_in_map(31, Axis::X));
        assert!(!grid.is_in_map(-1, Axis::X));
    }

    #[test]
    fn is_in_map_checks_the_requested_axis() {
        let grid = WorldGrid::new(20, 10);
        assert!(grid.is_in_map(15, Axis::X));
        assert!(!grid.is_in_map(15, Axis::Y));
    }

    #[test]
    fn raw_axis_codes() {
        let grid = WorldGrid::new(30, 30);
        assert_eq!(grid.is_in_map_code(30, 1), Ok(true));
        assert_eq!(grid.is_in_map_code(31, 2), Ok(false));
        assert_eq!(grid.is_in_map_code(5, 3), Err(WorldError::InvalidAxis(3)));
        assert_eq!(Axis::try_from(Axis::Y.code()), Ok(Axis::Y));
    }

    #[test]
    fn axis_names_parse() {
        assert_eq!("x".parse::<Axis>(), Ok(Axis::X));
        assert_eq!(" Y ".parse::<Axis>(), Ok(Axis::Y));
        assert!(matches!("z".parse::<Axis>(), Err(WorldError::InvalidAxisName(_))));
    }

    #[test]
    fn cells_exclude_the_max_edge() {
        let grid = WorldGrid::new(20, 10);
        assert!(grid.contains_cell(19, 9));
        assert!(!grid.contains_cell(20, 9));
        assert!(!grid.contains_cell(19, 10));
        assert!(!grid.contains_cell(-1, 0));
    }

    #[test]
    fn tile_ids_are_row_major() {
        let grid = WorldGrid::new(20, 10);
        assert_eq!(grid.tile(0, 0), Some(0));
        assert_eq!(grid.tile(3, 2), Some(43));
        assert_eq!(grid.tile(19, 9), Some(199));
        assert_eq!(grid.tile(20, 0), None);
        assert!(matches!(
            grid.try_tile(0, 10),
            Err(WorldError::CellOutOfBounds { y: 10, .. })
        ));
    }

    #[test]
    fn snapshot_with_tiles_is_indexed_by_row() {
        let snapshot = WorldGrid::with_tiles(3, 2).snapshot();
        assert_eq!(snapshot.tiles, Some(vec![vec![0, 1, 2], vec![3, 4, 5]]));
    }

    #[test]
    fn empty_grid_has_no_cells() {
        let grid = WorldGrid::with_tiles(0, 0);
        assert!(!grid.contains_cell(0, 0));
        assert_eq!(grid.snapshot().tiles, Some(Vec::<Vec<u32>>::new()));
    }
}
