//! Messages pushed from the server to connected clients.
//!
//! Every outbound frame is a JSON object discriminated by a `type` field:
//!
//! | `type`        | payload                              | when                    |
//! |---------------|--------------------------------------|-------------------------|
//! | `mapCreate`   | [`MapCreate`] bounds (+ tile ids)    | once, on connect        |
//! | `zombieMove`  | [`ZombieMove`] entity position       | every generator tick    |
//!
//! Field names are camelCase on the wire to match the browser client.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Initial world snapshot sent once to every newly connected client.
///
/// Bounds are inclusive of the advertised maximum: a 30x30 map reports
/// `maxX = 30`. The optional `tiles` matrix is indexed `tiles[y][x]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MapCreate {
    /// Smallest x coordinate on the map (always 0).
    pub min_x: i32,
    /// Largest advertised x coordinate (the grid width).
    pub max_x: i32,
    /// Smallest y coordinate on the map (always 0).
    pub min_y: i32,
    /// Largest advertised y coordinate (the grid height).
    pub max_y: i32,
    /// Dense tile ids, `tiles[y][x] = y * width + x`. Omitted when the
    /// server runs without tile data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub tiles: Option<Vec<Vec<u32>>>,
}

/// One movement of a simulated zombie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ZombieMove {
    /// Entity identifier.
    pub id: String,
    /// New x coordinate.
    pub x: i32,
    /// New y coordinate.
    pub y: i32,
}

impl ZombieMove {
    /// Create a move event for the given entity position.
    pub fn new(id: impl Into<String>, x: i32, y: i32) -> Self {
        Self { id: id.into(), x, y }
    }
}

/// Any message the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum ServerMessage {
    /// The initial world snapshot.
    MapCreate(MapCreate),
    /// A zombie moved.
    ZombieMove(ZombieMove),
}

impl ServerMessage {
    /// Encode the message as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if encoding fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of the message kind (the `type` field).
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MapCreate(_) => "mapCreate",
            Self::ZombieMove(_) => "zombieMove",
        }
    }
}

impl From<MapCreate> for ServerMessage {
    fn from(map: MapCreate) -> Self {
        Self::MapCreate(map)
    }
}

impl From<ZombieMove> for ServerMessage {
    fn from(zombie_move: ZombieMove) -> Self {
        Self::ZombieMove(zombie_move)
    }
}
