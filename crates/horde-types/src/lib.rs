//! Shared wire types for the Horde broadcast server.
//!
//! Types defined here are what clients see on the wire. They are exported
//! to `TypeScript` via `ts-rs` for the browser client.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for sessions and game runs
//! - [`messages`] -- Server-to-client messages (`mapCreate`, `zombieMove`)

pub mod ids;
pub mod messages;

pub use ids::{GameRunId, SessionId};
pub use messages::{MapCreate, ServerMessage, ZombieMove};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs writes the files into `bindings/` relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::SessionId::export_all();
        let _ = crate::ids::GameRunId::export_all();
        let _ = crate::messages::MapCreate::export_all();
        let _ = crate::messages::ZombieMove::export_all();
        let _ = crate::messages::ServerMessage::export_all();
    }
}
