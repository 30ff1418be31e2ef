//! `WebSocket` gateway for the Horde broadcast server.
//!
//! This crate exposes the game to browsers:
//!
//! - [`router`] -- Axum router with the health endpoint and the upgrade route.
//! - [`handlers`] -- HTTP handlers; the upgrade handler checks the origin
//!   and hands sockets to the connector.
//! - [`connector`] -- [`Connector`] trait and [`WebSocketConnector`], which
//!   greet each client with the snapshot and subscribe it to the broadcast.
//! - [`session`] -- [`Session`], the per-connection reader/writer/closer.
//! - [`transport`] -- Text-frame transport seam and the Axum socket adapter.
//! - [`origin`] -- `Origin` allow-list.
//! - [`server`] / [`startup`] -- Binding and serving with graceful shutdown.

pub mod connector;
pub mod error;
pub mod handlers;
pub mod origin;
pub mod router;
pub mod server;
pub mod session;
pub mod startup;
pub mod state;
pub mod transport;

pub use connector::{Connector, OnConnect, Outbox, WebSocketConnector, snapshot_on_connect};
pub use error::{AcceptError, ConnectorError, GatewayError, OnConnectError};
pub use origin::OriginPolicy;
pub use session::{CloseReason, Session, SessionOutcome, SessionState};
pub use startup::{GatewayHandle, StartupError, spawn_gateway};
pub use state::AppState;
pub use transport::{CloseOnce, TransportError};
