//! Core runtime of the Horde broadcast server.
//!
//! This crate holds everything between the world model and the transport:
//!
//! - [`config`] -- Typed configuration loaded from YAML and the environment.
//! - [`shutdown`] -- [`ShutdownSignal`], the process-wide cooperative
//!   cancellation signal.
//! - [`broadcast`] -- [`Broadcaster`], fan-out of one message stream to many
//!   bounded per-subscriber queues.
//! - [`runner`] -- [`GameLoop`], the ticking loop that turns generator moves
//!   into published frames.
//! - [`inbound`] -- The shared channel of client-sent messages.

pub mod broadcast;
pub mod config;
pub mod inbound;
pub mod runner;
pub mod shutdown;

pub use broadcast::{
    BroadcastError, Broadcaster, OverflowPolicy, PublishReport, SubscriberId, Subscription,
    SubscriptionGuard,
};
pub use config::{ConfigError, HordeConfig};
pub use inbound::{InboundMessage, consume_inbound, inbound_channel};
pub use runner::{GameEndReason, GameError, GameLoop, GameSummary};
pub use shutdown::ShutdownSignal;
