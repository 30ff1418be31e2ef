//! Process wiring.
//!
//! [`App::start`] builds every component and starts accepting connections;
//! [`App::run`] drives the game loop and then tears everything down in
//! order:
//!
//! 1. trigger the shutdown signal (if the loop ended on its own),
//! 2. close the broadcaster so no sink receives anything more,
//! 3. stop the connector and wait, up to the grace period, for sessions,
//! 4. wait for the HTTP server and the inbound consumer to exit.

use std::net::SocketAddr;
use std::sync::Arc;

use horde_core::{
    Broadcaster, GameLoop, GameSummary, HordeConfig, ShutdownSignal, consume_inbound,
    inbound_channel,
};
use horde_gateway::{
    AppState, Connector, GatewayHandle, WebSocketConnector, snapshot_on_connect, spawn_gateway,
};
use horde_world::EventGenerator;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::EngineError;

/// A started server, accepting connections but not yet ticking.
#[derive(Debug)]
pub struct App {
    config: HordeConfig,
    shutdown: ShutdownSignal,
    generator: EventGenerator,
    broadcaster: Arc<Broadcaster<String>>,
    connector: Arc<WebSocketConnector>,
    gateway: GatewayHandle,
    inbound_task: JoinHandle<u64>,
}

impl App {
    /// Build every component and start the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the starting zombies do not fit the grid,
    /// the snapshot cannot be encoded, or the gateway cannot bind.
    pub async fn start(config: HordeConfig, shutdown: ShutdownSignal) -> Result<Self, EngineError> {
        let grid = config.world.grid();
        let generator = EventGenerator::seeded(
            grid,
            config.generator.zombies.clone(),
            config.generator.seed,
        )?;
        info!(
            width = grid.width(),
            height = grid.height(),
            zombies = generator.zombies().len(),
            seed = config.generator.seed,
            "World created"
        );

        let broadcaster = Arc::new(Broadcaster::new(
            config.broadcast.subscriber_capacity,
            config.broadcast.overflow_policy,
        ));
        let (inbound_tx, inbound_rx) = inbound_channel(config.session.inbound_capacity);

        let connector = Arc::new(WebSocketConnector::new(
            Arc::clone(&broadcaster),
            inbound_tx,
            shutdown.clone(),
        ));
        connector.listen_for_connections(snapshot_on_connect(&grid)?)?;

        let state = Arc::new(AppState::new(Arc::clone(&connector), &config.server));
        let gateway = spawn_gateway(&config.server, state, shutdown.clone()).await?;

        let inbound_task = tokio::spawn(consume_inbound(inbound_rx, shutdown.clone(), |message| {
            info!(
                session_id = %message.session_id,
                text = %message.text,
                "Message from client"
            );
        }));

        Ok(Self {
            config,
            shutdown,
            generator,
            broadcaster,
            connector,
            gateway,
            inbound_task,
        })
    }

    /// The address the gateway is bound to.
    pub const fn local_addr(&self) -> SocketAddr {
        self.gateway.local_addr
    }

    /// Run the game until shutdown or the tick limit, then tear down.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Game`] if the game loop stopped on a fatal
    /// error. Teardown has completed either way.
    pub async fn run(self) -> Result<GameSummary, EngineError> {
        let Self {
            config,
            shutdown,
            generator,
            broadcaster,
            connector,
            gateway,
            inbound_task,
        } = self;

        let result = GameLoop::new(
            generator,
            Arc::clone(&broadcaster),
            shutdown.clone(),
            config.generator.tick_interval(),
        )
        .with_max_ticks(config.generator.max_ticks)
        .run()
        .await;

        if shutdown.trigger() {
            info!("Game over, shutting down");
        }

        let dropped = broadcaster.close();
        info!(subscribers = dropped, "Broadcaster closed");

        let grace = config.shutdown.grace_period();
        if tokio::time::timeout(grace, connector.stop()).await.is_err() {
            warn!(
                active = connector.active_sessions(),
                grace_period_ms = config.shutdown.grace_period_ms,
                "Sessions still open after grace period"
            );
        }

        match tokio::time::timeout(grace, gateway.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Gateway task failed"),
            Err(_) => warn!("Gateway did not stop within grace period"),
        }

        match inbound_task.await {
            Ok(seen) => info!(messages = seen, "Inbound consumer stopped"),
            Err(e) => warn!(error = %e, "Inbound consumer failed"),
        }

        result.map_err(EngineError::from)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use futures::StreamExt;
    use horde_core::GameEndReason;
    use horde_world::Zombie;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;

    use super::*;

    const ORIGIN: &str = "http://localhost:3000";

    fn test_config() -> HordeConfig {
        let mut config = HordeConfig::default();
        config.server.host = String::from("127.0.0.1");
        config.server.port = 0;
        config.server.allowed_origins = BTreeMap::from([(String::from(ORIGIN), true)]);
        config.generator.tick_interval_ms = 20;
        config.shutdown.grace_period_ms = 1000;
        config
    }

    async fn next_json<S>(client: &mut S) -> serde_json::Value
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(2), client.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if message.is_text() {
                return serde_json::from_str(message.to_text().unwrap()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn client_sees_snapshot_then_single_steps() {
        let shutdown = ShutdownSignal::new();
        let app = App::start(test_config(), shutdown.clone()).await.unwrap();
        let url = format!("ws://{}/zombie", app.local_addr());
        let running = tokio::spawn(app.run());

        let mut request = url.into_client_request().unwrap();
        request
            .headers_mut()
            .insert("origin", HeaderValue::from_static(ORIGIN));
        let (mut client, _) = tokio_tungstenite::connect_async(request).await.unwrap();

        let snapshot = next_json(&mut client).await;
        assert_eq!(snapshot["type"], "mapCreate");
        assert_eq!(snapshot["maxX"], 30);

        let mut previous: Option<(i64, i64)> = None;
        for _ in 0..3 {
            let frame = next_json(&mut client).await;
            assert_eq!(frame["type"], "zombieMove");
            assert_eq!(frame["id"], "1");
            let x = frame["x"].as_i64().unwrap();
            let y = frame["y"].as_i64().unwrap();
            assert!((0..30).contains(&x) && (0..30).contains(&y));
            if let Some((px, py)) = previous {
                assert!((x - px).abs() <= 1 && (y - py).abs() <= 1);
            }
            previous = Some((x, y));
        }

        shutdown.trigger();
        let summary = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(summary.end_reason, GameEndReason::Shutdown);
        assert!(summary.ticks >= 3);
    }

    #[tokio::test]
    async fn tick_limit_ends_the_process() {
        let mut config = test_config();
        config.generator.max_ticks = 3;
        config.generator.tick_interval_ms = 5;
        let shutdown = ShutdownSignal::new();

        let app = App::start(config, shutdown.clone()).await.unwrap();
        let summary = tokio::time::timeout(Duration::from_secs(5), app.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.end_reason, GameEndReason::TickLimit);
        assert_eq!(summary.ticks, 3);
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn zombie_outside_the_grid_fails_startup() {
        let mut config = test_config();
        config.generator.zombies = vec![Zombie::new("1", 40, 5)];

        let result = App::start(config, ShutdownSignal::new()).await;
        assert!(matches!(result, Err(EngineError::Generator { .. })));
    }
}
