//! The game loop.
//!
//! [`GameLoop::run`] ticks at a fixed interval. On every tick it asks the
//! [`EventGenerator`] for the next zombie move, encodes it as a
//! `zombieMove` frame, and publishes it through the [`Broadcaster`]. The
//! loop ends when:
//!
//! - the process-wide [`ShutdownSignal`] fires (clean stop),
//! - the configured tick limit is reached (clean stop), or
//! - the generator, the encoder, or the broadcaster fails (fatal error; the
//!   caller is expected to cancel the rest of the process).
//!
//! Cancellation is checked while waiting for the next tick and while a
//! publish is in flight, so a publish stalled on a slow subscriber under
//! [`OverflowPolicy::Block`](crate::broadcast::OverflowPolicy::Block) does
//! not delay shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use horde_types::{GameRunId, ServerMessage, ZombieMove};
use horde_world::{EventGenerator, GeneratorError};
use rand::Rng;
use rand::rngs::StdRng;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};

use crate::broadcast::{BroadcastError, Broadcaster};
use crate::shutdown::ShutdownSignal;

/// Errors that end the game loop.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The generator hit an invariant violation.
    #[error("could not generate next move: {source}")]
    Generator {
        /// The underlying generator error.
        #[from]
        source: GeneratorError,
    },

    /// A move could not be encoded.
    #[error("could not encode zombie move: {source}")]
    Encode {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The broadcaster refused the publish.
    #[error("could not broadcast zombie move: {source}")]
    Broadcast {
        /// The underlying broadcast error.
        #[from]
        source: BroadcastError,
    },
}

/// Why the game loop stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEndReason {
    /// The shutdown signal fired.
    Shutdown,
    /// The configured tick limit was reached.
    TickLimit,
}

/// Result of a completed game run.
#[derive(Debug, Clone)]
pub struct GameSummary {
    /// Identifier of this run, as logged.
    pub run_id: GameRunId,
    /// Why the loop stopped.
    pub end_reason: GameEndReason,
    /// Number of moves published.
    pub ticks: u64,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
    /// The last move published, if any.
    pub last_move: Option<ZombieMove>,
}

/// Drives the generator and publishes its moves.
#[derive(Debug)]
pub struct GameLoop<R = StdRng> {
    generator: EventGenerator<R>,
    broadcaster: Arc<Broadcaster<String>>,
    shutdown: ShutdownSignal,
    tick_interval: Duration,
    max_ticks: u64,
}

impl<R> GameLoop<R>
where
    R: Rng + Send,
{
    /// Create a loop publishing one move per `tick_interval`.
    pub const fn new(
        generator: EventGenerator<R>,
        broadcaster: Arc<Broadcaster<String>>,
        shutdown: ShutdownSignal,
        tick_interval: Duration,
    ) -> Self {
        Self {
            generator,
            broadcaster,
            shutdown,
            tick_interval,
            max_ticks: 0,
        }
    }

    /// Stop after `max_ticks` published moves (0 = unlimited).
    #[must_use]
    pub const fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Run until shutdown, the tick limit, or a fatal error.
    ///
    /// # Errors
    ///
    /// Returns [`GameError`] if generating, encoding, or publishing a move
    /// fails. The error has already been logged.
    pub async fn run(mut self) -> Result<GameSummary, GameError> {
        let run_id = GameRunId::new();
        let started_at = Utc::now();
        let mut ticks: u64 = 0;
        let mut last_move: Option<ZombieMove> = None;

        info!(
            %run_id,
            tick_interval_ms = u64::try_from(self.tick_interval.as_millis()).unwrap_or(u64::MAX),
            max_ticks = self.max_ticks,
            zombies = self.generator.zombies().len(),
            "Producing game events"
        );

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately; start one
        // full period from now instead.
        ticker.reset();

        let end_reason = loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    debug!(%run_id, "Game loop cancelled while waiting for tick");
                    break GameEndReason::Shutdown;
                }
                _ = ticker.tick() => {}
            }

            let zombie_move = self.generator.next_move().inspect_err(|e| {
                error!(%run_id, error = %e, "Generator failed, stopping game");
            })?;

            let frame = ServerMessage::from(zombie_move.clone())
                .to_json()
                .inspect_err(|e| {
                    error!(%run_id, error = %e, "Encoding failed, stopping game");
                })?;

            let report = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    debug!(%run_id, "Game loop cancelled during publish");
                    break GameEndReason::Shutdown;
                }
                result = self.broadcaster.publish(frame) => result.inspect_err(|e| {
                    error!(%run_id, error = %e, "Broadcast failed, stopping game");
                })?,
            };

            ticks = ticks.saturating_add(1);
            trace!(
                %run_id,
                tick = ticks,
                id = %zombie_move.id,
                x = zombie_move.x,
                y = zombie_move.y,
                delivered = report.delivered,
                dropped = report.dropped,
                disconnected = report.disconnected,
                "Zombie move published"
            );
            last_move = Some(zombie_move);

            if self.max_ticks > 0 && ticks >= self.max_ticks {
                info!(%run_id, ticks, "Tick limit reached");
                break GameEndReason::TickLimit;
            }
        };

        info!(%run_id, ?end_reason, ticks, "Game loop stopped");

        Ok(GameSummary {
            run_id,
            end_reason,
            ticks,
            started_at,
            last_move,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use horde_world::{WorldGrid, Zombie};

    use super::*;
    use crate::broadcast::OverflowPolicy;

    fn generator(seed: u64) -> EventGenerator {
        EventGenerator::seeded(WorldGrid::new(20, 10), vec![Zombie::new("1", 10, 5)], seed).unwrap()
    }

    fn hub() -> Arc<Broadcaster<String>> {
        Arc::new(Broadcaster::new(16, OverflowPolicy::Disconnect))
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_generator_sequence_until_tick_limit() {
        let broadcaster = hub();
        let mut sub = broadcaster.subscribe().unwrap();

        let summary = GameLoop::new(
            generator(45),
            Arc::clone(&broadcaster),
            ShutdownSignal::new(),
            Duration::from_secs(1),
        )
        .with_max_ticks(5)
        .run()
        .await
        .unwrap();

        assert_eq!(summary.end_reason, GameEndReason::TickLimit);
        assert_eq!(summary.ticks, 5);

        let mut expected = generator(45);
        for _ in 0..5 {
            let want = ServerMessage::from(expected.next_move().unwrap()).to_json().unwrap();
            assert_eq!(sub.recv().await.unwrap(), want);
        }
        assert!(sub.try_recv().is_err());
        assert_eq!(
            summary.last_move.map(|m| (m.x, m.y)),
            expected.zombies().first().map(|z| (z.x, z.y))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_one_interval() {
        let broadcaster = hub();
        let mut sub = broadcaster.subscribe().unwrap();
        let shutdown = ShutdownSignal::new();

        let game = tokio::spawn(
            GameLoop::new(
                generator(1),
                Arc::clone(&broadcaster),
                shutdown.clone(),
                Duration::from_secs(1),
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(sub.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(sub.try_recv().is_ok());

        shutdown.trigger();
        let summary = game.await.unwrap().unwrap();
        assert_eq!(summary.end_reason, GameEndReason::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_loop() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let summary = GameLoop::new(generator(2), hub(), shutdown, Duration::from_secs(1))
            .run()
            .await
            .unwrap();
        assert_eq!(summary.end_reason, GameEndReason::Shutdown);
        assert_eq!(summary.ticks, 0);
        assert!(summary.last_move.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_a_blocked_publish() {
        let broadcaster = Arc::new(Broadcaster::new(1, OverflowPolicy::Block));
        // Never drained: the second publish blocks forever.
        let _stuck = broadcaster.subscribe().unwrap();
        let shutdown = ShutdownSignal::new();

        let game = tokio::spawn(
            GameLoop::new(generator(3), broadcaster, shutdown.clone(), Duration::from_secs(1)).run(),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!game.is_finished());

        shutdown.trigger();
        let summary = game.await.unwrap().unwrap();
        assert_eq!(summary.end_reason, GameEndReason::Shutdown);
        assert_eq!(summary.ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_broadcaster_is_fatal() {
        let broadcaster = hub();
        broadcaster.close();

        let result = GameLoop::new(
            generator(4),
            broadcaster,
            ShutdownSignal::new(),
            Duration::from_millis(10),
        )
        .run()
        .await;
        assert!(matches!(
            result,
            Err(GameError::Broadcast {
                source: BroadcastError::Closed
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_without_subscribers() {
        let summary = GameLoop::new(generator(5), hub(), ShutdownSignal::new(), Duration::from_millis(10))
            .with_max_ticks(3)
            .run()
            .await
            .unwrap();
        assert_eq!(summary.ticks, 3);
    }
}
