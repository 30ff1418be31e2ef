//! Connection acceptance.
//!
//! A [`Connector`] turns incoming duplex streams into running sessions. The
//! only implementation is [`WebSocketConnector`], fed by the Axum upgrade
//! handler; other transports plug in behind the same trait.
//!
//! For every accepted stream the connector:
//!
//! 1. creates the session's bounded outbound queue,
//! 2. runs the on-connect hook, which queues the world snapshot,
//! 3. registers the queue with the [`Broadcaster`],
//! 4. runs the [`Session`] until it closes, then unregisters the queue.
//!
//! Because the snapshot is queued before step 3, it is always the first
//! frame a client receives.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use futures::{Sink, Stream};
use horde_core::{Broadcaster, InboundMessage, ShutdownSignal};
use horde_types::{ServerMessage, SessionId};
use horde_world::WorldGrid;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{AcceptError, ConnectorError, OnConnectError};
use crate::session::{Session, SessionOutcome};
use crate::transport::{CloseOnce, TransportError};

/// Hook run once per accepted stream, before the session subscribes.
pub type OnConnect = Arc<dyn Fn(&Outbox) -> Result<(), OnConnectError> + Send + Sync>;

/// Accepts duplex streams and keeps their sessions alive.
pub trait Connector: Send + Sync {
    /// Install the on-connect hook and start accepting.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::AlreadyListening`] on a second call; the
    /// first hook stays installed.
    fn listen_for_connections(&self, on_connect: OnConnect) -> Result<(), ConnectorError>;

    /// Refuse new streams and wait until every running session has closed.
    fn stop(&self) -> impl Future<Output = ()> + Send;
}

/// A new session's outbound queue, as seen by the on-connect hook.
#[derive(Debug)]
pub struct Outbox {
    session_id: SessionId,
    sender: mpsc::Sender<String>,
}

impl Outbox {
    /// The session being set up.
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Queue a raw text frame.
    ///
    /// # Errors
    ///
    /// Returns [`OnConnectError::OutboxFull`] when the queue has no room.
    pub fn push(&self, frame: String) -> Result<(), OnConnectError> {
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => OnConnectError::OutboxFull,
            mpsc::error::TrySendError::Closed(_) => OnConnectError::OutboxClosed,
        })
    }

    /// Encode and queue a server message.
    ///
    /// # Errors
    ///
    /// Returns [`OnConnectError::Encode`] if the message cannot be encoded,
    /// or the errors of [`push`](Self::push).
    pub fn push_message(&self, message: &ServerMessage) -> Result<(), OnConnectError> {
        self.push(message.to_json()?)
    }
}

/// Build the hook that greets every client with the grid snapshot.
///
/// The snapshot is encoded once, here.
///
/// # Errors
///
/// Returns the JSON error if the snapshot cannot be encoded.
pub fn snapshot_on_connect(grid: &WorldGrid) -> Result<OnConnect, serde_json::Error> {
    let frame = ServerMessage::from(grid.snapshot()).to_json()?;
    Ok(Arc::new(move |outbox: &Outbox| {
        outbox.push(frame.clone())?;
        debug!(session_id = %outbox.session_id(), "Snapshot queued");
        Ok(())
    }))
}

/// Counts running sessions so [`Connector::stop`] can wait for them.
#[derive(Debug)]
struct SessionTracker {
    active: watch::Sender<usize>,
}

impl SessionTracker {
    fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self { active }
    }

    fn enter(self: &Arc<Self>) -> SessionTicket {
        self.active.send_modify(|n| *n = n.saturating_add(1));
        SessionTicket {
            tracker: Arc::clone(self),
        }
    }

    fn active(&self) -> usize {
        *self.active.borrow()
    }

    async fn drained(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

struct SessionTicket {
    tracker: Arc<SessionTracker>,
}

impl Drop for SessionTicket {
    fn drop(&mut self) {
        self.tracker
            .active
            .send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Connector for streams upgraded by the `WebSocket` handler.
pub struct WebSocketConnector {
    broadcaster: Arc<Broadcaster<String>>,
    inbound: mpsc::Sender<InboundMessage>,
    shutdown: ShutdownSignal,
    on_connect: OnceLock<OnConnect>,
    stopped: AtomicBool,
    sessions: Arc<SessionTracker>,
}

impl std::fmt::Debug for WebSocketConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnector")
            .field("listening", &self.is_listening())
            .field("active_sessions", &self.active_sessions())
            .finish_non_exhaustive()
    }
}

impl WebSocketConnector {
    /// Create a connector that is not yet listening.
    pub fn new(
        broadcaster: Arc<Broadcaster<String>>,
        inbound: mpsc::Sender<InboundMessage>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            broadcaster,
            inbound,
            shutdown,
            on_connect: OnceLock::new(),
            stopped: AtomicBool::new(false),
            sessions: Arc::new(SessionTracker::new()),
        }
    }

    /// Whether new streams are accepted right now.
    pub fn is_listening(&self) -> bool {
        self.on_connect.get().is_some() && !self.stopped.load(Ordering::SeqCst)
    }

    /// Number of sessions currently running.
    pub fn active_sessions(&self) -> usize {
        self.sessions.active()
    }

    /// Turn one duplex stream into a session and run it to completion.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptError`] if the connector is not listening, the
    /// on-connect hook fails, or the broadcaster is closed. In the last two
    /// cases the stream is closed before returning.
    pub async fn accept<W, R>(&self, writer: W, reader: R) -> Result<SessionOutcome, AcceptError>
    where
        W: Sink<String, Error = TransportError> + Unpin + Send + 'static,
        R: Stream<Item = Result<String, TransportError>> + Unpin + Send + 'static,
    {
        let on_connect = self.on_connect.get().ok_or(AcceptError::NotListening)?;
        // Counted before the stop check so `stop` either sees this session
        // or this session sees `stopped`.
        let _ticket = self.sessions.enter();
        if self.stopped.load(Ordering::SeqCst) {
            return Err(AcceptError::Stopped);
        }

        let id = SessionId::new();
        let (sender, outbound) = mpsc::channel(self.broadcaster.capacity());
        let outbox = Outbox {
            session_id: id,
            sender,
        };

        if let Err(e) = on_connect(&outbox) {
            warn!(session_id = %id, error = %e, "On-connect hook failed, closing stream");
            close_quietly(writer).await;
            return Err(e.into());
        }

        let subscription = match self.broadcaster.register(outbox.sender) {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Could not subscribe session, closing stream");
                close_quietly(writer).await;
                return Err(e.into());
            }
        };
        debug!(session_id = %id, subscriber = %subscription.id(), "Session subscribed");

        let outcome = Session::new(
            id,
            writer,
            reader,
            outbound,
            self.inbound.clone(),
            self.shutdown.clone(),
        )
        .run()
        .await;

        drop(subscription);
        Ok(outcome)
    }
}

impl Connector for WebSocketConnector {
    fn listen_for_connections(&self, on_connect: OnConnect) -> Result<(), ConnectorError> {
        if self.on_connect.set(on_connect).is_err() {
            return Err(ConnectorError::AlreadyListening);
        }
        info!("Listening for connections");
        Ok(())
    }

    fn stop(&self) -> impl Future<Output = ()> + Send {
        self.stopped.store(true, Ordering::SeqCst);
        let sessions = Arc::clone(&self.sessions);
        async move {
            let active = sessions.active();
            if active > 0 {
                info!(active, "Waiting for sessions to close");
            }
            sessions.drained().await;
            info!("All sessions closed");
        }
    }
}

async fn close_quietly<W>(writer: W)
where
    W: Sink<String, Error = TransportError> + Unpin,
{
    if let Err(e) = CloseOnce::new(writer).close().await {
        debug!(error = %e, "Closing rejected stream failed");
    }
}
