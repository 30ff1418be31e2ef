//! One client connection.
//!
//! A [`Session`] bridges a duplex text transport to the server's channels:
//!
//! - the **reader task** forwards every frame the client sends into the
//!   shared inbound channel,
//! - the **writer task** drains the session's outbound queue (fed by the
//!   broadcaster) into the transport,
//! - the **closer** (the task running [`Session::run`]) waits for the first
//!   of: a reader failure, a writer failure, the broadcaster dropping the
//!   queue, or process shutdown. It then stops the writer, stops the
//!   reader, and closes the transport exactly once.
//!
//! State machine:
//!
//! ```text
//! Open -> { ReadFailed | WriteFailed | Detached | Cancelled } -> Closing -> Closed
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Sink, Stream, StreamExt};
use horde_core::{InboundMessage, ShutdownSignal};
use horde_types::SessionId;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::transport::{CloseOnce, TransportError};

/// How long closing the transport may take before it is abandoned.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Both directions are running.
    Open,
    /// The client stream ended or failed.
    ReadFailed,
    /// Writing to the client failed.
    WriteFailed,
    /// The broadcaster dropped the outbound queue.
    Detached,
    /// Process shutdown was requested.
    Cancelled,
    /// Tasks are being stopped and the transport closed.
    Closing,
    /// Everything is released.
    Closed,
}

/// The first event that ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client stream ended or failed.
    ReadFailed,
    /// Writing to the client failed.
    WriteFailed,
    /// The broadcaster dropped the outbound queue.
    Detached,
    /// Process shutdown was requested.
    Cancelled,
}

impl CloseReason {
    /// The state this reason moves a session into.
    pub const fn state(self) -> SessionState {
        match self {
            Self::ReadFailed => SessionState::ReadFailed,
            Self::WriteFailed => SessionState::WriteFailed,
            Self::Detached => SessionState::Detached,
            Self::Cancelled => SessionState::Cancelled,
        }
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// The session.
    pub id: SessionId,
    /// What ended it.
    pub reason: CloseReason,
    /// Frames received from the client.
    pub messages_in: u64,
    /// Frames written to the client.
    pub messages_out: u64,
    /// When the session started running.
    pub opened_at: DateTime<Utc>,
    /// When the transport was released.
    pub closed_at: DateTime<Utc>,
}

/// A client connection ready to run.
#[derive(Debug)]
pub struct Session<W, R> {
    id: SessionId,
    writer: W,
    reader: R,
    outbound: mpsc::Receiver<String>,
    inbound: mpsc::Sender<InboundMessage>,
    shutdown: ShutdownSignal,
    state: watch::Sender<SessionState>,
    close_timeout: Duration,
}

impl<W, R> Session<W, R>
where
    W: Sink<String, Error = TransportError> + Unpin + Send + 'static,
    R: Stream<Item = Result<String, TransportError>> + Unpin + Send + 'static,
{
    /// Assemble a session.
    ///
    /// `outbound` is the receiving end of the queue registered with the
    /// broadcaster; `inbound` is the shared client-message channel.
    pub fn new(
        id: SessionId,
        writer: W,
        reader: R,
        outbound: mpsc::Receiver<String>,
        inbound: mpsc::Sender<InboundMessage>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Open);
        Self {
            id,
            writer,
            reader,
            outbound,
            inbound,
            shutdown,
            state,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Override how long closing the transport may take.
    #[must_use]
    pub const fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// The session id.
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run until the first failure or shutdown, then release everything.
    pub async fn run(self) -> SessionOutcome {
        let Self {
            id,
            writer,
            reader,
            outbound,
            inbound,
            shutdown,
            state,
            close_timeout,
        } = self;

        let opened_at = Utc::now();
        info!(session_id = %id, "Session opened");

        let received = Arc::new(AtomicU64::new(0));
        // Each task reports at most once, so two slots never block.
        let (report_tx, mut report_rx) = mpsc::channel::<CloseReason>(2);
        let (stop_tx, stop_rx) = watch::channel(false);

        let reader_task = tokio::spawn(read_loop(
            id,
            reader,
            inbound,
            Arc::clone(&received),
            report_tx.clone(),
        ));
        let writer_task = tokio::spawn(write_loop(
            id,
            CloseOnce::new(writer),
            outbound,
            stop_rx,
            report_tx,
        ));

        let reason = tokio::select! {
            biased;
            () = shutdown.cancelled() => CloseReason::Cancelled,
            // Both tasks gone without a report means both panicked.
            reported = report_rx.recv() => reported.unwrap_or(CloseReason::ReadFailed),
        };

        transition(&state, id, reason.state());
        transition(&state, id, SessionState::Closing);

        let _ = stop_tx.send(true);
        let (writer, messages_out) = match writer_task.await {
            Ok((writer, sent)) => (Some(writer), sent),
            Err(e) => {
                warn!(session_id = %id, error = %e, "Writer task failed");
                (None, 0)
            }
        };

        reader_task.abort();
        let _ = reader_task.await;

        if let Some(mut writer) = writer {
            match tokio::time::timeout(close_timeout, writer.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(session_id = %id, error = %e, "Transport close failed"),
                Err(_) => debug!(session_id = %id, "Transport close timed out"),
            }
        }

        transition(&state, id, SessionState::Closed);

        let outcome = SessionOutcome {
            id,
            reason,
            messages_in: received.load(Ordering::Relaxed),
            messages_out,
            opened_at,
            closed_at: Utc::now(),
        };
        info!(
            session_id = %id,
            reason = ?outcome.reason,
            messages_in = outcome.messages_in,
            messages_out = outcome.messages_out,
            "Session closed"
        );
        outcome
    }
}

fn transition(state: &watch::Sender<SessionState>, id: SessionId, next: SessionState) {
    debug!(session_id = %id, state = ?next, "Session state");
    state.send_replace(next);
}

async fn read_loop<R>(
    id: SessionId,
    mut reader: R,
    inbound: mpsc::Sender<InboundMessage>,
    received: Arc<AtomicU64>,
    report: mpsc::Sender<CloseReason>,
) where
    R: Stream<Item = Result<String, TransportError>> + Unpin,
{
    loop {
        match reader.next().await {
            Some(Ok(text)) => {
                received.fetch_add(1, Ordering::Relaxed);
                debug!(session_id = %id, len = text.len(), "Message received from client");
                if inbound.send(InboundMessage::new(id, text)).await.is_err() {
                    debug!(session_id = %id, "Inbound consumer gone, message dropped");
                }
            }
            Some(Err(e)) if e.is_closed() => {
                info!(session_id = %id, "Client disconnected");
                break;
            }
            Some(Err(e)) => {
                warn!(session_id = %id, error = %e, "Could not read from client");
                break;
            }
            None => {
                info!(session_id = %id, "Client disconnected");
                break;
            }
        }
    }
    let _ = report.try_send(CloseReason::ReadFailed);
}

async fn write_loop<W>(
    id: SessionId,
    mut writer: CloseOnce<W>,
    mut outbound: mpsc::Receiver<String>,
    mut stop: watch::Receiver<bool>,
    report: mpsc::Sender<CloseReason>,
) -> (CloseOnce<W>, u64)
where
    W: Sink<String, Error = TransportError> + Unpin,
{
    let mut sent: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    debug!(session_id = %id, "Outbound queue detached");
                    let _ = report.try_send(CloseReason::Detached);
                    break;
                };
                let result = tokio::select! {
                    biased;
                    _ = stop.changed() => break,
                    result = writer.send(frame) => result,
                };
                if let Err(e) = result {
                    info!(session_id = %id, error = %e, "Could not send message to client");
                    let _ = report.try_send(CloseReason::WriteFailed);
                    break;
                }
                sent = sent.saturating_add(1);
            }
        }
    }
    (writer, sent)
}
