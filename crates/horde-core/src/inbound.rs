//! Messages received from clients.
//!
//! Every session forwards the text frames its client sends into one shared
//! channel. Nothing acts on them yet; the consumer loop hands each message
//! to an observer closure (the server binary logs them).

use chrono::{DateTime, Utc};
use horde_types::SessionId;
use tokio::sync::mpsc;
use tracing::debug;

use crate::shutdown::ShutdownSignal;

/// One text frame received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// The session that received the frame.
    pub session_id: SessionId,
    /// Frame payload.
    pub text: String,
    /// When the frame was read.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Stamp a frame received now.
    pub fn new(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            session_id,
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// Create the shared inbound channel.
pub fn inbound_channel(
    capacity: usize,
) -> (mpsc::Sender<InboundMessage>, mpsc::Receiver<InboundMessage>) {
    mpsc::channel(capacity.max(1))
}

/// Drain the inbound channel until shutdown or until every sender is gone.
///
/// Returns the number of messages observed.
pub async fn consume_inbound<F>(
    mut inbound: mpsc::Receiver<InboundMessage>,
    shutdown: ShutdownSignal,
    mut on_message: F,
) -> u64
where
    F: FnMut(&InboundMessage) + Send,
{
    let mut seen: u64 = 0;
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                debug!(seen, "Stopped listening for client messages");
                break;
            }
            message = inbound.recv() => {
                let Some(message) = message else {
                    debug!(seen, "Inbound channel closed");
                    break;
                };
                seen = seen.saturating_add(1);
                on_message(&message);
            }
        }
    }
    seen
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn observes_messages_until_senders_are_gone() {
        let (tx, rx) = inbound_channel(4);
        let session = SessionId::new();
        tx.send(InboundMessage::new(session, "hello")).await.unwrap();
        tx.send(InboundMessage::new(session, "again")).await.unwrap();
        drop(tx);

        let mut texts = Vec::new();
        let seen = consume_inbound(rx, ShutdownSignal::new(), |m| texts.push(m.text.clone())).await;
        assert_eq!(seen, 2);
        assert_eq!(texts, ["hello", "again"]);
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let (_tx, rx) = inbound_channel(4);
        let shutdown = ShutdownSignal::new();
        let consumer = tokio::spawn(consume_inbound(rx, shutdown.clone(), |_| {}));

        shutdown.trigger();
        let seen = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, 0);
    }
}
