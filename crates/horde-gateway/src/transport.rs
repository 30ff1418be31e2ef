//! Text-frame transport seam.
//!
//! Sessions are written against any `Sink<String>` writer plus a
//! `Stream<Item = Result<String, _>>` reader, both failing with
//! [`TransportError`]. [`split_websocket`] adapts an Axum
//! [`WebSocket`] to that shape; tests use in-memory channels.

use std::io;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt, TryStreamExt, future};

/// A transport read or write failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer or the local side already closed the connection.
    #[error("connection closed")]
    Closed,

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether this error only says the connection is already closed.
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl From<axum::Error> for TransportError {
    fn from(err: axum::Error) -> Self {
        classify(&err)
    }
}

/// Phrases tungstenite uses for `ConnectionClosed` and `AlreadyClosed`.
const CLOSED_PHRASES: [&str; 2] = ["connection closed", "closed connection"];

/// Walk the source chain looking for a closed-connection cause.
fn classify(err: &(dyn std::error::Error + 'static)) -> TransportError {
    if chain(err).any(is_io_disconnect) {
        return TransportError::Closed;
    }
    // Fallback: axum's `Error` hides the tungstenite error kind, so the
    // closed variants are only recognisable by their message.
    let closed_message = chain(err).any(|cause| {
        let text = cause.to_string().to_ascii_lowercase();
        CLOSED_PHRASES.iter().any(|phrase| text.contains(phrase))
    });
    if closed_message {
        return TransportError::Closed;
    }
    TransportError::Other(err.to_string())
}

fn chain<'a>(
    err: &'a (dyn std::error::Error + 'static),
) -> impl Iterator<Item = &'a (dyn std::error::Error + 'static)> {
    std::iter::successors(Some(err), |cause| cause.source())
}

fn is_io_disconnect(cause: &(dyn std::error::Error + 'static)) -> bool {
    cause.downcast_ref::<io::Error>().is_some_and(|io_err| {
        matches!(
            io_err.kind(),
            io::ErrorKind::BrokenPipe
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::UnexpectedEof
        )
    })
}

/// Split an upgraded socket into a text writer and a text reader.
///
/// Binary frames are read as lossy UTF-8. Control frames are skipped; a
/// close frame ends the reader.
pub fn split_websocket(
    socket: WebSocket,
) -> (
    impl Sink<String, Error = TransportError> + Unpin + Send + 'static,
    impl Stream<Item = Result<String, TransportError>> + Unpin + Send + 'static,
) {
    let (sink, stream) = socket.split();

    let writer = sink
        .with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))))
        .sink_map_err(TransportError::from);

    let reader = stream
        .try_filter_map(|message| {
            future::ready(Ok(match message {
                Message::Text(text) => Some(text.as_str().to_owned()),
                Message::Binary(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
            }))
        })
        .map_err(TransportError::from);

    (writer, reader)
}

/// Writer wrapper whose [`close`](Self::close) is idempotent.
///
/// The first call closes the underlying sink; later calls return `Ok`. An
/// "already closed" failure from the sink also counts as success.
#[derive(Debug)]
pub struct CloseOnce<W> {
    sink: W,
    closed: bool,
}

impl<W> CloseOnce<W>
where
    W: Sink<String, Error = TransportError> + Unpin,
{
    /// Wrap a writer.
    pub const fn new(sink: W) -> Self {
        Self {
            sink,
            closed: false,
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] after [`close`](Self::close), or
    /// whatever the underlying sink reports.
    pub async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sink.send(text).await
    }

    /// Close the writer once.
    ///
    /// # Errors
    ///
    /// Returns the sink's close failure, unless it only says the connection
    /// was already closed.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.sink.close().await {
            Err(e) if e.is_closed() => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::channel::mpsc;

    use super::*;

    #[tokio::test]
    async fn close_twice_is_ok() {
        let (tx, mut rx) = mpsc::unbounded::<String>();
        let mut writer = CloseOnce::new(tx.sink_map_err(|_send_error| TransportError::Closed));

        writer.send(String::from("hello")).await.unwrap();
        assert!(writer.close().await.is_ok());
        assert!(writer.close().await.is_ok());
        assert!(writer.is_closed());

        assert_eq!(rx.next().await.as_deref(), Some("hello"));
        assert_eq!(rx.next().await, None);
    }

    #[tokio::test]
    async fn closing_an_already_closed_peer_is_ok() {
        let (tx, rx) = mpsc::unbounded::<String>();
        drop(rx);
        let mut writer = CloseOnce::new(tx.sink_map_err(|_send_error| TransportError::Closed));

        assert_eq!(writer.send(String::from("lost")).await, Err(TransportError::Closed));
        assert!(writer.close().await.is_ok());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (tx, _rx) = mpsc::unbounded::<String>();
        let mut writer = CloseOnce::new(tx.sink_map_err(|_send_error| TransportError::Closed));
        writer.close().await.unwrap();
        assert_eq!(writer.send(String::from("late")).await, Err(TransportError::Closed));
    }

    #[test]
    fn io_disconnects_are_classified_as_closed() {
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(classify(&reset), TransportError::Closed);

        let other = io::Error::other("boom");
        assert!(matches!(classify(&other), TransportError::Other(_)));
    }

    #[test]
    fn closed_messages_fall_back_to_closed() {
        let closed = io::Error::other("Trying to work with closed connection");
        assert_eq!(classify(&closed), TransportError::Closed);

        let normal = io::Error::other("Connection closed normally");
        assert_eq!(classify(&normal), TransportError::Closed);

        let unrelated = io::Error::other("stream closed by codec");
        assert!(matches!(classify(&unrelated), TransportError::Other(_)));
    }
}
