//! WebSocket stream transport using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] reads the engine's per-match event stream at
//! `/games/{id}/stream`. Both `ws://` and `wss://` URLs are supported; TLS is
//! handled by [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! # Feature gate
//!
//! Only available with the `transport-websocket` feature (enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), deduction_observer::ObserverError> {
//! use deduction_observer::{Transport, WebSocketTransport};
//! use deduction_observer::protocol::MatchId;
//!
//! let match_id = MatchId::nil();
//! let mut transport = WebSocketTransport::connect_to_match("http://localhost:8000", match_id).await?;
//!
//! while let Some(Ok(msg)) = transport.recv().await {
//!     println!("received: {msg}");
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::ObserverError;
use crate::protocol::MatchId;
use crate::transport::Transport;

/// The underlying WebSocket stream type, public so callers can wrap a stream
/// they connected themselves via [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Derive the stream URL for a match from the engine's HTTP base URL.
///
/// `http` becomes `ws` and `https` becomes `wss`; a base that already uses a
/// WebSocket scheme is kept. Trailing slashes are ignored.
///
/// ```
/// use deduction_observer::transports::websocket::stream_url;
/// use deduction_observer::protocol::MatchId;
///
/// let url = stream_url("https://engine.example/", MatchId::nil());
/// assert_eq!(url, "wss://engine.example/games/00000000-0000-0000-0000-000000000000/stream");
/// ```
pub fn stream_url(base_url: &str, match_id: MatchId) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_owned()
    };
    format!("{base}/games/{match_id}/stream")
}

/// A [`Transport`] backed by a WebSocket connection.
///
/// Text frames are yielded as messages. Binary frames are skipped with a
/// warning, pings are answered by tungstenite, and a close frame ends the
/// stream.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future before it
/// completes does not lose a message, so it may be used inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::Io`] if the URL is invalid or the connection
    /// cannot be established. An underlying I/O error keeps its
    /// [`ErrorKind`](std::io::ErrorKind); anything else maps to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, ObserverError> {
        tracing::debug!(url = %url, "connecting to match stream");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            ObserverError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "match stream connected");

        Ok(Self::from_stream(stream))
    }

    /// Open the stream of `match_id` on the engine at `base_url`
    /// (see [`stream_url`]).
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn connect_to_match(base_url: &str, match_id: MatchId) -> Result<Self, ObserverError> {
        Self::connect(&stream_url(base_url, match_id)).await
    }

    /// Wrap an already-established WebSocket stream, for custom TLS, proxy
    /// headers or other setup that [`connect`](Self::connect) does not expose.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Like [`connect`](Self::connect), but fails with
    /// [`ObserverError::Timeout`] if the handshake does not finish in time.
    ///
    /// # Errors
    ///
    /// [`ObserverError::Timeout`] when the deadline elapses, or any error
    /// [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, ObserverError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| ObserverError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn recv(&mut self) -> Option<Result<String, ObserverError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(ObserverError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "match stream sent close frame");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // tungstenite queues the pong reply itself.
                }
                Message::Binary(bytes) => {
                    tracing::warn!(len = bytes.len(), "skipping binary frame on match stream");
                }
                Message::Frame(_) => {
                    // Never produced when reading.
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), ObserverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| ObserverError::TransportSend(e.to_string()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use futures_util::SinkExt;
    use tokio::net::TcpListener;

    /// Accept one WebSocket connection on a local port, run `handler` on it
    /// and return the engine-style HTTP base URL.
    async fn start_engine<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("http://{addr}")
    }

    #[test]
    fn stream_url_maps_schemes() {
        let id = MatchId::from_u128(5);
        assert_eq!(
            stream_url("http://localhost:8000", id),
            format!("ws://localhost:8000/games/{id}/stream")
        );
        assert_eq!(
            stream_url("https://h/", id),
            format!("wss://h/games/{id}/stream")
        );
        assert_eq!(stream_url("ws://h", id), format!("ws://h/games/{id}/stream"));
    }

    #[test]
    fn websocket_transport_is_send_and_debug() {
        fn assert_send_debug<T: Send + std::fmt::Debug>() {}
        assert_send_debug::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, ObserverError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            std::time::Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ObserverError::Timeout));
    }

    #[tokio::test]
    async fn receives_engine_events_then_none_on_close() {
        let base = start_engine(|mut ws| async move {
            ws.send(Message::Text(
                r#"{"type":"phase_tick","day":1,"phase":"Discussion","payload":{"seconds_remaining":9}}"#.into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Binary(vec![0xBE, 0xEF].into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"chat","payload":{"speaker":"A","text":"hi"}}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect_to_match(&base, MatchId::nil())
            .await
            .unwrap();

        let first = transport.recv().await.unwrap().unwrap();
        assert!(first.contains("phase_tick"));
        // Binary frame skipped.
        let second = transport.recv().await.unwrap().unwrap();
        assert!(second.contains("chat"));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn double_close_is_idempotent() {
        let base =
            start_engine(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} }).await;

        let mut transport = WebSocketTransport::connect_to_match(&base, MatchId::nil())
            .await
            .unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        match transport.recv().await {
            None | Some(Err(_)) => {}
            Some(Ok(msg)) => panic!("expected None or error after close, got Ok({msg:?})"),
        }
    }
}
