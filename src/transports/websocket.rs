//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries the game stream over
//! `ws(s)://…/ws/game/{match_id}/?token=…`. Both `ws://` and `wss://` URLs are
//! supported; TLS is handled by [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), caro_client::CaroError> {
//! use caro_client::{Transport, WebSocketTransport};
//!
//! let url = "ws://localhost:8000/ws/game/42/?token=abc";
//! let mut transport = WebSocketTransport::connect(url).await?;
//! transport
//!     .send(r#"{"type":"make_move","row":7,"col":7,"player":"X"}"#.to_string())
//!     .await?;
//!
//! if let Some(Ok(msg)) = transport.recv().await {
//!     println!("server said: {msg}");
//! }
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::CaroError;
use crate::transport::Transport;

/// The underlying WebSocket stream, public so callers can build a
/// [`WebSocketTransport`] from their own handshake via
/// [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
///
/// Text frames map one-to-one onto stream messages. Binary frames are not part
/// of the game protocol and are skipped; ping/pong is answered by tungstenite.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future before it
/// completes does not lose a frame.
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
    /// Returns [`CaroError::Io`] if the URL is invalid or the handshake fails.
    /// I/O error kinds are preserved; everything else maps to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, CaroError> {
        tracing::debug!(url = %redact_token(url), "connecting to game stream");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            CaroError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %redact_token(url), "game stream connected");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established WebSocket stream (custom TLS, proxies,
    /// extra headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// [`connect`](Self::connect) with a deadline.
    ///
    /// # Errors
    ///
    /// [`CaroError::Timeout`] when the deadline elapses, otherwise whatever
    /// [`connect`](Self::connect) returns.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, CaroError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| CaroError::Timeout)?
    }
}

/// Strip the query string so access tokens never reach the logs.
fn redact_token(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), CaroError> {
        if self.closed {
            return Err(CaroError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| CaroError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, CaroError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(CaroError::TransportReceive(e.to_string()))),
            };

            match frame {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(close) => {
                    tracing::debug!(?close, "game stream close frame");
                    return None;
                }
                Message::Binary(bytes) => {
                    tracing::warn!(len = bytes.len(), "unexpected binary frame on game stream");
                }
                // Pong replies are queued by tungstenite; raw frames never
                // surface from the read half.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), CaroError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| CaroError::TransportSend(e.to_string()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::client::{MatchStream, MatchStreamConfig};
    use crate::event::StreamEvent;
    use tokio::net::TcpListener;

    /// Accept one WebSocket connection on an ephemeral port and run `handler`
    /// on it. Returns a game stream URL pointing at the listener.
    async fn game_server<F, Fut>(handler: F) -> String
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
        format!("ws://{addr}/ws/game/1/?token=secret")
    }

    #[test]
    fn redact_token_drops_query() {
        assert_eq!(
            redact_token("ws://h/ws/game/1/?token=secret"),
            "ws://h/ws/game/1/"
        );
        assert_eq!(redact_token("ws://h/ws"), "ws://h/ws");
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-url").await.unwrap_err();
        assert!(matches!(err, CaroError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Accepts the TCP connection but never answers the handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (_tcp, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let err = WebSocketTransport::connect_with_timeout(
            &format!("ws://{addr}/ws/game/1/?token=secret"),
            std::time::Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CaroError::Timeout), "got {err:?}");
        server.abort();
    }

    #[tokio::test]
    async fn receives_game_state_and_skips_binary() {
        let url = game_server(|mut ws| async move {
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text(
                r#"{"type":"game_state","data":{"board":[],"current_turn":"X"}}"#.into(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let text = transport.recv().await.unwrap().unwrap();
        assert!(text.contains("game_state"));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_is_refused_and_close_is_idempotent() {
        let url = game_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
            .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        let err = transport.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, CaroError::TransportClosed));
    }

    #[tokio::test]
    async fn move_broadcast_reaches_match_stream() {
        // The server echoes each make_move back as a move broadcast, the way
        // the game consumer does for every participant.
        let url = game_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let cmd: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                let echo = serde_json::json!({
                    "type": "move",
                    "row": cmd["row"],
                    "col": cmd["col"],
                    "player": cmd["player"],
                    "result": {"status": "success"},
                });
                ws.send(Message::Text(echo.to_string().into())).await.unwrap();
            }
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let transport = WebSocketTransport::connect(&url).await.unwrap();
        let (mut stream, mut events) = MatchStream::start(transport, MatchStreamConfig::default());
        assert!(matches!(events.recv().await.unwrap(), StreamEvent::Connected));

        let intent = crate::session::MoveIntent {
            id: uuid::Uuid::new_v4(),
            coord: crate::board::Coord::new(7, 7),
            symbol: crate::board::Symbol::Black,
        };
        stream.send_move(&intent).unwrap();

        let StreamEvent::MoveApplied(mv) = events.recv().await.unwrap() else {
            panic!("expected the echoed move");
        };
        assert_eq!(mv.coord(), intent.coord);
        assert_eq!(mv.player, intent.symbol);
        stream.shutdown().await;
    }
}
