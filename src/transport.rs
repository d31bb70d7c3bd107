//! Transport abstraction for the game stream.
//!
//! The [`Transport`] trait is a bidirectional text message channel between the
//! client and the game server. The stream protocol uses JSON text messages, so
//! implementations handle framing internally (WebSocket frames, an in-process
//! channel in tests, and so on).
//!
//! # Connection Setup
//!
//! Connection setup is NOT part of this trait. Connect externally (for
//! WebSocket, to `ws(s)://…/ws/game/{match_id}/?token=…`), then hand the
//! connected transport to `MatchStream::start`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use caro_client::error::CaroError;
//! use caro_client::transport::Transport;
//! use tokio::sync::mpsc;
//!
//! struct ChannelTransport {
//!     tx: mpsc::UnboundedSender<String>,
//!     rx: mpsc::UnboundedReceiver<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for ChannelTransport {
//!     async fn send(&mut self, message: String) -> Result<(), CaroError> {
//!         self.tx.send(message).map_err(|e| CaroError::TransportSend(e.to_string()))
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, CaroError>> {
//!         self.rx.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), CaroError> {
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::CaroError;

/// A bidirectional text message transport for the game stream.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON message
/// and each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the stream loop
/// polls it inside `tokio::select!`. Channel-based implementations are
/// naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`CaroError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), CaroError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the server closed the connection cleanly
    async fn recv(&mut self) -> Option<Result<String, CaroError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), CaroError>;
}
