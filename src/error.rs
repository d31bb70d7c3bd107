//! Error types for the Caro client.

use thiserror::Error;

use crate::rejection::MoveRejection;

/// Errors that can occur when driving a Caro match.
#[derive(Debug, Error)]
pub enum CaroError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an open stream, but none is open.
    #[error("not connected to game stream")]
    NotConnected,

    /// The snapshot endpoint reported that the match does not exist.
    #[error("match {0} not found")]
    MatchNotFound(u64),

    /// The snapshot endpoint rejected the caller's credentials.
    #[error("not authorized to view this match")]
    Unauthorized,

    /// Any other failure while fetching the match snapshot.
    #[error("http error: {0}")]
    Http(String),

    /// A board payload did not describe a 15x15 grid.
    #[error("invalid board: {0}")]
    InvalidBoard(String),

    /// A stream was already opened for this match view.
    #[error("game stream already opened for this match")]
    StreamAlreadyOpen,

    /// The stream cannot be opened before the snapshot has loaded.
    #[error("match snapshot has not been loaded")]
    SnapshotPending,

    /// A local move was refused by the session controller.
    #[error("illegal move: {0}")]
    IllegalMove(#[from] MoveRejection),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Caro client operations.
pub type Result<T> = std::result::Result<T, CaroError>;
