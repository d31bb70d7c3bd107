//! Events emitted by the game stream.

use crate::protocol::{GameStatePayload, MovePayload, ServerMessage};

/// A typed event produced by the stream loop of a `MatchStream`.
///
/// `Connected` is always first and `Disconnected` is always last; everything
/// in between is a decoded server message.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Synthetic: the stream loop started on a connected transport.
    Connected,
    /// The server pushed the full board and turn.
    StateSync(GameStatePayload),
    /// The server applied a move.
    MoveApplied(MovePayload),
    /// The stream ended. `reason` is `None` when the server closed cleanly.
    Disconnected { reason: Option<String> },
}

impl StreamEvent {
    /// Convert a decoded server message. `game_state` with a `null` payload
    /// carries nothing and yields `None`.
    pub fn from_server(msg: ServerMessage) -> Option<Self> {
        match msg {
            ServerMessage::GameState { data } => data.map(Self::StateSync),
            ServerMessage::Move(payload) => Some(Self::MoveApplied(payload)),
        }
    }
}
