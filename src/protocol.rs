//! Wire-compatible protocol types for the Caro game API.
//!
//! Two surfaces are covered:
//!
//! - the one-shot match snapshot returned by `GET /api/games/{id}/`
//! - the JSON text messages exchanged over `/ws/game/{id}/`
//!
//! Fields the client never reads (ELO deltas, timestamps, player details) are
//! left out and ignored on deserialization.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::board::{Board, Coord, Symbol};

// ── Identifiers ─────────────────────────────────────────────────────

/// Server-side match identifier.
pub type MatchId = u64;

/// A user identity as the API reports it.
///
/// The backend emits numeric primary keys while federated identities carry
/// string subjects, so both JSON numbers and strings are accepted and
/// normalized to a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawUserId")]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUserId {
    Number(u64),
    Text(String),
}

impl From<RawUserId> for UserId {
    fn from(raw: RawUserId) -> Self {
        match raw {
            RawUserId::Number(n) => Self::from(n),
            RawUserId::Text(s) => Self(s),
        }
    }
}

// ── Enums ───────────────────────────────────────────────────────────

/// How a match is played.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Two players sharing one device.
    Local,
    /// Two remote players synchronized through the game stream.
    #[default]
    Online,
    /// One player against the computer.
    Ai,
}

/// Lifecycle status of a match as stored by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    Waiting,
    InProgress,
    Completed,
    Abandoned,
}

/// Final result of a completed match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    BlackWin,
    WhiteWin,
    Draw,
}

impl GameResult {
    /// The winning symbol, or `None` for a draw.
    pub fn winner(self) -> Option<Symbol> {
        match self {
            Self::BlackWin => Some(Symbol::Black),
            Self::WhiteWin => Some(Symbol::White),
            Self::Draw => None,
        }
    }

    /// The result in which `symbol` won.
    pub fn win_for(symbol: Symbol) -> Self {
        match symbol {
            Symbol::Black => Self::BlackWin,
            Symbol::White => Self::WhiteWin,
        }
    }
}

/// Status attached to a broadcast move.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoveStatus {
    /// The move was recorded and the game continues.
    Success,
    /// The move ended the game.
    GameOver,
    /// The server refused the move.
    Error,
}

fn black_moves_first() -> Symbol {
    Symbol::Black
}

// ── Snapshot ────────────────────────────────────────────────────────

/// One committed move as stored in the match history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveRecord {
    pub row: usize,
    pub col: usize,
    pub player: Symbol,
}

impl MoveRecord {
    pub fn new(coord: Coord, player: Symbol) -> Self {
        Self {
            row: coord.row,
            col: coord.col,
            player,
        }
    }

    pub fn coord(&self) -> Coord {
        Coord::new(self.row, self.col)
    }
}

/// Match metadata and state returned by the snapshot endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub id: MatchId,
    #[serde(default)]
    pub mode: MatchMode,
    #[serde(default)]
    pub status: MatchStatus,
    #[serde(default)]
    pub result: Option<GameResult>,
    #[serde(default)]
    pub black_player: Option<UserId>,
    #[serde(default)]
    pub white_player: Option<UserId>,
    /// Empty until the server records the first move.
    #[serde(default)]
    pub board_state: Board,
    #[serde(default)]
    pub move_history: Vec<MoveRecord>,
    #[serde(default = "black_moves_first")]
    pub current_turn: Symbol,
    #[serde(default)]
    pub winning_line: Option<Vec<Coord>>,
}

impl MatchSnapshot {
    /// Whether the server already considers the match over.
    pub fn is_completed(&self) -> bool {
        self.status == MatchStatus::Completed
    }
}

// ── Stream payloads ─────────────────────────────────────────────────

/// Full board/turn state pushed by the server right after the stream opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStatePayload {
    #[serde(default)]
    pub board: Board,
    #[serde(default = "black_moves_first")]
    pub current_turn: Symbol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MatchStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<GameResult>,
}

/// Outcome the server attached to a broadcast move.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveResult {
    pub status: MoveStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<GameResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_line: Option<Vec<Coord>>,
    /// Server-side reason when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MoveResult {
    /// The final result when this move ended the game.
    pub fn game_over(&self) -> Option<GameResult> {
        match self.status {
            MoveStatus::GameOver => self.result,
            _ => None,
        }
    }
}

/// A move broadcast to every participant of the match, sender included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MovePayload {
    pub row: usize,
    pub col: usize,
    pub player: Symbol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<MoveResult>,
}

impl MovePayload {
    pub fn coord(&self) -> Coord {
        Coord::new(self.row, self.col)
    }

    /// Whether the server refused this move.
    pub fn is_rejected(&self) -> bool {
        matches!(
            self.result,
            Some(MoveResult {
                status: MoveStatus::Error,
                ..
            })
        )
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the server to place `player` at (`row`, `col`).
    MakeMove {
        row: usize,
        col: usize,
        player: Symbol,
    },
}

/// Message types sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Current state, sent once on connect. `data` is `null` when the server
    /// could not find the match.
    GameState { data: Option<GameStatePayload> },
    /// A move applied by the server.
    Move(MovePayload),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn make_move_has_flat_shape() {
        let msg = ClientMessage::MakeMove {
            row: 3,
            col: 4,
            player: Symbol::Black,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "make_move", "row": 3, "col": 4, "player": "X"})
        );
    }

    #[test]
    fn user_id_accepts_numbers_and_strings() {
        let a: UserId = serde_json::from_str("42").unwrap();
        let b: UserId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "42");
    }

    #[test]
    fn game_result_winner() {
        assert_eq!(GameResult::BlackWin.winner(), Some(Symbol::Black));
        assert_eq!(GameResult::WhiteWin.winner(), Some(Symbol::White));
        assert_eq!(GameResult::Draw.winner(), None);
        assert_eq!(GameResult::win_for(Symbol::White), GameResult::WhiteWin);
    }

    #[test]
    fn move_without_result_parses() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"move","row":1,"col":2,"player":"O"}"#).unwrap();
        let ServerMessage::Move(payload) = msg else {
            panic!("expected move");
        };
        assert_eq!(payload.coord(), Coord::new(1, 2));
        assert_eq!(payload.player, Symbol::White);
        assert!(payload.result.is_none());
        assert!(!payload.is_rejected());
    }

    #[test]
    fn game_over_requires_game_over_status() {
        let success = MoveResult {
            status: MoveStatus::Success,
            result: Some(GameResult::Draw),
            winning_line: None,
            message: None,
        };
        assert_eq!(success.game_over(), None);
        let over = MoveResult {
            status: MoveStatus::GameOver,
            ..success
        };
        assert_eq!(over.game_over(), Some(GameResult::Draw));
    }
}
