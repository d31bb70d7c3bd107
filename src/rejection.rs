//! Reasons a locally originated move is refused.
//!
//! Rejections never change the board. The session reports them so a UI can
//! decide whether to ignore the click or surface a short notice.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the session controller refused a local move.
///
/// Serializes as `"SCREAMING_SNAKE_CASE"` (e.g., `"NOT_YOUR_TURN"`) so a
/// rejection can be forwarded to telemetry or a UI layer verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoveRejection {
    /// The session has not reached the active phase yet.
    NotActive,
    /// The match already finished.
    GameOver,
    /// The coordinate lies outside the board.
    OutOfBounds,
    /// The targeted cell already holds a stone.
    CellOccupied,
    /// Online only: the caller's symbol does not own the current turn.
    NotYourTurn,
    /// Online only: the caller holds no seat in this match.
    NoSeat,
    /// Online only: a previous move is still waiting for its server echo.
    AwaitingConfirmation,
}

impl MoveRejection {
    /// Returns a human-readable description of this rejection.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotActive => "The match is not ready yet.",
            Self::GameOver => "The game is already over.",
            Self::OutOfBounds => "That cell is outside the board.",
            Self::CellOccupied => "That cell is already taken.",
            Self::NotYourTurn => "Not your turn!",
            Self::NoSeat => "You are watching this match and cannot move.",
            Self::AwaitingConfirmation => "Waiting for the server to confirm your last move.",
        }
    }

    /// Whether the rejection should be surfaced to the player as a transient
    /// notice rather than silently ignored.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::NotYourTurn)
    }
}

impl fmt::Display for MoveRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl std::error::Error for MoveRejection {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_screaming_snake_case() {
        let json = serde_json::to_string(&MoveRejection::NotYourTurn).unwrap();
        assert_eq!(json, "\"NOT_YOUR_TURN\"");
        let back: MoveRejection = serde_json::from_str("\"CELL_OCCUPIED\"").unwrap();
        assert_eq!(back, MoveRejection::CellOccupied);
    }

    #[test]
    fn only_turn_violations_are_user_visible() {
        assert!(MoveRejection::NotYourTurn.is_user_visible());
        assert!(!MoveRejection::CellOccupied.is_user_visible());
        assert!(!MoveRejection::GameOver.is_user_visible());
    }

    #[test]
    fn display_uses_description() {
        assert_eq!(MoveRejection::NotYourTurn.to_string(), "Not your turn!");
    }
}
