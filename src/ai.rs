//! Computer opponent.
//!
//! Move selection sits behind the [`MoveStrategy`] trait so the policy can be
//! swapped without touching the session controller. The only contract is
//! "return an empty cell"; the controller evaluates the result with the same
//! win predicate as every other move.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::board::{winning_run, Board, Coord, Symbol};
use crate::session::{LocalMove, MatchSession};

/// Pause before the computer answers a human move.
pub const DEFAULT_THINKING_DELAY: Duration = Duration::from_millis(500);

/// A policy that picks the next cell for `symbol`.
pub trait MoveStrategy: Send {
    /// Choose an empty cell, or `None` when the board is full.
    fn select(&mut self, board: &Board, symbol: Symbol) -> Option<Coord>;
}

// ── Random ──────────────────────────────────────────────────────────

/// Uniformly random over empty cells.
#[derive(Debug)]
pub struct RandomStrategy {
    rng: StdRng,
}

impl RandomStrategy {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sequence for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveStrategy for RandomStrategy {
    fn select(&mut self, board: &Board, _symbol: Symbol) -> Option<Coord> {
        let empty: Vec<Coord> = board.empty_cells().collect();
        empty.choose(&mut self.rng).copied()
    }
}

// ── Threat ──────────────────────────────────────────────────────────

/// Win if possible, otherwise block, otherwise play next to existing stones.
///
/// Priority:
/// 1. a cell that completes five for `symbol`
/// 2. a cell that would complete five for the opponent
/// 3. a random empty neighbour of any stone
/// 4. the centre on an empty board, else any random empty cell
#[derive(Debug)]
pub struct ThreatStrategy {
    fallback: RandomStrategy,
}

impl ThreatStrategy {
    pub fn new() -> Self {
        Self {
            fallback: RandomStrategy::new(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            fallback: RandomStrategy::seeded(seed),
        }
    }

    fn completing_move(board: &Board, symbol: Symbol) -> Option<Coord> {
        board.empty_cells().find(|&c| {
            let mut probe = board.clone();
            probe.place(c, symbol).is_ok() && winning_run(&probe, c, symbol).is_some()
        })
    }

    fn neighbours(board: &Board) -> Vec<Coord> {
        let mut out: Vec<Coord> = board
            .stones()
            .flat_map(|(c, _)| {
                (-1..=1).flat_map(move |dr| (-1..=1).filter_map(move |dc| c.offset(dr, dc)))
            })
            .filter(|&c| board.is_empty_at(c))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

impl Default for ThreatStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveStrategy for ThreatStrategy {
    fn select(&mut self, board: &Board, symbol: Symbol) -> Option<Coord> {
        if board.stone_count() == 0 {
            return Some(Coord::center());
        }
        if let Some(c) = Self::completing_move(board, symbol) {
            return Some(c);
        }
        if let Some(c) = Self::completing_move(board, symbol.opponent()) {
            return Some(c);
        }
        let near = Self::neighbours(board);
        if let Some(c) = near.choose(&mut self.fallback.rng) {
            return Some(*c);
        }
        self.fallback.select(board, symbol)
    }
}

// ── Difficulty ──────────────────────────────────────────────────────

/// Preset strength levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// The strategy for this level.
    // TODO: give Hard its own alpha-beta search instead of sharing ThreatStrategy.
    pub fn strategy(self) -> Box<dyn MoveStrategy> {
        match self {
            Self::Easy => Box::new(RandomStrategy::new()),
            Self::Medium | Self::Hard => Box::new(ThreatStrategy::new()),
        }
    }
}

// ── Opponent ────────────────────────────────────────────────────────

/// Plays the computer's side of an AI session.
pub struct AiOpponent {
    strategy: Box<dyn MoveStrategy>,
    delay: Duration,
}

impl AiOpponent {
    pub fn new(strategy: Box<dyn MoveStrategy>) -> Self {
        Self {
            strategy,
            delay: DEFAULT_THINKING_DELAY,
        }
    }

    pub fn with_difficulty(difficulty: Difficulty) -> Self {
        Self::new(difficulty.strategy())
    }

    /// Set the pause before each reply. Zero replies immediately.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// If the computer is to move, wait the thinking delay and play.
    ///
    /// Returns `None` when it is not the computer's turn (including after a
    /// terminal human move) or the strategy produced no legal cell.
    pub async fn respond(&mut self, session: &mut MatchSession) -> Option<LocalMove> {
        if !session.ai_to_move() {
            return None;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let symbol = session.ai_symbol()?;
        let coord = self.strategy.select(session.board(), symbol)?;
        debug!(%coord, %symbol, "ai move selected");
        session.play_ai_move(coord).ok()
    }
}

impl std::fmt::Debug for AiOpponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiOpponent")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::board::Evaluation;
    use crate::session::Phase;

    fn board_with(stones: &[(usize, usize, Symbol)]) -> Board {
        let mut board = Board::new();
        for &(r, c, s) in stones {
            board.place(Coord::new(r, c), s).unwrap();
        }
        board
    }

    #[test]
    fn random_strategy_only_picks_empty_cells() {
        let mut strategy = RandomStrategy::seeded(7);
        let mut board = Board::new();
        for _ in 0..50 {
            let c = strategy.select(&board, Symbol::White).unwrap();
            assert!(board.is_empty_at(c));
            board.place(c, Symbol::White).unwrap();
        }
    }

    #[test]
    fn random_strategy_returns_none_on_full_board() {
        let mut board = Board::new();
        let cells: Vec<Coord> = board.empty_cells().collect();
        for c in cells {
            board.place(c, Symbol::Black).unwrap();
        }
        assert_eq!(RandomStrategy::seeded(1).select(&board, Symbol::White), None);
    }

    #[test]
    fn threat_strategy_takes_the_win() {
        let board = board_with(&[
            (3, 3, Symbol::White),
            (3, 4, Symbol::White),
            (3, 5, Symbol::White),
            (3, 6, Symbol::White),
            (10, 10, Symbol::Black),
        ]);
        let c = ThreatStrategy::seeded(1).select(&board, Symbol::White).unwrap();
        assert!(c == Coord::new(3, 2) || c == Coord::new(3, 7));
    }

    #[test]
    fn threat_strategy_blocks_opponent_five() {
        let board = board_with(&[
            (5, 0, Symbol::Black),
            (6, 0, Symbol::Black),
            (7, 0, Symbol::Black),
            (8, 0, Symbol::Black),
            (12, 12, Symbol::White),
        ]);
        let c = ThreatStrategy::seeded(1).select(&board, Symbol::White).unwrap();
        assert!(c == Coord::new(4, 0) || c == Coord::new(9, 0));
    }

    #[test]
    fn threat_strategy_opens_in_centre_and_stays_close() {
        let mut strategy = ThreatStrategy::seeded(3);
        assert_eq!(strategy.select(&Board::new(), Symbol::White), Some(Coord::center()));

        let board = board_with(&[(7, 7, Symbol::Black)]);
        let c = strategy.select(&board, Symbol::White).unwrap();
        assert!(c.row.abs_diff(7) <= 1 && c.col.abs_diff(7) <= 1);
        assert_ne!(c, Coord::new(7, 7));
    }

    #[tokio::test]
    async fn opponent_replies_only_on_its_turn() {
        let mut session = MatchSession::against_ai();
        let mut ai = AiOpponent::new(Box::new(RandomStrategy::seeded(9))).with_delay(Duration::ZERO);

        assert!(ai.respond(&mut session).await.is_none());

        session.try_local_move(Coord::new(7, 7)).unwrap();
        let reply = ai.respond(&mut session).await.unwrap();
        let LocalMove::Committed { record, evaluation } = reply else {
            panic!("ai moves are committed locally");
        };
        assert_eq!(record.player, Symbol::White);
        assert_eq!(evaluation, Evaluation::Continue);
        assert_eq!(session.turn(), Symbol::Black);
        assert_eq!(session.board().stone_count(), 2);
    }

    #[tokio::test]
    async fn opponent_stays_quiet_after_human_win() {
        let mut session = MatchSession::against_ai();
        let mut ai = AiOpponent::with_difficulty(Difficulty::Medium).with_delay(Duration::ZERO);
        for c in 0..4 {
            session.try_local_move(Coord::new(0, c)).unwrap();
            session.play_ai_move(Coord::new(14, c * 2)).unwrap();
        }
        session.try_local_move(Coord::new(0, 4)).unwrap();
        assert_eq!(session.phase(), Phase::Terminal);
        assert!(ai.respond(&mut session).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn opponent_waits_the_thinking_delay() {
        let mut session = MatchSession::against_ai();
        let mut ai = AiOpponent::new(Box::new(RandomStrategy::seeded(2)));
        session.try_local_move(Coord::new(7, 7)).unwrap();

        let started = tokio::time::Instant::now();
        ai.respond(&mut session).await.unwrap();
        assert!(started.elapsed() >= DEFAULT_THINKING_DELAY);
    }
}
