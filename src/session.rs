//! Match session controller.
//!
//! [`MatchSession`] owns the board, turn marker and terminal state of one
//! match for the lifetime of one match view. Every mutation goes through it:
//!
//! - local clicks via [`MatchSession::try_local_move`]
//! - computer moves via [`MatchSession::play_ai_move`]
//! - server pushes via [`MatchSession::apply_state_sync`] and
//!   [`MatchSession::apply_remote_move`]
//!
//! # Phases
//!
//! ```text
//! Idle ──▶ AwaitingSnapshot ──▶ Active(turn) ──▶ Terminal(winner?)
//!                  └──────────────────────────────────▲
//! ```
//!
//! Local and AI sessions start directly in `Active`. `Terminal` is absorbing:
//! nothing the server sends afterwards changes the session.
//!
//! # Optimistic moves
//!
//! Online moves are written to the board immediately and queued as pending
//! [`MoveIntent`]s, each tagged with a local correlation id. The server
//! broadcasts every move to all participants, sender included, so the echo is
//! matched against the pending queue and merged instead of applied twice.
//! Remote moves set the turn to the mover's opponent rather than toggling it,
//! which keeps a duplicated broadcast from flipping the turn back.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::board::{evaluate, Board, Coord, Evaluation, Symbol};
use crate::protocol::{
    ClientMessage, GameResult, GameStatePayload, MatchMode, MatchSnapshot, MatchStatus,
    MovePayload, MoveRecord,
};
use crate::rejection::MoveRejection;

/// How long the "not your turn" notice stays visible.
pub const NOTICE_DURATION: Duration = Duration::from_secs(2);

// ── Public types ────────────────────────────────────────────────────

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, nothing requested yet.
    Idle,
    /// Waiting for the match snapshot.
    AwaitingSnapshot,
    /// Moves are accepted.
    Active,
    /// The match is over.
    Terminal,
}

/// An outbound move waiting for the server's echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveIntent {
    /// Local correlation id. Never sent on the wire.
    pub id: Uuid,
    pub coord: Coord,
    pub symbol: Symbol,
}

impl MoveIntent {
    fn new(coord: Coord, symbol: Symbol) -> Self {
        Self {
            id: Uuid::new_v4(),
            coord,
            symbol,
        }
    }

    /// The `make_move` message carrying this intent.
    pub fn to_message(&self) -> ClientMessage {
        ClientMessage::MakeMove {
            row: self.coord.row,
            col: self.coord.col,
            player: self.symbol,
        }
    }

    fn matches(&self, coord: Coord, symbol: Symbol) -> bool {
        self.coord == coord && self.symbol == symbol
    }
}

/// Result of an accepted local or AI move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalMove {
    /// Local/AI mode: the move is final and was evaluated on the spot.
    Committed {
        record: MoveRecord,
        evaluation: Evaluation,
    },
    /// Online mode: the cell was written optimistically and `intent` must be
    /// sent to the server.
    Sent(MoveIntent),
}

/// What a server push changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Board and turn were replaced wholesale.
    StateReplaced { finished: Option<GameResult> },
    /// A move was committed. `confirmed` is set when it was the echo of one of
    /// our own pending intents.
    MoveApplied {
        record: MoveRecord,
        confirmed: Option<Uuid>,
        finished: Option<GameResult>,
    },
    /// The server refused one of our optimistic moves; the cell was cleared.
    MoveRejected {
        record: MoveRecord,
        reason: Option<String>,
    },
    /// A duplicated move carried a result we had not seen yet.
    Finished(GameResult),
}

#[derive(Debug, Clone)]
struct Notice {
    text: &'static str,
    raised_at: Instant,
}

// ── MatchSession ────────────────────────────────────────────────────

/// State machine for one match.
#[derive(Debug, Clone)]
pub struct MatchSession {
    mode: MatchMode,
    phase: Phase,
    board: Board,
    turn: Symbol,
    seat: Option<Symbol>,
    result: Option<GameResult>,
    winning_line: Option<Vec<Coord>>,
    history: Vec<MoveRecord>,
    pending: VecDeque<MoveIntent>,
    notice: Option<Notice>,
    status: Option<String>,
}

impl MatchSession {
    /// Create a session for `mode`.
    ///
    /// Online sessions start `Idle` and wait for a snapshot. Local sessions
    /// start `Active` with no seat (both sides play from this device). AI
    /// sessions start `Active` with the caller seated as black.
    pub fn new(mode: MatchMode) -> Self {
        let (phase, seat) = match mode {
            MatchMode::Online => (Phase::Idle, None),
            MatchMode::Local => (Phase::Active, None),
            MatchMode::Ai => (Phase::Active, Some(Symbol::Black)),
        };
        Self {
            mode,
            phase,
            board: Board::new(),
            turn: Symbol::Black,
            seat,
            result: None,
            winning_line: None,
            history: Vec::new(),
            pending: VecDeque::new(),
            notice: None,
            status: None,
        }
    }

    /// Shorthand for [`MatchSession::new`] with [`MatchMode::Online`].
    pub fn online() -> Self {
        Self::new(MatchMode::Online)
    }

    /// Shorthand for [`MatchSession::new`] with [`MatchMode::Local`].
    pub fn local() -> Self {
        Self::new(MatchMode::Local)
    }

    /// Shorthand for [`MatchSession::new`] with [`MatchMode::Ai`].
    pub fn against_ai() -> Self {
        Self::new(MatchMode::Ai)
    }

    // ── Snapshot ────────────────────────────────────────────────────

    /// Move from `Idle` to `AwaitingSnapshot`. Returns `false` if the session
    /// was not idle.
    pub fn begin_snapshot(&mut self) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.phase = Phase::AwaitingSnapshot;
        true
    }

    /// Populate the session from a fetched snapshot.
    ///
    /// `seat` is the caller's resolved symbol, `None` for an observer. A
    /// snapshot that is already completed (or abandoned) moves the session
    /// straight to `Terminal`.
    pub fn load_snapshot(&mut self, snapshot: MatchSnapshot, seat: Option<Symbol>) {
        if !matches!(self.phase, Phase::Idle | Phase::AwaitingSnapshot) {
            warn!(phase = ?self.phase, "snapshot ignored, session already loaded");
            return;
        }
        self.seat = seat;
        self.board = snapshot.board_state;
        self.turn = snapshot.current_turn;
        self.history = snapshot.move_history;
        self.status = None;

        match snapshot.status {
            MatchStatus::Completed | MatchStatus::Abandoned => {
                self.finish(snapshot.result, snapshot.winning_line);
            }
            MatchStatus::Waiting | MatchStatus::InProgress => {
                self.phase = Phase::Active;
            }
        }
        debug!(
            match_id = snapshot.id,
            phase = ?self.phase,
            turn = %self.turn,
            seat = ?self.seat,
            "snapshot loaded"
        );
    }

    /// Record a snapshot failure. The session stays in `AwaitingSnapshot`;
    /// there is no retry.
    pub fn snapshot_failed(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "snapshot failed");
        self.status = Some(message);
    }

    // ── Local moves ─────────────────────────────────────────────────

    /// Attempt a move originating from this device.
    ///
    /// # Errors
    ///
    /// Returns the [`MoveRejection`] explaining why nothing changed. A
    /// [`MoveRejection::NotYourTurn`] also raises a short-lived notice.
    pub fn try_local_move(&mut self, coord: Coord) -> Result<LocalMove, MoveRejection> {
        self.check_playable(coord)?;

        match self.mode {
            MatchMode::Local => {
                let symbol = self.turn;
                Ok(self.commit(coord, symbol))
            }
            MatchMode::Ai => {
                let seat = self.seat.unwrap_or(Symbol::Black);
                self.check_turn(seat)?;
                Ok(self.commit(coord, seat))
            }
            MatchMode::Online => {
                let seat = self.seat.ok_or(MoveRejection::NoSeat)?;
                self.check_turn(seat)?;
                if !self.pending.is_empty() {
                    return Err(MoveRejection::AwaitingConfirmation);
                }
                self.board.place(coord, seat)?;
                let intent = MoveIntent::new(coord, seat);
                debug!(intent_id = %intent.id, %coord, symbol = %seat, "optimistic move");
                self.pending.push_back(intent.clone());
                Ok(LocalMove::Sent(intent))
            }
        }
    }

    /// Whether an AI session is waiting on the computer's move.
    pub fn ai_to_move(&self) -> bool {
        self.mode == MatchMode::Ai
            && self.phase == Phase::Active
            && self.ai_symbol() == Some(self.turn)
    }

    /// The computer's symbol in an AI session.
    pub fn ai_symbol(&self) -> Option<Symbol> {
        match self.mode {
            MatchMode::Ai => self.seat.map(Symbol::opponent),
            MatchMode::Local | MatchMode::Online => None,
        }
    }

    /// Apply the computer's move in an AI session.
    ///
    /// # Errors
    ///
    /// Rejects when this is not an AI session, it is not the computer's turn,
    /// or the cell is not playable.
    pub fn play_ai_move(&mut self, coord: Coord) -> Result<LocalMove, MoveRejection> {
        self.check_playable(coord)?;
        let symbol = self.ai_symbol().ok_or(MoveRejection::NoSeat)?;
        if symbol != self.turn {
            return Err(MoveRejection::NotYourTurn);
        }
        Ok(self.commit(coord, symbol))
    }

    // ── Server pushes ───────────────────────────────────────────────

    /// Replace board and turn with the server's state.
    ///
    /// Pending optimistic moves are dropped: the pushed state supersedes them.
    pub fn apply_state_sync(&mut self, state: GameStatePayload) -> Option<SessionUpdate> {
        if self.phase != Phase::Active {
            debug!(phase = ?self.phase, "state sync ignored");
            return None;
        }
        self.board = state.board;
        self.turn = state.current_turn;
        self.pending.clear();

        let finished = match (state.status, state.result) {
            (Some(MatchStatus::Completed | MatchStatus::Abandoned), result)
            | (_, result @ Some(_)) => {
                self.finish(result, None);
                result
            }
            _ => None,
        };
        debug!(turn = %self.turn, ?finished, "state replaced");
        Some(SessionUpdate::StateReplaced { finished })
    }

    /// Apply a move broadcast by the server.
    ///
    /// Idempotent with respect to duplicated broadcasts and to the echo of
    /// our own optimistic moves.
    pub fn apply_remote_move(&mut self, mv: MovePayload) -> Option<SessionUpdate> {
        if self.phase != Phase::Active {
            debug!(phase = ?self.phase, row = mv.row, col = mv.col, "remote move ignored");
            return None;
        }
        let coord = mv.coord();
        if !coord.is_on_board() {
            warn!(%coord, "remote move outside the board, dropping");
            return None;
        }
        let record = MoveRecord::new(coord, mv.player);

        if mv.is_rejected() {
            let reason = mv.result.and_then(|r| r.message);
            return self.roll_back(record, reason);
        }

        let confirmed = self.take_pending(coord, mv.player);
        match self.board.get(coord) {
            Some(None) => {
                // Out-of-bounds was handled above and the cell is empty.
                let _ = self.board.place(coord, mv.player);
            }
            Some(Some(existing)) if existing == mv.player => {
                if confirmed.is_none() {
                    debug!(%coord, "duplicate move broadcast");
                    let result = mv.result.as_ref().and_then(|r| r.game_over())?;
                    self.finish(Some(result), mv.result.and_then(|r| r.winning_line));
                    return Some(SessionUpdate::Finished(result));
                }
            }
            Some(Some(existing)) => {
                warn!(%coord, %existing, incoming = %mv.player, "conflicting remote move, dropping");
                return None;
            }
            None => return None,
        }

        self.history.push(record);
        self.turn = mv.player.opponent();

        let finished = mv.result.as_ref().and_then(|r| r.game_over());
        if let Some(result) = finished {
            self.finish(Some(result), mv.result.and_then(|r| r.winning_line));
        }
        debug!(%coord, symbol = %mv.player, ?confirmed, ?finished, "remote move applied");
        Some(SessionUpdate::MoveApplied {
            record,
            confirmed,
            finished,
        })
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// The symbol whose move is accepted next.
    pub fn turn(&self) -> Symbol {
        self.turn
    }

    /// The caller's symbol; `None` for observers and local sessions.
    pub fn seat(&self) -> Option<Symbol> {
        self.seat
    }

    pub fn is_over(&self) -> bool {
        self.phase == Phase::Terminal
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    /// The winning symbol, `None` while playing or after a draw.
    pub fn winner(&self) -> Option<Symbol> {
        self.result.and_then(GameResult::winner)
    }

    pub fn winning_line(&self) -> Option<&[Coord]> {
        self.winning_line.as_deref()
    }

    /// Committed moves in order.
    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    /// Optimistic moves still waiting for their echo.
    pub fn pending_moves(&self) -> impl Iterator<Item = &MoveIntent> {
        self.pending.iter()
    }

    /// Whether the caller may click right now.
    pub fn is_my_turn(&self) -> bool {
        if self.phase != Phase::Active {
            return false;
        }
        match self.mode {
            MatchMode::Local => true,
            MatchMode::Ai => self.seat == Some(self.turn),
            MatchMode::Online => self.seat == Some(self.turn) && self.pending.is_empty(),
        }
    }

    /// The transient notice, if it has not expired yet.
    pub fn notice(&self) -> Option<&'static str> {
        self.notice_at(Instant::now())
    }

    /// The transient notice as seen at `now`.
    pub fn notice_at(&self, now: Instant) -> Option<&'static str> {
        self.notice
            .as_ref()
            .filter(|n| now.saturating_duration_since(n.raised_at) < NOTICE_DURATION)
            .map(|n| n.text)
    }

    /// Last error or status message, e.g. a failed snapshot or lost stream.
    pub fn status_message(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub(crate) fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    /// Undo an optimistic move that never reached the server.
    pub(crate) fn withdraw_intent(&mut self, id: Uuid) {
        let Some(pos) = self.pending.iter().position(|p| p.id == id) else {
            return;
        };
        if let Some(intent) = self.pending.remove(pos) {
            self.board.clear(intent.coord);
            debug!(intent_id = %id, coord = %intent.coord, "optimistic move withdrawn");
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn check_playable(&self, coord: Coord) -> Result<(), MoveRejection> {
        match self.phase {
            Phase::Active => {}
            Phase::Terminal => return Err(MoveRejection::GameOver),
            Phase::Idle | Phase::AwaitingSnapshot => return Err(MoveRejection::NotActive),
        }
        match self.board.get(coord) {
            None => Err(MoveRejection::OutOfBounds),
            Some(Some(_)) => Err(MoveRejection::CellOccupied),
            Some(None) => Ok(()),
        }
    }

    fn check_turn(&mut self, seat: Symbol) -> Result<(), MoveRejection> {
        if seat == self.turn {
            return Ok(());
        }
        let rejection = MoveRejection::NotYourTurn;
        self.notice = Some(Notice {
            text: rejection.description(),
            raised_at: Instant::now(),
        });
        Err(rejection)
    }

    /// Write, evaluate and advance. Caller has checked the cell is playable.
    fn commit(&mut self, coord: Coord, symbol: Symbol) -> LocalMove {
        let _ = self.board.place(coord, symbol);
        let record = MoveRecord::new(coord, symbol);
        self.history.push(record);

        let evaluation = evaluate(&self.board, coord, symbol);
        match &evaluation {
            Evaluation::Win { line } => {
                self.finish(Some(GameResult::win_for(symbol)), Some(line.clone()));
            }
            Evaluation::Draw => self.finish(Some(GameResult::Draw), None),
            Evaluation::Continue => self.turn = symbol.opponent(),
        }
        LocalMove::Committed { record, evaluation }
    }

    fn take_pending(&mut self, coord: Coord, symbol: Symbol) -> Option<Uuid> {
        let pos = self.pending.iter().position(|p| p.matches(coord, symbol))?;
        self.pending.remove(pos).map(|p| p.id)
    }

    fn roll_back(&mut self, record: MoveRecord, reason: Option<String>) -> Option<SessionUpdate> {
        let coord = record.coord();
        let Some(intent_id) = self.take_pending(coord, record.player) else {
            debug!(%coord, "server rejected a move that was not ours");
            return None;
        };
        self.board.clear(coord);
        warn!(%intent_id, %coord, ?reason, "server rejected optimistic move");
        self.status = Some(format!(
            "Move rejected: {}",
            reason.as_deref().unwrap_or("unknown reason")
        ));
        Some(SessionUpdate::MoveRejected { record, reason })
    }

    fn finish(&mut self, result: Option<GameResult>, winning_line: Option<Vec<Coord>>) {
        self.phase = Phase::Terminal;
        self.result = result;
        self.winning_line = match result {
            Some(GameResult::BlackWin | GameResult::WhiteWin) => winning_line,
            _ => None,
        };
        self.pending.clear();
        debug!(?result, "match finished");
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
    use crate::board::BOARD_SIZE;
    use crate::protocol::{MoveResult, MoveStatus, UserId};

    fn snapshot(status: MatchStatus) -> MatchSnapshot {
        MatchSnapshot {
            id: 1,
            mode: MatchMode::Online,
            status,
            result: None,
            black_player: Some(UserId::from(10)),
            white_player: Some(UserId::from(20)),
            board_state: Board::new(),
            move_history: Vec::new(),
            current_turn: Symbol::Black,
            winning_line: None,
        }
    }

    fn online_as(seat: Symbol) -> MatchSession {
        let mut session = MatchSession::online();
        assert!(session.begin_snapshot());
        session.load_snapshot(snapshot(MatchStatus::InProgress), Some(seat));
        session
    }

    fn remote(row: usize, col: usize, player: Symbol) -> MovePayload {
        MovePayload {
            row,
            col,
            player,
            result: Some(MoveResult {
                status: MoveStatus::Success,
                result: None,
                winning_line: None,
                message: None,
            }),
        }
    }

    #[test]
    fn local_turn_alternates_by_parity() {
        let mut session = MatchSession::local();
        let cells = [(0, 0), (5, 5), (0, 2), (9, 1), (14, 3), (3, 12)];
        for (n, &(r, c)) in cells.iter().enumerate() {
            let expected = if n % 2 == 0 { Symbol::Black } else { Symbol::White };
            assert_eq!(session.turn(), expected, "before move {n}");
            session.try_local_move(Coord::new(r, c)).unwrap();
        }
        assert_eq!(session.turn(), Symbol::Black);
        assert_eq!(session.history().len(), cells.len());
    }

    #[test]
    fn first_move_flips_turn_and_touches_one_cell() {
        let mut session = MatchSession::local();
        session.try_local_move(Coord::new(7, 7)).unwrap();
        assert_eq!(session.turn(), Symbol::White);
        assert_eq!(session.board().stone_count(), 1);
        assert_eq!(
            session.board().get(Coord::new(7, 7)),
            Some(Some(Symbol::Black))
        );
    }

    #[test]
    fn occupied_cell_is_rejected_without_change() {
        let mut session = MatchSession::local();
        session.try_local_move(Coord::new(7, 7)).unwrap();
        let before = session.board().clone();
        assert_eq!(
            session.try_local_move(Coord::new(7, 7)),
            Err(MoveRejection::CellOccupied)
        );
        assert_eq!(session.board(), &before);
        assert_eq!(session.turn(), Symbol::White);
    }

    #[test]
    fn local_five_in_a_row_wins() {
        let mut session = MatchSession::local();
        for c in 3..7 {
            session.try_local_move(Coord::new(7, c)).unwrap();
            session.try_local_move(Coord::new(0, c * 2)).unwrap();
        }
        let mv = session.try_local_move(Coord::new(7, 7)).unwrap();
        assert!(matches!(
            mv,
            LocalMove::Committed {
                evaluation: Evaluation::Win { .. },
                ..
            }
        ));
        assert_eq!(session.phase(), Phase::Terminal);
        assert_eq!(session.winner(), Some(Symbol::Black));
        let expected: Vec<Coord> = (3..=7).map(|c| Coord::new(7, c)).collect();
        assert_eq!(session.winning_line(), Some(expected.as_slice()));
        assert_eq!(
            session.try_local_move(Coord::new(10, 10)),
            Err(MoveRejection::GameOver)
        );
    }

    #[test]
    fn online_wrong_turn_raises_notice_that_expires() {
        let mut session = online_as(Symbol::White);
        let before = session.board().clone();
        assert_eq!(
            session.try_local_move(Coord::new(7, 7)),
            Err(MoveRejection::NotYourTurn)
        );
        assert_eq!(session.board(), &before);
        assert_eq!(session.notice(), Some("Not your turn!"));
        let later = Instant::now() + NOTICE_DURATION + Duration::from_millis(10);
        assert_eq!(session.notice_at(later), None);
    }

    #[test]
    fn online_move_is_optimistic_and_echo_is_merged() {
        let mut session = online_as(Symbol::Black);
        let LocalMove::Sent(intent) = session.try_local_move(Coord::new(7, 7)).unwrap() else {
            panic!("online move should produce an intent");
        };
        assert_eq!(
            session.board().get(Coord::new(7, 7)),
            Some(Some(Symbol::Black))
        );
        // Turn comes from the server, and a second click waits for the echo.
        assert_eq!(session.turn(), Symbol::Black);
        assert_eq!(
            session.try_local_move(Coord::new(7, 8)),
            Err(MoveRejection::AwaitingConfirmation)
        );

        let update = session.apply_remote_move(remote(7, 7, Symbol::Black)).unwrap();
        assert_eq!(
            update,
            SessionUpdate::MoveApplied {
                record: MoveRecord::new(Coord::new(7, 7), Symbol::Black),
                confirmed: Some(intent.id),
                finished: None,
            }
        );
        assert_eq!(session.turn(), Symbol::White);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.pending_moves().count(), 0);

        // A duplicated broadcast changes nothing.
        assert_eq!(session.apply_remote_move(remote(7, 7, Symbol::Black)), None);
        assert_eq!(session.turn(), Symbol::White);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn remote_game_over_sets_winner_and_line() {
        let mut session = online_as(Symbol::White);
        let line = vec![
            Coord::new(2, 2),
            Coord::new(2, 3),
            Coord::new(2, 4),
            Coord::new(2, 5),
            Coord::new(2, 6),
        ];
        let payload = MovePayload {
            row: 2,
            col: 2,
            player: Symbol::Black,
            result: Some(MoveResult {
                status: MoveStatus::GameOver,
                result: Some(GameResult::BlackWin),
                winning_line: Some(line.clone()),
                message: None,
            }),
        };
        let update = session.apply_remote_move(payload).unwrap();
        assert!(matches!(
            update,
            SessionUpdate::MoveApplied {
                finished: Some(GameResult::BlackWin),
                ..
            }
        ));
        assert_eq!(
            session.board().get(Coord::new(2, 2)),
            Some(Some(Symbol::Black))
        );
        assert_eq!(session.phase(), Phase::Terminal);
        assert_eq!(session.winner(), Some(Symbol::Black));
        assert_eq!(session.winning_line(), Some(line.as_slice()));

        // Terminal is absorbing.
        assert_eq!(session.apply_remote_move(remote(3, 3, Symbol::White)), None);
        assert!(session.board().is_empty_at(Coord::new(3, 3)));
    }

    #[test]
    fn server_rejection_rolls_back_optimistic_cell() {
        let mut session = online_as(Symbol::Black);
        session.try_local_move(Coord::new(4, 4)).unwrap();
        let payload = MovePayload {
            row: 4,
            col: 4,
            player: Symbol::Black,
            result: Some(MoveResult {
                status: MoveStatus::Error,
                result: None,
                winning_line: None,
                message: Some("Cell already occupied".into()),
            }),
        };
        let update = session.apply_remote_move(payload).unwrap();
        assert!(matches!(update, SessionUpdate::MoveRejected { .. }));
        assert!(session.board().is_empty_at(Coord::new(4, 4)));
        assert_eq!(session.turn(), Symbol::Black);
        assert!(session.is_my_turn());
        assert!(session.status_message().unwrap().contains("occupied"));
    }

    #[test]
    fn conflicting_remote_move_is_dropped() {
        let mut session = online_as(Symbol::White);
        session.apply_remote_move(remote(1, 1, Symbol::Black)).unwrap();
        assert_eq!(session.apply_remote_move(remote(1, 1, Symbol::White)), None);
        assert_eq!(
            session.board().get(Coord::new(1, 1)),
            Some(Some(Symbol::Black))
        );
    }

    #[test]
    fn state_sync_replaces_board_and_clears_pending() {
        let mut session = online_as(Symbol::Black);
        session.try_local_move(Coord::new(0, 0)).unwrap();

        let mut board = Board::new();
        board.place(Coord::new(9, 9), Symbol::Black).unwrap();
        let update = session
            .apply_state_sync(GameStatePayload {
                board: board.clone(),
                current_turn: Symbol::White,
                status: Some(MatchStatus::InProgress),
                result: None,
            })
            .unwrap();
        assert_eq!(update, SessionUpdate::StateReplaced { finished: None });
        assert_eq!(session.board(), &board);
        assert_eq!(session.turn(), Symbol::White);
        assert_eq!(session.pending_moves().count(), 0);
    }

    #[test]
    fn abandoned_state_sync_ends_the_match() {
        let mut session = online_as(Symbol::Black);
        let update = session
            .apply_state_sync(GameStatePayload {
                board: Board::new(),
                current_turn: Symbol::Black,
                status: Some(MatchStatus::Abandoned),
                result: None,
            })
            .unwrap();
        assert_eq!(update, SessionUpdate::StateReplaced { finished: None });
        assert_eq!(session.phase(), Phase::Terminal);
        assert_eq!(session.result(), None);
        assert_eq!(
            session.try_local_move(Coord::new(7, 7)),
            Err(MoveRejection::GameOver)
        );
    }

    /// Every cell, in an order that alternates black and white starting with
    /// black, such that the full board holds no run of five. Black owns
    /// 113 cells and white 112, so black also plays the last cell.
    fn drawn_game_order() -> Vec<Coord> {
        let cells = (0..BOARD_SIZE).flat_map(|r| (0..BOARD_SIZE).map(move |c| Coord::new(r, c)));
        let (black, white): (Vec<Coord>, Vec<Coord>) =
            cells.partition(|cell| (cell.col + 2 * cell.row) % 4 < 2);
        assert_eq!((black.len(), white.len()), (113, 112));

        let mut order = Vec::with_capacity(BOARD_SIZE * BOARD_SIZE);
        for (n, &b) in black.iter().enumerate() {
            order.push(b);
            if let Some(&w) = white.get(n) {
                order.push(w);
            }
        }
        order
    }

    #[test]
    fn filling_the_last_cell_locally_is_a_draw() {
        let order = drawn_game_order();
        let (last, rest) = order.split_last().unwrap();
        let mut session = MatchSession::local();
        for &coord in rest {
            session.try_local_move(coord).unwrap();
        }
        assert_eq!(session.phase(), Phase::Active);
        assert_eq!(session.turn(), Symbol::Black);

        let mv = session.try_local_move(*last).unwrap();
        assert!(matches!(
            mv,
            LocalMove::Committed {
                evaluation: Evaluation::Draw,
                ..
            }
        ));
        assert!(session.board().is_full());
        assert_eq!(session.phase(), Phase::Terminal);
        assert_eq!(session.result(), Some(GameResult::Draw));
        assert_eq!(session.winner(), None);
        assert_eq!(session.winning_line(), None);
    }

    #[test]
    fn server_draw_on_the_last_cell_ends_the_match() {
        let order = drawn_game_order();
        let (last, rest) = order.split_last().unwrap();
        let mut snap = snapshot(MatchStatus::InProgress);
        for (n, &coord) in rest.iter().enumerate() {
            let symbol = if n % 2 == 0 { Symbol::Black } else { Symbol::White };
            snap.board_state.place(coord, symbol).unwrap();
        }
        snap.current_turn = Symbol::Black;

        let mut session = MatchSession::online();
        session.begin_snapshot();
        session.load_snapshot(snap, Some(Symbol::Black));
        let LocalMove::Sent(intent) = session.try_local_move(*last).unwrap() else {
            panic!("expected an optimistic intent");
        };

        let mut echo = remote(last.row, last.col, Symbol::Black);
        echo.result = Some(MoveResult {
            status: MoveStatus::GameOver,
            result: Some(GameResult::Draw),
            winning_line: None,
            message: None,
        });
        let update = session.apply_remote_move(echo).unwrap();
        assert_eq!(
            update,
            SessionUpdate::MoveApplied {
                record: MoveRecord::new(*last, Symbol::Black),
                confirmed: Some(intent.id),
                finished: Some(GameResult::Draw),
            }
        );
        assert_eq!(session.phase(), Phase::Terminal);
        assert_eq!(session.result(), Some(GameResult::Draw));
        assert_eq!(session.winner(), None);
        assert_eq!(session.winning_line(), None);
        assert!(session.board().is_full());
    }

    #[test]
    fn completed_snapshot_is_terminal_immediately() {
        let mut session = MatchSession::online();
        session.begin_snapshot();
        let mut snap = snapshot(MatchStatus::Completed);
        snap.result = Some(GameResult::WhiteWin);
        snap.winning_line = Some(vec![Coord::new(0, 0)]);
        session.load_snapshot(snap, Some(Symbol::Black));
        assert_eq!(session.phase(), Phase::Terminal);
        assert_eq!(session.winner(), Some(Symbol::White));
        assert!(session.winning_line().is_some());
    }

    #[test]
    fn observer_cannot_move() {
        let mut session = MatchSession::online();
        session.begin_snapshot();
        session.load_snapshot(snapshot(MatchStatus::InProgress), None);
        assert_eq!(
            session.try_local_move(Coord::new(7, 7)),
            Err(MoveRejection::NoSeat)
        );
    }

    #[test]
    fn moves_before_snapshot_are_rejected() {
        let mut session = MatchSession::online();
        assert_eq!(
            session.try_local_move(Coord::new(7, 7)),
            Err(MoveRejection::NotActive)
        );
        session.begin_snapshot();
        assert!(!session.begin_snapshot());
        assert_eq!(
            session.try_local_move(Coord::new(7, 7)),
            Err(MoveRejection::NotActive)
        );
    }

    #[test]
    fn ai_session_alternates_human_and_computer() {
        let mut session = MatchSession::against_ai();
        assert!(!session.ai_to_move());
        session.try_local_move(Coord::new(7, 7)).unwrap();
        assert!(session.ai_to_move());
        assert_eq!(
            session.try_local_move(Coord::new(7, 8)),
            Err(MoveRejection::NotYourTurn)
        );
        session.play_ai_move(Coord::new(8, 8)).unwrap();
        assert!(!session.ai_to_move());
        assert_eq!(session.turn(), Symbol::Black);
        assert_eq!(
            session.play_ai_move(Coord::new(9, 9)),
            Err(MoveRejection::NotYourTurn)
        );
    }
}
