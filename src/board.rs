//! The 15x15 Caro board and the shared five-in-a-row predicate.
//!
//! Every game mode (local, AI, online) funnels its win/draw decision through
//! [`evaluate`], so the three paths can never disagree about what a win is.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CaroError;
use crate::rejection::MoveRejection;

/// Side length of the board.
pub const BOARD_SIZE: usize = 15;

/// Minimum run length that wins the game.
pub const WIN_LENGTH: usize = 5;

/// Row/column steps for the four axes scanned by [`evaluate`]: horizontal,
/// vertical, and the two diagonals.
const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

// ── Symbol ──────────────────────────────────────────────────────────

/// The marker a player places. Black always moves first.
///
/// On the wire black is `"X"` and white is `"O"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    #[serde(rename = "X")]
    Black,
    #[serde(rename = "O")]
    White,
}

impl Symbol {
    /// The symbol of the other seat.
    pub fn opponent(self) -> Self {
        match self {
            Self::Black => Self::White,
            Self::White => Self::Black,
        }
    }

    /// Wire representation (`"X"` or `"O"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Black => "X",
            Self::White => "O",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contents of one board cell. `None` is empty.
pub type Cell = Option<Symbol>;

// ── Coord ───────────────────────────────────────────────────────────

/// A board coordinate. Serializes as a `[row, col]` pair to match the
/// winning-line wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Whether the coordinate lies on a 15x15 board.
    pub fn is_on_board(self) -> bool {
        self.row < BOARD_SIZE && self.col < BOARD_SIZE
    }

    /// Step by `(dr, dc)`, returning `None` when the result leaves the board.
    pub fn offset(self, dr: isize, dc: isize) -> Option<Self> {
        let row = self.row.checked_add_signed(dr)?;
        let col = self.col.checked_add_signed(dc)?;
        let next = Self { row, col };
        next.is_on_board().then_some(next)
    }

    /// The centre of the board.
    pub const fn center() -> Self {
        Self::new(BOARD_SIZE / 2, BOARD_SIZE / 2)
    }
}

impl From<(usize, usize)> for Coord {
    fn from((row, col): (usize, usize)) -> Self {
        Self { row, col }
    }
}

impl From<Coord> for (usize, usize) {
    fn from(c: Coord) -> Self {
        (c.row, c.col)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

// ── Board ───────────────────────────────────────────────────────────

/// A square 15x15 grid of cells.
///
/// Serializes as the server's `board_state` shape: a list of 15 rows, each a
/// list of 15 `"X"`, `"O"` or `null` values. An empty list deserializes to an
/// empty board, matching a match that has not recorded any moves yet.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Cell>>", into = "Vec<Vec<Cell>>")]
pub struct Board {
    cells: Vec<Cell>,
}

impl Board {
    /// Create an empty board.
    pub fn new() -> Self {
        Self {
            cells: vec![None; BOARD_SIZE * BOARD_SIZE],
        }
    }

    /// Build a board from row-major cell rows.
    ///
    /// # Errors
    ///
    /// Returns [`CaroError::InvalidBoard`] unless `rows` is empty or exactly
    /// 15 rows of 15 cells.
    pub fn from_rows(rows: &[Vec<Cell>]) -> Result<Self, CaroError> {
        if rows.is_empty() {
            return Ok(Self::new());
        }
        if rows.len() != BOARD_SIZE {
            return Err(CaroError::InvalidBoard(format!(
                "expected {BOARD_SIZE} rows, got {}",
                rows.len()
            )));
        }
        let mut cells = Vec::with_capacity(BOARD_SIZE * BOARD_SIZE);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != BOARD_SIZE {
                return Err(CaroError::InvalidBoard(format!(
                    "row {i} has {} cells, expected {BOARD_SIZE}",
                    row.len()
                )));
            }
            cells.extend_from_slice(row);
        }
        Ok(Self { cells })
    }

    /// Row-major copy of the grid.
    pub fn to_rows(&self) -> Vec<Vec<Cell>> {
        self.cells.chunks(BOARD_SIZE).map(<[Cell]>::to_vec).collect()
    }

    /// The cell at `coord`, or `None` when `coord` is off the board.
    pub fn get(&self, coord: Coord) -> Option<Cell> {
        Self::index(coord).and_then(|i| self.cells.get(i).copied())
    }

    /// Whether `coord` is on the board and empty.
    pub fn is_empty_at(&self, coord: Coord) -> bool {
        matches!(self.get(coord), Some(None))
    }

    /// Place `symbol` at `coord`.
    ///
    /// # Errors
    ///
    /// [`MoveRejection::OutOfBounds`] or [`MoveRejection::CellOccupied`]; the
    /// board is unchanged in both cases.
    pub fn place(&mut self, coord: Coord, symbol: Symbol) -> Result<(), MoveRejection> {
        let slot = Self::index(coord)
            .and_then(|i| self.cells.get_mut(i))
            .ok_or(MoveRejection::OutOfBounds)?;
        if slot.is_some() {
            return Err(MoveRejection::CellOccupied);
        }
        *slot = Some(symbol);
        Ok(())
    }

    /// Empty a cell that was written optimistically and later refused.
    pub(crate) fn clear(&mut self, coord: Coord) {
        if let Some(slot) = Self::index(coord).and_then(|i| self.cells.get_mut(i)) {
            *slot = None;
        }
    }

    /// Whether no empty cell remains.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Number of stones on the board.
    pub fn stone_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// All empty coordinates in row-major order.
    pub fn empty_cells(&self) -> impl Iterator<Item = Coord> + '_ {
        self.coords_where(|cell| cell.is_none())
    }

    /// All occupied coordinates with their symbol, in row-major order.
    pub fn stones(&self) -> impl Iterator<Item = (Coord, Symbol)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| cell.map(|s| (Self::coord_of(i), s)))
    }

    fn coords_where<'a>(
        &'a self,
        pred: impl Fn(&Cell) -> bool + 'a,
    ) -> impl Iterator<Item = Coord> + 'a {
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, cell)| pred(cell))
            .map(|(i, _)| Self::coord_of(i))
    }

    fn index(coord: Coord) -> Option<usize> {
        coord
            .is_on_board()
            .then_some(coord.row * BOARD_SIZE + coord.col)
    }

    fn coord_of(index: usize) -> Coord {
        Coord::new(index / BOARD_SIZE, index % BOARD_SIZE)
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Vec<Vec<Cell>>> for Board {
    type Error = CaroError;

    fn try_from(rows: Vec<Vec<Cell>>) -> Result<Self, Self::Error> {
        Self::from_rows(&rows)
    }
}

impl From<Board> for Vec<Vec<Cell>> {
    fn from(board: Board) -> Self {
        board.to_rows()
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(BOARD_SIZE) {
            for cell in row {
                f.write_str(cell.map_or(".", Symbol::as_str))?;
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}

// ── Evaluation ──────────────────────────────────────────────────────

/// Outcome of a single move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// The move completed a run of five or more; `line` is that run, ordered
    /// from one end to the other.
    Win { line: Vec<Coord> },
    /// The move filled the last empty cell without winning.
    Draw,
    /// Play continues.
    Continue,
}

/// Decide the result of `symbol` having just been placed at `last_move`.
///
/// Each of the four axes is scanned in both directions from the placed cell,
/// stopping at the first cell that is off the board or not `symbol`. The
/// first axis that yields five or more wins.
pub fn evaluate(board: &Board, last_move: Coord, symbol: Symbol) -> Evaluation {
    if let Some(line) = winning_run(board, last_move, symbol) {
        return Evaluation::Win { line };
    }
    if board.is_full() {
        Evaluation::Draw
    } else {
        Evaluation::Continue
    }
}

/// The first run of at least [`WIN_LENGTH`] through `at`, if any.
pub fn winning_run(board: &Board, at: Coord, symbol: Symbol) -> Option<Vec<Coord>> {
    AXES.iter().find_map(|&(dr, dc)| {
        let line = run_along(board, at, symbol, dr, dc);
        (line.len() >= WIN_LENGTH).then_some(line)
    })
}

/// The contiguous run of `symbol` through `at` along one axis, `at` included.
fn run_along(board: &Board, at: Coord, symbol: Symbol, dr: isize, dc: isize) -> Vec<Coord> {
    let holds = |c: Coord| board.get(c) == Some(Some(symbol));

    let mut start = at;
    while let Some(prev) = start.offset(-dr, -dc).filter(|&c| holds(c)) {
        start = prev;
    }

    let mut line = Vec::with_capacity(WIN_LENGTH);
    let mut cursor = Some(start);
    while let Some(c) = cursor {
        if c != at && !holds(c) {
            break;
        }
        line.push(c);
        cursor = c.offset(dr, dc);
    }
    line
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;

    fn board_with(stones: &[(usize, usize, Symbol)]) -> Board {
        let mut board = Board::new();
        for &(r, c, s) in stones {
            board.place(Coord::new(r, c), s).unwrap();
        }
        board
    }

    #[test]
    fn new_board_is_empty() {
        let board = Board::new();
        assert_eq!(board.stone_count(), 0);
        assert_eq!(board.empty_cells().count(), BOARD_SIZE * BOARD_SIZE);
        assert!(!board.is_full());
    }

    #[test]
    fn place_rejects_occupied_and_out_of_bounds() {
        let mut board = Board::new();
        board.place(Coord::new(7, 7), Symbol::Black).unwrap();
        assert_eq!(
            board.place(Coord::new(7, 7), Symbol::White),
            Err(MoveRejection::CellOccupied)
        );
        assert_eq!(
            board.place(Coord::new(15, 0), Symbol::White),
            Err(MoveRejection::OutOfBounds)
        );
        assert_eq!(board.get(Coord::new(7, 7)), Some(Some(Symbol::Black)));
        assert_eq!(board.stone_count(), 1);
    }

    #[test]
    fn horizontal_five_wins_with_ordered_line() {
        let mut board = board_with(&[
            (7, 3, Symbol::Black),
            (7, 4, Symbol::Black),
            (7, 5, Symbol::Black),
            (7, 6, Symbol::Black),
        ]);
        board.place(Coord::new(7, 7), Symbol::Black).unwrap();

        let eval = evaluate(&board, Coord::new(7, 7), Symbol::Black);
        let expected: Vec<Coord> = (3..=7).map(|c| Coord::new(7, c)).collect();
        assert_eq!(eval, Evaluation::Win { line: expected });
    }

    #[test]
    fn middle_placement_collects_both_directions() {
        let board = board_with(&[
            (2, 2, Symbol::White),
            (3, 3, Symbol::White),
            (4, 4, Symbol::White),
            (5, 5, Symbol::White),
            (6, 6, Symbol::White),
        ]);
        let eval = evaluate(&board, Coord::new(4, 4), Symbol::White);
        let Evaluation::Win { line } = eval else {
            panic!("expected a win, got {eval:?}");
        };
        assert_eq!(line.first(), Some(&Coord::new(2, 2)));
        assert_eq!(line.last(), Some(&Coord::new(6, 6)));
        assert_eq!(line.len(), 5);
    }

    #[test]
    fn anti_diagonal_and_vertical_runs_win() {
        let anti = board_with(&[
            (0, 4, Symbol::Black),
            (1, 3, Symbol::Black),
            (2, 2, Symbol::Black),
            (3, 1, Symbol::Black),
            (4, 0, Symbol::Black),
        ]);
        assert!(matches!(
            evaluate(&anti, Coord::new(4, 0), Symbol::Black),
            Evaluation::Win { .. }
        ));

        let vertical = board_with(&[
            (10, 14, Symbol::White),
            (11, 14, Symbol::White),
            (12, 14, Symbol::White),
            (13, 14, Symbol::White),
            (14, 14, Symbol::White),
        ]);
        assert!(matches!(
            evaluate(&vertical, Coord::new(14, 14), Symbol::White),
            Evaluation::Win { .. }
        ));
    }

    #[test]
    fn overline_counts_every_stone_in_the_run() {
        let board = board_with(&[
            (0, 0, Symbol::Black),
            (0, 1, Symbol::Black),
            (0, 2, Symbol::Black),
            (0, 3, Symbol::Black),
            (0, 4, Symbol::Black),
            (0, 5, Symbol::Black),
        ]);
        let Evaluation::Win { line } = evaluate(&board, Coord::new(0, 2), Symbol::Black) else {
            panic!("expected a win");
        };
        assert_eq!(line.len(), 6);
    }

    #[test]
    fn four_in_a_row_broken_by_opponent_continues() {
        let board = board_with(&[
            (7, 3, Symbol::Black),
            (7, 4, Symbol::Black),
            (7, 5, Symbol::White),
            (7, 6, Symbol::Black),
            (7, 7, Symbol::Black),
        ]);
        assert_eq!(
            evaluate(&board, Coord::new(7, 7), Symbol::Black),
            Evaluation::Continue
        );
    }

    #[test]
    fn full_board_without_five_is_a_draw() {
        // Pattern with runs of at most two in every direction.
        let mut board = Board::new();
        for r in 0..BOARD_SIZE {
            for c in 0..BOARD_SIZE {
                let black = ((c + 2 * r) / 2) % 2 == 0;
                let s = if black { Symbol::Black } else { Symbol::White };
                board.place(Coord::new(r, c), s).unwrap();
            }
        }
        assert!(board.is_full());
        for (coord, symbol) in board.stones() {
            assert!(winning_run(&board, coord, symbol).is_none(), "run at {coord}");
        }
        let last = Coord::new(14, 14);
        let symbol = board.get(last).unwrap().unwrap();
        assert_eq!(evaluate(&board, last, symbol), Evaluation::Draw);
    }

    #[test]
    fn board_json_uses_rows_of_symbols() {
        let board = board_with(&[(0, 0, Symbol::Black), (0, 1, Symbol::White)]);
        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(json[0][0], "X");
        assert_eq!(json[0][1], "O");
        assert!(json[0][2].is_null());
        assert_eq!(json.as_array().unwrap().len(), BOARD_SIZE);
    }

    #[test]
    fn empty_board_state_deserializes_to_empty_board() {
        let board: Board = serde_json::from_str("[]").unwrap();
        assert_eq!(board, Board::new());
    }

    #[test]
    fn malformed_board_state_is_rejected() {
        let err = serde_json::from_str::<Board>("[[null, \"X\"]]").unwrap_err();
        assert!(err.to_string().contains("expected 15 rows"));
    }

    #[test]
    fn coord_serializes_as_pair() {
        let json = serde_json::to_string(&Coord::new(7, 3)).unwrap();
        assert_eq!(json, "[7,3]");
        let back: Coord = serde_json::from_str("[2,9]").unwrap();
        assert_eq!(back, Coord::new(2, 9));
    }

    #[test]
    fn offset_stays_on_board() {
        assert_eq!(Coord::new(0, 0).offset(-1, 0), None);
        assert_eq!(Coord::new(14, 14).offset(0, 1), None);
        assert_eq!(Coord::new(3, 3).offset(1, -1), Some(Coord::new(4, 2)));
    }
}
