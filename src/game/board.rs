//! Board and Outcome Evaluation
//!
//! The 3x3 board, player marks, and the pure win/draw evaluator.
//! Nothing in here owns state beyond the board value itself.

use std::fmt;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// Number of cells on the board.
pub const BOARD_CELLS: usize = 9;

/// The 8 winning lines, in evaluation order: rows, columns, diagonals.
pub const WIN_LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

// =============================================================================
// MARK
// =============================================================================

/// A player's mark. `X` always moves first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// First player to join.
    X,
    /// Second player to join.
    O,
}

impl Mark {
    /// The opposing mark.
    #[inline]
    pub fn other(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Mark::X => "X",
            Mark::O => "O",
        }
    }

    /// Parse a cell string: `""` is empty, `"X"`/`"O"` are marks.
    pub fn parse_cell(s: &str) -> Result<Option<Mark>, String> {
        match s {
            "" => Ok(None),
            "X" => Ok(Some(Mark::X)),
            "O" => Ok(Some(Mark::O)),
            other => Err(format!("invalid cell value {other:?}")),
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// The 3x3 board, indexed row-major from 0 (top-left) to 8 (bottom-right).
///
/// Serializes as a 9-element array of `"X"`, `"O"` or `""`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Board([Option<Mark>; BOARD_CELLS]);

impl Board {
    /// An empty board.
    pub const fn new() -> Self {
        Self([None; BOARD_CELLS])
    }

    /// Build a board from raw cells.
    pub const fn from_cells(cells: [Option<Mark>; BOARD_CELLS]) -> Self {
        Self(cells)
    }

    /// Raw cells.
    pub fn cells(&self) -> &[Option<Mark>; BOARD_CELLS] {
        &self.0
    }

    /// Mark at `position`, `None` when empty or out of range.
    pub fn get(&self, position: usize) -> Option<Mark> {
        self.0.get(position).copied().flatten()
    }

    /// Whether `position` is on the board and unoccupied.
    pub fn is_empty_at(&self, position: usize) -> bool {
        matches!(self.0.get(position), Some(None))
    }

    /// Whether every cell holds a mark.
    pub fn is_full(&self) -> bool {
        self.0.iter().all(Option::is_some)
    }

    /// Place `mark` at `position`.
    ///
    /// Returns `false` (leaving the board untouched) if the position is out of
    /// range or already taken. Occupied cells are never overwritten.
    pub fn place(&mut self, position: usize, mark: Mark) -> bool {
        if !self.is_empty_at(position) {
            return false;
        }
        self.0[position] = Some(mark);
        true
    }

    /// Same board with X and O swapped.
    pub fn relabeled(&self) -> Board {
        let mut cells = self.0;
        for cell in cells.iter_mut() {
            *cell = cell.map(Mark::other);
        }
        Board(cells)
    }
}

impl Serialize for Board {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(BOARD_CELLS))?;
        for cell in &self.0 {
            seq.serialize_element(cell.map(Mark::as_str).unwrap_or(""))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Board {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BoardVisitor;

        impl<'de> Visitor<'de> for BoardVisitor {
            type Value = Board;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "an array of {BOARD_CELLS} cell strings")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Board, A::Error> {
                let mut cells = [None; BOARD_CELLS];
                for (i, cell) in cells.iter_mut().enumerate() {
                    let raw: String = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                    *cell = Mark::parse_cell(&raw).map_err(de::Error::custom)?;
                }
                if seq.next_element::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(BOARD_CELLS + 1, &self));
                }
                Ok(Board(cells))
            }
        }

        deserializer.deserialize_seq(BoardVisitor)
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Terminal result of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// A mark completed a line (or won by forfeit).
    Win(Mark),
    /// Board filled with no completed line.
    Draw,
}

/// Evaluate the board: `(winner, is_draw)`.
///
/// The first completed line in [`WIN_LINES`] order decides the winner. With no
/// winner, a full board is a draw. `(None, false)` means play continues.
pub fn check_outcome(board: &Board) -> (Option<Mark>, bool) {
    let cells = board.cells();
    for [a, b, c] in WIN_LINES {
        if let Some(mark) = cells[a] {
            if cells[b] == Some(mark) && cells[c] == Some(mark) {
                return (Some(mark), false);
            }
        }
    }

    (None, board.is_full())
}

/// [`check_outcome`] folded into an optional [`Outcome`].
pub fn evaluate(board: &Board) -> Option<Outcome> {
    match check_outcome(board) {
        (Some(mark), _) => Some(Outcome::Win(mark)),
        (None, true) => Some(Outcome::Draw),
        (None, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn board_from(s: &str) -> Board {
        // Row-major, '.' = empty
        let mut cells = [None; BOARD_CELLS];
        for (i, ch) in s.chars().filter(|c| !c.is_whitespace()).enumerate() {
            cells[i] = match ch {
                'X' => Some(Mark::X),
                'O' => Some(Mark::O),
                _ => None,
            };
        }
        Board::from_cells(cells)
    }

    #[test]
    fn test_empty_board_undetermined() {
        assert_eq!(check_outcome(&Board::new()), (None, false));
        assert_eq!(evaluate(&Board::new()), None);
    }

    #[test]
    fn test_every_line_wins() {
        for line in WIN_LINES {
            let mut board = Board::new();
            for pos in line {
                board.place(pos, Mark::O);
            }
            assert_eq!(check_outcome(&board), (Some(Mark::O), false), "line {:?}", line);
        }
    }

    #[test]
    fn test_top_row_win() {
        let board = board_from("XXX OO. ...");
        assert_eq!(check_outcome(&board), (Some(Mark::X), false));
    }

    #[test]
    fn test_full_board_draw() {
        let board = board_from("XOX XOO OXX");
        assert_eq!(check_outcome(&board), (None, true));
        assert_eq!(evaluate(&board), Some(Outcome::Draw));
    }

    #[test]
    fn test_win_on_full_board_is_not_draw() {
        let board = board_from("XXX OOX OXO");
        assert_eq!(check_outcome(&board), (Some(Mark::X), false));
    }

    #[test]
    fn test_malformed_board_first_line_wins() {
        // Both marks complete a row; evaluation order picks the first row.
        let board = board_from("OOO XXX ...");
        assert_eq!(check_outcome(&board), (Some(Mark::O), false));
    }

    #[test]
    fn test_place_rejects_occupied_and_out_of_range() {
        let mut board = Board::new();
        assert!(board.place(4, Mark::X));
        assert!(!board.place(4, Mark::O));
        assert_eq!(board.get(4), Some(Mark::X));
        assert!(!board.place(9, Mark::O));
        assert!(!board.is_empty_at(9));
    }

    #[test]
    fn test_board_wire_format() {
        let board = board_from("X.. .O. ...");
        let json = serde_json::to_string(&board).unwrap();
        assert_eq!(json, r#"["X","","","","O","","","",""]"#);

        let parsed: Board = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, board);
    }

    #[test]
    fn test_board_rejects_wrong_length_and_values() {
        assert!(serde_json::from_str::<Board>(r#"["","",""]"#).is_err());
        assert!(serde_json::from_str::<Board>(r#"["","","","","","","","","",""]"#).is_err());
        assert!(serde_json::from_str::<Board>(r#"["Z","","","","","","","",""]"#).is_err());
    }

    fn arb_board() -> impl Strategy<Value = Board> {
        let cell = prop_oneof![Just(None), Just(Some(Mark::X)), Just(Some(Mark::O))];
        prop::array::uniform9(cell).prop_map(Board::from_cells)
    }

    proptest! {
        #[test]
        fn prop_relabel_symmetry(board in arb_board()) {
            let (winner, draw) = check_outcome(&board);
            let (swapped_winner, swapped_draw) = check_outcome(&board.relabeled());
            prop_assert_eq!(swapped_winner, winner.map(Mark::other));
            prop_assert_eq!(swapped_draw, draw);
        }

        #[test]
        fn prop_single_classification(board in arb_board()) {
            let (winner, draw) = check_outcome(&board);
            // Never both a winner and a draw.
            prop_assert!(!(winner.is_some() && draw));

            let line_complete = WIN_LINES.iter().any(|[a, b, c]| {
                let cells = board.cells();
                cells[*a].is_some() && cells[*a] == cells[*b] && cells[*b] == cells[*c]
            });
            let undetermined = winner.is_none() && !draw;
            prop_assert_eq!(undetermined, !board.is_full() && !line_complete);
        }
    }
}
