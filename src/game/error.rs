use crate::game::tic_tac_toe::Sign;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum GameError {
    #[error("invalid row (expected: 0-2, found: {0})")]
    InvalidRow(usize),
    #[error("invalid column (expected: 0-2, found: {0})")]
    InvalidCol(usize),
    #[error("cell ({row}, {col}) is occupied")]
    CellIsOccupied { row: usize, col: usize },
    #[error("can't make turn on a finished game")]
    GameIsFinished,
    #[error("other player's turn (expected: {expected}, found: {found})")]
    NotYourTurn { expected: Sign, found: Sign },
}

impl GameError {
    pub fn cell_is_occupied(row: usize, col: usize) -> Self {
        Self::CellIsOccupied { row, col }
    }

    pub fn not_your_turn(expected: Sign, found: Sign) -> Self {
        Self::NotYourTurn { expected, found }
    }
}
