use std::fmt;

use crate::game::error::GameError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sign {
    X,
    O,
}

impl Sign {
    pub fn other(self) -> Self {
        match self {
            Self::X => Self::O,
            Self::O => Self::X,
        }
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => write!(f, "X"),
            Self::O => write!(f, "O"),
        }
    }
}

pub type Cell = Option<Sign>;

pub const BOARD_SIZE: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishedState {
    Win(Sign),
    Draw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameState {
    Turn(Sign),
    Finished(FinishedState),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    row: usize,
    col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Result<Self, GameError> {
        if row >= BOARD_SIZE {
            return Err(GameError::InvalidRow(row));
        }
        if col >= BOARD_SIZE {
            return Err(GameError::InvalidCol(col));
        }
        Ok(Self { row, col })
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }
}

const fn pos(row: usize, col: usize) -> Position {
    Position { row, col }
}

fn winning_combinations() -> [(Position, Position, Position); 8] {
    [
        (pos(0, 0), pos(0, 1), pos(0, 2)),
        (pos(1, 0), pos(1, 1), pos(1, 2)),
        (pos(2, 0), pos(2, 1), pos(2, 2)),
        (pos(0, 0), pos(1, 0), pos(2, 0)),
        (pos(0, 1), pos(1, 1), pos(2, 1)),
        (pos(0, 2), pos(1, 2), pos(2, 2)),
        (pos(0, 0), pos(1, 1), pos(2, 2)),
        (pos(2, 0), pos(1, 1), pos(0, 2)),
    ]
}

#[derive(Clone, Debug)]
pub struct TicTacToe {
    field: [[Cell; BOARD_SIZE]; BOARD_SIZE],
    state: GameState,
}

impl Default for TicTacToe {
    fn default() -> Self {
        Self::new()
    }
}

impl TicTacToe {
    /// X always moves first.
    pub fn new() -> Self {
        Self {
            field: [[None; BOARD_SIZE]; BOARD_SIZE],
            state: GameState::Turn(Sign::X),
        }
    }

    pub fn field(&self) -> &[[Cell; BOARD_SIZE]; BOARD_SIZE] {
        &self.field
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, GameState::Finished(_))
    }

    pub fn cell(&self, position: Position) -> Cell {
        self.field[position.row()][position.col()]
    }

    pub fn is_cell_empty(&self, position: Position) -> bool {
        self.cell(position).is_none()
    }

    /// Write `sign` into an empty cell and re-evaluate the board.
    /// Cells are written at most once, there is no way to overwrite.
    pub fn apply_move(&mut self, sign: Sign, position: Position) -> Result<GameState, GameError> {
        let current = match self.state {
            GameState::Finished(_) => return Err(GameError::GameIsFinished),
            GameState::Turn(current) => current,
        };
        if current != sign {
            return Err(GameError::not_your_turn(current, sign));
        }

        let cell = &mut self.field[position.row()][position.col()];
        if cell.is_some() {
            return Err(GameError::cell_is_occupied(position.row(), position.col()));
        }
        *cell = Some(sign);

        Ok(self.update_state())
    }

    pub fn set_finished(&mut self, finished: FinishedState) -> GameState {
        self.state = GameState::Finished(finished);
        self.state
    }

    fn update_state(&mut self) -> GameState {
        for (idx1, idx2, idx3) in winning_combinations() {
            if let (Some(s1), Some(s2), Some(s3)) =
                (self.cell(idx1), self.cell(idx2), self.cell(idx3))
            {
                if s1 == s2 && s2 == s3 {
                    return self.set_finished(FinishedState::Win(s1));
                }
            }
        }

        if self.field.iter().flatten().all(|cell| cell.is_some()) {
            return self.set_finished(FinishedState::Draw);
        }

        if let GameState::Turn(current) = self.state {
            self.state = GameState::Turn(current.other());
        }
        self.state
    }
}
