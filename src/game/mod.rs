pub mod error;
pub mod player;
pub mod tic_tac_toe;

pub use error::GameError;
pub use player::PlayerId;
pub use tic_tac_toe::{Cell, FinishedState, GameState, Position, Sign, TicTacToe};
