//! Wire envelope shared by every peer on a game topic.
//!
//! The JSON shape is interop-critical: `{"type": "game-start"|"move",
//! "player_id": string, "row"?: int, "col"?: int, "winner"?: "X"|"O"|"T"}`.
//! `row`/`col`/`winner` appear only on moves; `winner` is omitted (or null)
//! when the move does not end the game.

use serde::{Deserialize, Serialize};

use crate::game::{FinishedState, PlayerId, Sign};

/// Topic scoping all messages of one game session.
pub fn game_topic(game_id: &str) -> String {
    format!("tic-tac-toe/games/{game_id}")
}

/// Terminal outcome carried inside a move message, folding the
/// end-of-game announcement into the move itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    X,
    O,
    #[serde(rename = "T")]
    Tie,
}

impl From<FinishedState> for Winner {
    fn from(value: FinishedState) -> Self {
        match value {
            FinishedState::Win(Sign::X) => Self::X,
            FinishedState::Win(Sign::O) => Self::O,
            FinishedState::Draw => Self::Tie,
        }
    }
}

impl From<Winner> for FinishedState {
    fn from(value: Winner) -> Self {
        match value {
            Winner::X => Self::Win(Sign::X),
            Winner::O => Self::Win(Sign::O),
            Winner::Tie => Self::Draw,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    GameStart {
        player_id: PlayerId,
    },
    Move {
        player_id: PlayerId,
        row: usize,
        col: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner: Option<Winner>,
    },
}

impl Envelope {
    pub fn player_id(&self) -> &PlayerId {
        match self {
            Self::GameStart { player_id } | Self::Move { player_id, .. } => player_id,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(buf)?)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
