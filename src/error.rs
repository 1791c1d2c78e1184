use std::time::Duration;

use crate::game::GameError;
use crate::protocol::ProtocolError;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Game(#[from] GameError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("mqtt connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
    #[error("no peer joined within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("connection to the broker was lost before the game finished")]
    ChannelClosed,
    #[error("no peer connected yet")]
    NotEstablished,
    #[error("boards diverged: peer played occupied cell ({row}, {col})")]
    BoardDiverged { row: usize, col: usize },
    #[error("standard input closed")]
    InputClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
