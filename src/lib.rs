//! Two-player tic-tac-toe played peer-to-peer over an MQTT topic.
//!
//! There is no central server: each process publishes to and subscribes on
//! a shared game topic, discovers its opponent through a retained
//! `game-start` message and assigns signs deterministically by comparing
//! player ids, so no negotiation round-trip is needed.

pub mod app;
pub mod channel;
pub mod config;
pub mod error;
pub mod game;
pub mod protocol;
pub mod session;
