//! Peer-to-peer session state: handshake, role assignment and the inbound
//! message dispatcher.
//!
//! Both execution contexts that mutate the game, the control loop applying
//! local moves and the dispatcher applying remote ones, go through the same
//! mutex, which together with strict turn alternation keeps the two peers'
//! boards consistent. Turn flips wake waiters through a [`Notify`].

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, MutexGuard, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::game::{FinishedState, GameState, PlayerId, Position, Sign, TicTacToe};
use crate::protocol::{Envelope, Winner};

#[derive(Debug)]
pub struct GameSession {
    local_id: PlayerId,
    remote_id: Option<PlayerId>,
    local_sign: Option<Sign>,
    game: TicTacToe,
    active: bool,
}

impl GameSession {
    pub fn new(local_id: PlayerId) -> Self {
        Self {
            local_id,
            remote_id: None,
            local_sign: None,
            game: TicTacToe::new(),
            active: true,
        }
    }

    pub fn local_id(&self) -> &PlayerId {
        &self.local_id
    }

    pub fn remote_id(&self) -> Option<&PlayerId> {
        self.remote_id.as_ref()
    }

    pub fn local_sign(&self) -> Option<Sign> {
        self.local_sign
    }

    pub fn game(&self) -> &TicTacToe {
        &self.game
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The session exists only once the remote peer's id is known.
    pub fn is_established(&self) -> bool {
        self.remote_id.is_some()
    }

    pub fn is_local_turn(&self) -> bool {
        match (self.local_sign, self.game.state()) {
            (Some(sign), GameState::Turn(turn)) => sign == turn,
            _ => false,
        }
    }

    pub fn outcome(&self) -> Option<FinishedState> {
        match self.game.state() {
            GameState::Finished(finished) => Some(finished),
            GameState::Turn(_) => None,
        }
    }

    /// Apply a move for the local player and build the message announcing
    /// it, with the freshly computed outcome folded in. Nothing is mutated
    /// and nothing is returned for publishing when the move is illegal.
    pub fn apply_local_move(&mut self, position: Position) -> Result<Envelope, SessionError> {
        let Some(sign) = self.local_sign else {
            return Err(SessionError::NotEstablished);
        };
        let state = self.game.apply_move(sign, position)?;
        let winner = match state {
            GameState::Finished(finished) => {
                self.active = false;
                Some(Winner::from(finished))
            }
            GameState::Turn(_) => None,
        };
        Ok(Envelope::Move {
            player_id: self.local_id.clone(),
            row: position.row(),
            col: position.col(),
            winner,
        })
    }

    /// Dispatch one inbound message. Own messages are discarded (the bus
    /// echoes every publish back to the sender), the first foreign
    /// `game-start` fixes the remote peer, and remote moves are applied
    /// only while it is actually the remote player's turn, which also
    /// makes redelivered duplicates harmless.
    pub fn handle_message(&mut self, msg: Envelope) -> Result<(), SessionError> {
        if msg.player_id() == &self.local_id {
            return Ok(());
        }
        match msg {
            Envelope::GameStart { player_id } => {
                self.register_peer(player_id);
                Ok(())
            }
            Envelope::Move {
                player_id,
                row,
                col,
                winner,
            } => self.handle_remote_move(player_id, row, col, winner),
        }
    }

    fn register_peer(&mut self, player_id: PlayerId) {
        if let Some(remote) = &self.remote_id {
            tracing::debug!(%player_id, %remote, "already paired, ignoring game-start");
            return;
        }
        let sign = self.local_id.assign_sign(&player_id);
        tracing::info!(peer = %player_id, local_sign = %sign, "peer joined");
        self.remote_id = Some(player_id);
        self.local_sign = Some(sign);
    }

    fn handle_remote_move(
        &mut self,
        player_id: PlayerId,
        row: usize,
        col: usize,
        winner: Option<Winner>,
    ) -> Result<(), SessionError> {
        let (Some(remote), Some(local_sign)) = (&self.remote_id, self.local_sign) else {
            tracing::warn!(%player_id, "move received before handshake, ignoring");
            return Ok(());
        };
        if remote != &player_id {
            tracing::debug!(%player_id, "ignoring move from a player outside the session");
            return Ok(());
        }
        if !self.active {
            tracing::debug!("ignoring move on a finished session");
            return Ok(());
        }
        let remote_sign = local_sign.other();
        if self.game.state() != GameState::Turn(remote_sign) {
            tracing::debug!(row, col, "out-of-turn move, ignoring");
            return Ok(());
        }

        let position = Position::new(row, col)?;
        if !self.game.is_cell_empty(position) {
            // the sender's legality is otherwise trusted, so this means the
            // two boards no longer agree and the session cannot continue
            tracing::error!(row, col, "peer played an occupied cell, boards diverged");
            self.active = false;
            return Err(SessionError::BoardDiverged { row, col });
        }

        let computed = self.game.apply_move(remote_sign, position)?;
        if let Some(winner) = winner {
            let finished = FinishedState::from(winner);
            if computed != GameState::Finished(finished) {
                tracing::warn!(
                    ?finished,
                    ?computed,
                    "peer-reported outcome disagrees with local evaluation"
                );
            }
            self.game.set_finished(finished);
        }
        if self.game.is_finished() {
            self.active = false;
        }
        Ok(())
    }
}

/// Shared handle over the session used by the control loop and the
/// dispatcher; all mutation happens under the one mutex inside.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<GameSession>>,
    changed: Arc<Notify>,
}

impl SessionHandle {
    pub fn new(local_id: PlayerId) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GameSession::new(local_id))),
            changed: Arc::new(Notify::new()),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, GameSession> {
        self.inner.lock().await
    }

    pub fn notify(&self) {
        self.changed.notify_waiters();
    }

    /// Wait until the predicate holds, re-checking on every session change.
    pub async fn wait_until<F>(&self, mut predicate: F)
    where
        F: FnMut(&GameSession) -> bool,
    {
        loop {
            let mut notified = pin!(self.changed.notified());
            // register before checking so a change between the check and
            // the await is not lost
            notified.as_mut().enable();
            if predicate(&*self.inner.lock().await) {
                return;
            }
            notified.await;
        }
    }

    /// Block until the handshake completes, bounded by `limit`.
    pub async fn wait_for_peer(&self, limit: Duration) -> Result<(), SessionError> {
        tokio::time::timeout(limit, self.wait_until(GameSession::is_established))
            .await
            .map_err(|_| SessionError::HandshakeTimeout(limit))
    }
}

/// Single consumer of the inbound queue. Applying remote messages here,
/// under the session mutex, is what keeps the "at most one mutator at a
/// time" invariant without finer-grained locking.
pub fn spawn_dispatcher(
    handle: SessionHandle,
    inbound: mpsc::Receiver<Envelope>,
    token: CancellationToken,
) -> JoinHandle<Result<(), SessionError>> {
    tokio::spawn(async move {
        let result = dispatch_loop(&handle, inbound, &token).await;
        if let Err(err) = &result {
            handle.lock().await.active = false;
            tracing::error!(%err, "dispatcher stopped");
        }
        handle.notify();
        result
    })
}

async fn dispatch_loop(
    handle: &SessionHandle,
    mut inbound: mpsc::Receiver<Envelope>,
    token: &CancellationToken,
) -> Result<(), SessionError> {
    loop {
        let msg = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            msg = inbound.recv() => msg,
        };
        let Some(msg) = msg else {
            // the pump closes the queue when the connection drops; that is
            // fatal mid-game, uninteresting after it
            if handle.lock().await.is_active() {
                return Err(SessionError::ChannelClosed);
            }
            return Ok(());
        };
        let result = handle.lock().await.handle_message(msg);
        handle.notify();
        result?;
        if !handle.lock().await.is_active() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::memory::MemoryBus;
    use crate::channel::Channel;

    const WAIT: Duration = Duration::from_secs(2);
    const SHORT: Duration = Duration::from_millis(100);

    struct Peer {
        handle: SessionHandle,
        channel: crate::channel::memory::MemoryChannel,
        dispatcher: JoinHandle<Result<(), SessionError>>,
        token: CancellationToken,
    }

    impl Peer {
        async fn join(bus: &Arc<MemoryBus>, id: &str) -> Self {
            let (channel, inbound) = bus.attach().await;
            let handle = SessionHandle::new(PlayerId::from(id));
            let token = CancellationToken::new();
            let dispatcher = spawn_dispatcher(handle.clone(), inbound, token.clone());
            channel
                .publish_retained(&Envelope::GameStart {
                    player_id: PlayerId::from(id),
                })
                .await
                .unwrap();
            Self {
                handle,
                channel,
                dispatcher,
                token,
            }
        }

        async fn make_move(&self, row: usize, col: usize) {
            tokio::time::timeout(WAIT, self.handle.wait_until(GameSession::is_local_turn))
                .await
                .unwrap();
            let envelope = {
                let mut session = self.handle.lock().await;
                session
                    .apply_local_move(Position::new(row, col).unwrap())
                    .unwrap()
            };
            self.channel.publish(&envelope).await.unwrap();
        }

        async fn finished(&self) -> FinishedState {
            tokio::time::timeout(WAIT, self.handle.wait_until(|s| !s.is_active()))
                .await
                .unwrap();
            self.handle.lock().await.outcome().unwrap()
        }
    }

    #[tokio::test]
    async fn handshake_assigns_complementary_signs() {
        let bus = MemoryBus::new();
        let first = Peer::join(&bus, "aaa111").await;
        // the second peer joins late and only sees the retained game-start
        let second = Peer::join(&bus, "zzz999").await;

        first.handle.wait_for_peer(WAIT).await.unwrap();
        second.handle.wait_for_peer(WAIT).await.unwrap();

        let first_sign = first.handle.lock().await.local_sign().unwrap();
        let second_sign = second.handle.lock().await.local_sign().unwrap();
        // "zzz999" compares greater, so it holds X and moves first
        assert_eq!(second_sign, Sign::X);
        assert_eq!(first_sign, Sign::O);

        first.token.cancel();
        second.token.cancel();
    }

    #[tokio::test]
    async fn own_messages_never_establish_a_session() {
        let bus = MemoryBus::new();
        let lonely = Peer::join(&bus, "aaa111").await;

        let err = lonely.handle.wait_for_peer(SHORT).await.unwrap_err();
        assert!(matches!(err, SessionError::HandshakeTimeout(_)));
        assert!(!lonely.handle.lock().await.is_established());

        lonely.token.cancel();
    }

    #[tokio::test]
    async fn full_game_converges_on_both_peers() {
        let bus = MemoryBus::new();
        let o_peer = Peer::join(&bus, "aaa111").await;
        let x_peer = Peer::join(&bus, "zzz999").await;
        o_peer.handle.wait_for_peer(WAIT).await.unwrap();
        x_peer.handle.wait_for_peer(WAIT).await.unwrap();

        // X takes the main diagonal, O fails to block
        x_peer.make_move(0, 0).await;
        o_peer.make_move(1, 0).await;
        x_peer.make_move(1, 1).await;
        o_peer.make_move(2, 0).await;
        x_peer.make_move(2, 2).await;

        assert_eq!(x_peer.finished().await, FinishedState::Win(Sign::X));
        assert_eq!(o_peer.finished().await, FinishedState::Win(Sign::X));
        assert_eq!(
            x_peer.handle.lock().await.game().field(),
            o_peer.handle.lock().await.game().field()
        );
        assert!(x_peer.dispatcher.await.unwrap().is_ok());
        assert!(o_peer.dispatcher.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn move_before_handshake_is_ignored() {
        let mut session = GameSession::new(PlayerId::from("aaa111"));
        session
            .handle_message(Envelope::Move {
                player_id: PlayerId::from("zzz999"),
                row: 0,
                col: 0,
                winner: None,
            })
            .unwrap();
        assert!(!session.is_established());
        assert!(session.game().is_cell_empty(Position::new(0, 0).unwrap()));
    }

    #[tokio::test]
    async fn third_peer_is_ignored_once_paired() {
        let mut session = GameSession::new(PlayerId::from("mmm555"));
        session.handle_message(Envelope::GameStart {
            player_id: PlayerId::from("zzz999"),
        })
        .unwrap();
        session.handle_message(Envelope::GameStart {
            player_id: PlayerId::from("aaa111"),
        })
        .unwrap();
        // first writer wins
        assert_eq!(session.remote_id(), Some(&PlayerId::from("zzz999")));
        assert_eq!(session.local_sign(), Some(Sign::O));

        // and a move from the latecomer does not touch the board
        session
            .handle_message(Envelope::Move {
                player_id: PlayerId::from("aaa111"),
                row: 1,
                col: 1,
                winner: None,
            })
            .unwrap();
        assert!(session.game().is_cell_empty(Position::new(1, 1).unwrap()));
    }

    #[tokio::test]
    async fn occupied_remote_cell_fails_the_session() {
        let (sender, inbound) = mpsc::channel(8);
        let handle = SessionHandle::new(PlayerId::from("aaa111"));
        let token = CancellationToken::new();
        let dispatcher = spawn_dispatcher(handle.clone(), inbound, token);

        let remote = PlayerId::from("zzz999");
        sender
            .send(Envelope::GameStart {
                player_id: remote.clone(),
            })
            .await
            .unwrap();
        // remote is X and opens at (0, 0)
        sender
            .send(Envelope::Move {
                player_id: remote.clone(),
                row: 0,
                col: 0,
                winner: None,
            })
            .await
            .unwrap();
        tokio::time::timeout(WAIT, handle.wait_until(GameSession::is_local_turn))
            .await
            .unwrap();
        handle
            .lock()
            .await
            .apply_local_move(Position::new(1, 1).unwrap())
            .unwrap();

        // remote replays its own opening cell
        sender
            .send(Envelope::Move {
                player_id: remote,
                row: 0,
                col: 0,
                winner: None,
            })
            .await
            .unwrap();
        let err = dispatcher.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            SessionError::BoardDiverged { row: 0, col: 0 }
        ));
        assert!(!handle.lock().await.is_active());
    }

    #[tokio::test]
    async fn duplicate_delivery_while_local_turn_is_harmless() {
        let mut session = GameSession::new(PlayerId::from("aaa111"));
        session.handle_message(Envelope::GameStart {
            player_id: PlayerId::from("zzz999"),
        })
        .unwrap();

        let opening = Envelope::Move {
            player_id: PlayerId::from("zzz999"),
            row: 0,
            col: 0,
            winner: None,
        };
        session.handle_message(opening.clone()).unwrap();
        assert!(session.is_local_turn());

        // at-least-once delivery: the same move arrives again
        session.handle_message(opening).unwrap();
        assert!(session.is_local_turn());
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn carried_winner_finishes_the_session() {
        let mut session = GameSession::new(PlayerId::from("aaa111"));
        session.handle_message(Envelope::GameStart {
            player_id: PlayerId::from("zzz999"),
        })
        .unwrap();
        let remote = PlayerId::from("zzz999");

        // X: (0,0) (0,1) (0,2) with local O answering in row 1
        for (x_move, o_move) in [((0, 0), (1, 0)), ((0, 1), (1, 1))] {
            session
                .handle_message(Envelope::Move {
                    player_id: remote.clone(),
                    row: x_move.0,
                    col: x_move.1,
                    winner: None,
                })
                .unwrap();
            session
                .apply_local_move(Position::new(o_move.0, o_move.1).unwrap())
                .unwrap();
        }
        session
            .handle_message(Envelope::Move {
                player_id: remote,
                row: 0,
                col: 2,
                winner: Some(Winner::X),
            })
            .unwrap();

        assert!(!session.is_active());
        assert_eq!(session.outcome(), Some(FinishedState::Win(Sign::X)));
    }

    #[tokio::test]
    async fn local_terminal_move_carries_the_outcome() {
        let mut session = GameSession::new(PlayerId::from("zzz999"));
        session.handle_message(Envelope::GameStart {
            player_id: PlayerId::from("aaa111"),
        })
        .unwrap();
        assert_eq!(session.local_sign(), Some(Sign::X));
        let remote = PlayerId::from("aaa111");

        for (x_move, o_move) in [((0, 0), (1, 0)), ((0, 1), (1, 1))] {
            session
                .apply_local_move(Position::new(x_move.0, x_move.1).unwrap())
                .unwrap();
            session
                .handle_message(Envelope::Move {
                    player_id: remote.clone(),
                    row: o_move.0,
                    col: o_move.1,
                    winner: None,
                })
                .unwrap();
        }
        let envelope = session
            .apply_local_move(Position::new(0, 2).unwrap())
            .unwrap();

        assert_eq!(
            envelope,
            Envelope::Move {
                player_id: PlayerId::from("zzz999"),
                row: 0,
                col: 2,
                winner: Some(Winner::X),
            }
        );
        assert!(!session.is_active());
    }
}
