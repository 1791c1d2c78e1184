//! Terminal control loop: blocks on local input when it is the local
//! player's turn, otherwise waits for the dispatcher to flip the turn.

use std::io::Write;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::channel::Channel;
use crate::error::SessionError;
use crate::game::{FinishedState, Position, TicTacToe};
use crate::session::SessionHandle;

const INVALID_INPUT: &str = "Invalid input. Please enter a number between 0 and 2.";
const OCCUPIED_CELL: &str = "That cell is already taken. Try again.";

pub fn render_board(game: &TicTacToe) -> String {
    game.field()
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Some(sign) => sign.to_string(),
                    None => "_".to_string(),
                })
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drive the game from handshake to the final board.
pub async fn run(
    handle: &SessionHandle,
    channel: &dyn Channel,
    handshake_timeout: Duration,
) -> Result<(), SessionError> {
    handle.wait_for_peer(handshake_timeout).await?;
    {
        let session = handle.lock().await;
        let sign = session.local_sign().ok_or(SessionError::NotEstablished)?;
        if let Some(remote) = session.remote_id() {
            println!("Playing against {remote}. You are {sign}.");
        }
        if session.is_local_turn() {
            println!("You move first.");
        } else {
            println!("Waiting for the other player's move...");
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        handle
            .wait_until(|s| s.is_local_turn() || !s.is_active())
            .await;
        {
            let session = handle.lock().await;
            if !session.is_active() {
                break;
            }
            println!("{}", render_board(session.game()));
        }

        // no inbound move is expected while it is our turn, so the session
        // cannot change under us between validation and application; it can
        // still die on a transport fault, hence the second select arm
        let position = tokio::select! {
            position = read_move(handle, &mut lines) => position?,
            _ = handle.wait_until(|s| !s.is_active()) => break,
        };
        let envelope = { handle.lock().await.apply_local_move(position)? };
        channel.publish(&envelope).await?;
    }

    let session = handle.lock().await;
    println!("{}", render_board(session.game()));
    println!("Game Over!");
    match session.outcome() {
        Some(FinishedState::Win(sign)) if session.local_sign() == Some(sign) => {
            println!("You win!");
        }
        Some(FinishedState::Win(_)) => println!("You lose."),
        Some(FinishedState::Draw) => println!("It's a tie."),
        None => println!("The game did not finish."),
    }
    Ok(())
}

/// Re-prompt until the input names an in-range, currently empty cell.
async fn read_move(
    handle: &SessionHandle,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<Position, SessionError> {
    loop {
        let row = read_coordinate(lines, "Enter row (0-2): ").await?;
        let col = read_coordinate(lines, "Enter column (0-2): ").await?;
        let position = Position::new(row, col)?;
        if handle.lock().await.game().is_cell_empty(position) {
            return Ok(position);
        }
        println!("{OCCUPIED_CELL}");
    }
}

/// Only the literal digits "0", "1" and "2" are accepted.
async fn read_coordinate(
    lines: &mut Lines<BufReader<Stdin>>,
    prompt: &str,
) -> Result<usize, SessionError> {
    loop {
        print!("{prompt}");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            return Err(SessionError::InputClosed);
        };
        match line.trim() {
            "0" => return Ok(0),
            "1" => return Ok(1),
            "2" => return Ok(2),
            _ => println!("{INVALID_INPUT}"),
        }
    }
}
