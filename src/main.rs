use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mqtt_tictactoe::app;
use mqtt_tictactoe::channel::{Channel, MqttChannel};
use mqtt_tictactoe::config::{random_game_id, Settings};
use mqtt_tictactoe::game::PlayerId;
use mqtt_tictactoe::protocol::{game_topic, Envelope};
use mqtt_tictactoe::session::{spawn_dispatcher, SessionHandle};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::parse();
    let player_id = PlayerId::random();
    println!("Broker Address: {}", settings.broker);
    println!("Your Player ID: {}, Game ID: {}", player_id, random_game_id());

    let game_id = match &settings.game_id {
        Some(id) => id.trim().to_string(),
        None => prompt_game_id()?,
    };
    let topic = game_topic(&game_id);

    let token = CancellationToken::new();
    let (channel, inbound) = MqttChannel::connect(
        &settings.broker,
        settings.port,
        &topic,
        player_id.as_str(),
        token.clone(),
    )
    .await?;
    let channel = Arc::new(channel);

    let handle = SessionHandle::new(player_id.clone());
    let dispatcher = spawn_dispatcher(handle.clone(), inbound, token.clone());

    // retained, so a peer that joins later still sees the advertisement
    channel
        .publish_retained(&Envelope::GameStart { player_id })
        .await?;
    println!("Waiting for another player to join...");

    let result = tokio::select! {
        res = app::run(&handle, channel.as_ref(), Duration::from_secs(settings.handshake_timeout)) => res,
        _ = signal::ctrl_c() => {
            println!();
            tracing::info!("interrupted, leaving the game");
            Ok(())
        }
    };

    // teardown runs on every exit path: clear the retained advertisement
    // so a later joiner doesn't see a stale game, then disconnect
    if let Err(err) = channel.clear_retained().await {
        tracing::warn!(%err, "failed to clear the game advertisement");
    }
    if let Err(err) = channel.disconnect().await {
        tracing::warn!(%err, "failed to disconnect from the broker");
    }
    token.cancel();
    let dispatch_result = dispatcher.await?;

    result?;
    dispatch_result?;
    Ok(())
}

fn prompt_game_id() -> std::io::Result<String> {
    print!("Enter Game ID: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
