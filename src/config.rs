use clap::Parser;
use rand::Rng;

pub const GAME_ID_LEN: usize = 6;

#[derive(Parser, Debug)]
#[command(about = "Two-player tic-tac-toe played peer-to-peer over an MQTT broker")]
pub struct Settings {
    /// MQTT broker host
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    pub broker: String,
    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    pub port: u16,
    /// Game ID to join; prompted for interactively when omitted
    #[arg(long)]
    pub game_id: Option<String>,
    /// Seconds to wait for a peer before giving up
    #[arg(long, default_value_t = 300)]
    pub handshake_timeout: u64,
}

/// Random id a player can propose to their opponent out of band.
pub fn random_game_id() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..GAME_ID_LEN)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
