use clap::Parser;
use std::time::Duration;

use crate::archive::RetryPolicy;
use crate::lobby::LobbyPolicy;

/// Real-time chess server with server-side clocks and seek matching.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct ServerConfig {
    /// Address the HTTP / WebSocket server listens on.
    #[arg(long, env = "CHESS_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Directory served under /static.
    #[arg(long, env = "CHESS_STATIC_DIR", default_value = "./static")]
    pub static_dir: String,

    /// How long a disconnected player's seek survives before it is canceled.
    #[arg(long, env = "CHESS_SEEK_DISCONNECT_GRACE_MS", default_value_t = 15_000)]
    pub seek_disconnect_grace_ms: u64,

    /// Period of the idle-flag / seek-sweep / quick-pairing pass.
    #[arg(long, env = "CHESS_HOUSEKEEPING_INTERVAL_MS", default_value_t = 250)]
    pub housekeeping_interval_ms: u64,

    /// Rating difference accepted by a fresh quick-pairing seek.
    #[arg(long, default_value_t = 100)]
    pub quick_base_tolerance: i32,

    /// Extra rating difference accepted per second of waiting.
    #[arg(long, default_value_t = 10)]
    pub quick_tolerance_per_sec: i32,

    /// Upper bound of the quick-pairing tolerance.
    #[arg(long, default_value_t = 500)]
    pub quick_max_tolerance: i32,

    /// How long a finished game's id is remembered, so late requests for it
    /// are answered as stale rather than unknown.
    #[arg(long, env = "CHESS_FINISHED_GAME_RETENTION_MS", default_value_t = 300_000)]
    pub finished_game_retention_ms: u64,

    /// Attempts made to record a finished game before giving up.
    #[arg(long, default_value_t = 5)]
    pub recorder_max_attempts: u32,

    /// Seed for colour assignment; random when unset.
    #[arg(long, env = "CHESS_RNG_SEED")]
    pub rng_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig::parse_from(["chess_clock_server"])
    }
}

impl ServerConfig {
    pub fn lobby_policy(&self) -> LobbyPolicy {
        LobbyPolicy {
            quick_base_tolerance: self.quick_base_tolerance,
            quick_tolerance_per_sec: self.quick_tolerance_per_sec,
            quick_max_tolerance: self.quick_max_tolerance,
            disconnect_grace: Duration::from_millis(self.seek_disconnect_grace_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.recorder_max_attempts.max(1),
            ..RetryPolicy::default()
        }
    }

    pub fn finished_game_retention(&self) -> Duration {
        Duration::from_millis(self.finished_game_retention_ms)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms.max(10))
    }
}
