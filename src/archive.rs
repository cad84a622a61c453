//! Recording finished games once the in-memory session is settled.
//!
//! Recording runs after every lock is released and never feeds back into
//! the session: a game is over the moment its outcome is set, whether or not
//! the recorder ever succeeds.

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{info, warn};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::game::rules::{color_to_string, Termination};
use crate::game::GameSession;
use crate::time_control::{TimeControl, TimeControlCategory};
use crate::types::{GameId, PlayerId};

/// Everything a finished game leaves behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinishedGame {
    pub game_id: GameId,
    pub white: PlayerId,
    pub black: PlayerId,
    pub time_control: TimeControl,
    pub category: TimeControlCategory,
    pub rated: bool,
    pub result: &'static str,
    pub termination: Termination,
    pub winner: Option<String>,
    pub moves: Vec<String>,
    pub white_remaining_ms: i64,
    pub black_remaining_ms: i64,
}

impl FinishedGame {
    /// `None` while the game is still running.
    pub fn from_session(session: &GameSession) -> Option<Self> {
        let outcome = session.outcome()?;
        let clock = session.clock().snapshot();
        Some(FinishedGame {
            game_id: session.id(),
            white: session.white().clone(),
            black: session.black().clone(),
            time_control: session.time_control(),
            category: session.category(),
            rated: session.rated(),
            result: outcome.score(),
            termination: outcome.reason,
            winner: outcome.winner.map(color_to_string),
            moves: session.moves().iter().map(|m| m.uci.clone()).collect(),
            white_remaining_ms: clock.white_remaining_ms,
            black_remaining_ms: clock.black_remaining_ms,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Worth retrying: storage or network hiccup.
    #[error("transient recorder failure: {0}")]
    Transient(String),
    #[error("recorder rejected game: {0}")]
    Permanent(String),
}

/// Where finished games go: a database, a message queue, a log.
pub trait GameRecorder: Send + Sync {
    fn record<'a>(&'a self, game: &'a FinishedGame) -> BoxFuture<'a, Result<(), RecordError>>;
}

/// Writes each finished game as one JSON log line.
pub struct LogRecorder;

impl GameRecorder for LogRecorder {
    fn record<'a>(&'a self, game: &'a FinishedGame) -> BoxFuture<'a, Result<(), RecordError>> {
        async move {
            let line = serde_json::to_string(game).map_err(|e| RecordError::Permanent(e.to_string()))?;
            info!("Finished game {}: {}", game.game_id, line);
            Ok(())
        }
        .boxed()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { max_attempts: 5, base_delay: Duration::from_millis(100) }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`; doubles every time.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Record `game`, retrying transient failures with exponential backoff.
/// Returns the number of attempts it took.
pub async fn record_with_retry(
    recorder: &dyn GameRecorder,
    game: &FinishedGame,
    policy: RetryPolicy,
) -> Result<u32, RecordError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match recorder.record(game).await {
            Ok(()) => return Ok(attempt),
            Err(RecordError::Transient(reason)) if attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "Recording game {} failed (attempt {}): {}; retrying in {:?}",
                    game.game_id, attempt, reason, delay
                );
                actix_rt::time::sleep(delay).await;
            }
            Err(e) => {
                warn!("Giving up on recording game {} after {} attempts: {}", game.game_id, attempt, e);
                return Err(e);
            }
        }
    }
}
