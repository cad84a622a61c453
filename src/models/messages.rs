use actix::Message;
use serde::{Deserialize, Serialize};

use crate::clock::ClockSnapshot;
use crate::game::rules::{color_to_string, GameOutcome, Termination};
use crate::lobby::{ColorPreference, Seek, SeekPool};
use crate::time_control::TimeControlCategory;
use crate::types::{GameId, PlayerId, SeekId};

/// Message sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum ClientMessage {
    Seek {
        initial_time_ms: i64,
        increment_ms: i64,
        #[serde(default)]
        rated: bool,
        #[serde(default)]
        color_preference: ColorPreference,
        rating_range_min: Option<i32>,
        rating_range_max: Option<i32>,
        #[serde(default)]
        pool: SeekPool,
    },
    CancelSeek {
        seek_id: SeekId,
    },
    Move {
        game_id: GameId,
        uci: String,
        /// Advisory only; the server stamps moves on receipt.
        client_timestamp: Option<i64>,
    },
    Resign {
        game_id: GameId,
    },
    OfferDraw {
        game_id: GameId,
    },
    Watch {
        game_id: GameId,
    },
    ListSeeks,
}

/// Message sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum ServerMessage {
    SeekAccepted {
        seek_id: SeekId,
        category: TimeControlCategory,
    },
    SeekCanceled {
        seek_id: SeekId,
    },
    MatchFound {
        game_session_id: GameId,
        white_id: PlayerId,
        black_id: PlayerId,
        initial_time_ms: i64,
        increment_ms: i64,
        category: TimeControlCategory,
        rated: bool,
    },
    MoveMade {
        game_id: GameId,
        uci: String,
        fen: String,
        ply: u32,
    },
    ClockUpdate {
        session_id: GameId,
        white_remaining_ms: i64,
        black_remaining_ms: i64,
        last_move_timestamp_ms: i64,
    },
    GameOver {
        game_id: GameId,
        winner: Option<String>,
        reason: Termination,
        result: String,
    },
    MoveRejected {
        game_id: GameId,
        reason: String,
    },
    DrawOffered {
        game_id: GameId,
        by: String,
    },
    GameState {
        game_id: GameId,
        fen: String,
        white_id: PlayerId,
        black_id: PlayerId,
        white_remaining_ms: i64,
        black_remaining_ms: i64,
        side_to_move: String,
    },
    SeekList {
        seeks: Vec<SeekView>,
    },
    Error {
        error: String,
    },
}

/// A seek as shown in the lobby list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SeekView {
    pub seek_id: SeekId,
    pub seeker_id: PlayerId,
    pub rating: i32,
    pub initial_time_ms: i64,
    pub increment_ms: i64,
    pub category: TimeControlCategory,
    pub rated: bool,
    pub pool: SeekPool,
}

impl From<&Seek> for SeekView {
    fn from(seek: &Seek) -> Self {
        SeekView {
            seek_id: seek.id,
            seeker_id: seek.seeker_id.clone(),
            rating: seek.rating.rating,
            initial_time_ms: seek.time_control.initial_ms,
            increment_ms: seek.time_control.increment_ms,
            category: seek.category,
            rated: seek.rated,
            pool: seek.pool,
        }
    }
}

impl ServerMessage {
    pub fn clock_update(session_id: GameId, clock: ClockSnapshot) -> Self {
        ServerMessage::ClockUpdate {
            session_id,
            white_remaining_ms: clock.white_remaining_ms,
            black_remaining_ms: clock.black_remaining_ms,
            last_move_timestamp_ms: clock.last_move_timestamp_ms,
        }
    }

    pub fn game_over(game_id: GameId, outcome: GameOutcome) -> Self {
        ServerMessage::GameOver {
            game_id,
            winner: outcome.winner.map(color_to_string),
            reason: outcome.reason,
            result: outcome.score().to_string(),
        }
    }

    pub fn error(error: impl ToString) -> Self {
        ServerMessage::Error { error: error.to_string() }
    }
}

/// Message type for WebSocket communication
#[derive(Message)]
#[rtype(result = "()")]
pub struct ChessWebSocketMessage(pub String);
