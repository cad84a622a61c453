//! Server-authoritative chess clock.
//!
//! Every timestamp handed to the clock is an [`Instant`] taken by the server
//! when it received the move. Client-reported times never reach this module.

use chess::Color;
use serde::Serialize;
use std::time::Instant;

use crate::error::{ChessError, Result};
use crate::time_control::TimeControl;

/// Remaining time for both players plus the instant the running side started
/// thinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockState {
    initial_ms: i64,
    increment_ms: i64,
    remaining_ms: [i64; 2],
    started_at: Instant,
    last_move_at: Instant,
    flagged: Option<Color>,
}

/// What the clock decided about a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOutcome {
    /// Time was charged and the increment added.
    Accepted { elapsed_ms: i64, snapshot: ClockSnapshot },
    /// The mover's time ran out before the move arrived. The clock is frozen.
    TimedOut { loser: Color, snapshot: ClockSnapshot },
}

/// Broadcastable view of a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockSnapshot {
    pub white_remaining_ms: i64,
    pub black_remaining_ms: i64,
    /// Offset of the last accepted move from the start of the game.
    pub last_move_timestamp_ms: i64,
}

fn millis_between(earlier: Instant, later: Instant) -> i64 {
    i64::try_from(later.duration_since(earlier).as_millis()).unwrap_or(i64::MAX)
}

impl ClockState {
    /// Start a clock for a new game. `now` becomes the reference point of the
    /// first move.
    pub fn new(time_control: TimeControl, now: Instant) -> Result<Self> {
        time_control.validate()?;
        Ok(ClockState {
            initial_ms: time_control.initial_ms,
            increment_ms: time_control.increment_ms,
            remaining_ms: [time_control.initial_ms; 2],
            started_at: now,
            last_move_at: now,
            flagged: None,
        })
    }

    pub fn initial_ms(&self) -> i64 {
        self.initial_ms
    }

    pub fn increment_ms(&self) -> i64 {
        self.increment_ms
    }

    pub fn remaining_ms(&self, color: Color) -> i64 {
        self.remaining_ms[color.to_index()]
    }

    pub fn last_move_at(&self) -> Instant {
        self.last_move_at
    }

    pub fn flagged(&self) -> Option<Color> {
        self.flagged
    }

    /// Charge `moving` for the time since the last accepted move, then add the
    /// increment unless the clock ran out.
    ///
    /// Zero remaining counts as a loss. The increment is flat: it does not
    /// depend on how long the move took.
    pub fn process_move(&mut self, moving: Color, received_at: Instant) -> Result<ClockOutcome> {
        if self.flagged.is_some() {
            return Err(ChessError::StaleOrInvalidMove("clock already flagged"));
        }
        if received_at < self.last_move_at {
            return Err(ChessError::StaleOrInvalidMove("timestamp precedes last accepted move"));
        }

        let elapsed_ms = millis_between(self.last_move_at, received_at);
        let slot = &mut self.remaining_ms[moving.to_index()];
        *slot = slot.saturating_sub(elapsed_ms);

        if *slot <= 0 {
            self.flagged = Some(moving);
            self.last_move_at = received_at;
            return Ok(ClockOutcome::TimedOut { loser: moving, snapshot: self.snapshot() });
        }

        *slot = slot.saturating_add(self.increment_ms);
        self.last_move_at = received_at;
        Ok(ClockOutcome::Accepted { elapsed_ms, snapshot: self.snapshot() })
    }

    /// Flag `to_move` if its time ran out while nobody moved.
    ///
    /// Commits the same subtraction [`process_move`](Self::process_move)
    /// would, but only when it results in a loss.
    pub fn flag_if_expired(&mut self, to_move: Color, now: Instant) -> Option<ClockSnapshot> {
        if self.flagged.is_some() || now < self.last_move_at {
            return None;
        }
        let elapsed_ms = millis_between(self.last_move_at, now);
        let left = self.remaining_ms[to_move.to_index()].saturating_sub(elapsed_ms);
        if left > 0 {
            return None;
        }
        self.remaining_ms[to_move.to_index()] = left;
        self.flagged = Some(to_move);
        self.last_move_at = now;
        Some(self.snapshot())
    }

    /// Live remaining time, counting down the side to move. Never mutates.
    pub fn remaining_at(&self, color: Color, to_move: Color, now: Instant) -> i64 {
        let stored = self.remaining_ms(color);
        if self.flagged.is_some() || color != to_move || now < self.last_move_at {
            return stored;
        }
        stored.saturating_sub(millis_between(self.last_move_at, now))
    }

    /// Freeze the clock without charging anyone, e.g. on resignation or mate.
    pub fn stop(&mut self, now: Instant, to_move: Color) {
        if self.flagged.is_none() && now >= self.last_move_at {
            let slot = &mut self.remaining_ms[to_move.to_index()];
            *slot = slot.saturating_sub(millis_between(self.last_move_at, now));
            self.last_move_at = now;
        }
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            white_remaining_ms: self.remaining_ms[Color::White.to_index()],
            black_remaining_ms: self.remaining_ms[Color::Black.to_index()],
            last_move_timestamp_ms: millis_between(self.started_at, self.last_move_at),
        }
    }
}
