use chess::{Color, Game};
use log::debug;
use serde::Serialize;
use std::time::Instant;

use crate::clock::{ClockOutcome, ClockSnapshot, ClockState};
use crate::error::{ChessError, Result};
use crate::game::rules::{self, GameOutcome, Termination};
use crate::time_control::{TimeControl, TimeControlCategory};
use crate::types::{GameId, PlayerId};

/// One accepted move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    /// 1-based half-move number.
    pub ply: u32,
    #[serde(serialize_with = "serialize_color")]
    pub color: Color,
    pub uci: String,
    pub elapsed_ms: i64,
    pub remaining_after_ms: i64,
}

fn serialize_color<S: serde::Serializer>(color: &Color, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&rules::color_to_string(*color))
}

/// Result of [`GameSession::submit_move`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move was played. `finished` is set when it ended the game.
    Accepted {
        record: MoveRecord,
        fen: String,
        clock: ClockSnapshot,
        finished: Option<GameOutcome>,
    },
    /// The mover ran out of time; the move was not played.
    TimedOut {
        loser: Color,
        clock: ClockSnapshot,
        outcome: GameOutcome,
    },
}

/// Result of [`GameSession::offer_draw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOffer {
    Offered(Color),
    Agreed(GameOutcome),
}

/// A game between two seated players.
///
/// Not synchronized on its own; the [`GameRegistry`](super::GameRegistry)
/// wraps every session in its own mutex so moves for one game are applied
/// strictly one after another.
pub struct GameSession {
    id: GameId,
    white: PlayerId,
    black: PlayerId,
    time_control: TimeControl,
    category: TimeControlCategory,
    rated: bool,
    clock: ClockState,
    game: Game,
    moves: Vec<MoveRecord>,
    draw_offer: Option<Color>,
    outcome: Option<GameOutcome>,
}

impl GameSession {
    /// Seat two players and start the clock at `now`.
    pub fn new(
        id: GameId,
        white: PlayerId,
        black: PlayerId,
        time_control: TimeControl,
        rated: bool,
        now: Instant,
    ) -> Result<Self> {
        let category = time_control.category()?;
        let clock = ClockState::new(time_control, now)?;
        Ok(GameSession {
            id,
            white,
            black,
            time_control,
            category,
            rated,
            clock,
            game: Game::new(),
            moves: Vec::new(),
            draw_offer: None,
            outcome: None,
        })
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn white(&self) -> &PlayerId {
        &self.white
    }

    pub fn black(&self) -> &PlayerId {
        &self.black
    }

    pub fn time_control(&self) -> TimeControl {
        self.time_control
    }

    pub fn category(&self) -> TimeControlCategory {
        self.category
    }

    pub fn rated(&self) -> bool {
        self.rated
    }

    pub fn clock(&self) -> &ClockState {
        &self.clock
    }

    pub fn moves(&self) -> &[MoveRecord] {
        &self.moves
    }

    pub fn outcome(&self) -> Option<GameOutcome> {
        self.outcome
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn side_to_move(&self) -> Color {
        self.game.side_to_move()
    }

    pub fn fen(&self) -> String {
        self.game.current_position().to_string()
    }

    pub fn color_of(&self, player: &PlayerId) -> Option<Color> {
        if *player == self.white {
            Some(Color::White)
        } else if *player == self.black {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn player(&self, color: Color) -> &PlayerId {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    /// Apply a move received by the server at `received_at`.
    ///
    /// The clock is charged before legality is checked, so a player whose
    /// time has already run out loses on time whatever they sent. An illegal
    /// move on a live clock leaves the session untouched.
    pub fn submit_move(&mut self, color: Color, uci: &str, received_at: Instant) -> Result<MoveOutcome> {
        if self.outcome.is_some() {
            return Err(ChessError::StaleOrInvalidMove("game is already over"));
        }
        if color != self.game.side_to_move() {
            return Err(ChessError::WrongTurn);
        }

        let mut clock = self.clock;
        let elapsed_ms = match clock.process_move(color, received_at)? {
            ClockOutcome::TimedOut { loser, snapshot } => {
                self.clock = clock;
                let outcome = self.finish(GameOutcome::win(!loser, Termination::Timeout));
                return Ok(MoveOutcome::TimedOut { loser, clock: snapshot, outcome });
            }
            ClockOutcome::Accepted { elapsed_ms, .. } => elapsed_ms,
        };

        let chess_move = rules::parse_move(&self.game.current_position(), uci)?;
        if !self.game.make_move(chess_move) {
            return Err(ChessError::IllegalMove(uci.to_string()));
        }
        self.clock = clock;

        // Moving implicitly declines the opponent's pending offer.
        if self.draw_offer == Some(!color) {
            self.draw_offer = None;
        }

        let record = MoveRecord {
            ply: self.moves.len() as u32 + 1,
            color,
            uci: chess_move.to_string(),
            elapsed_ms,
            remaining_after_ms: self.clock.remaining_ms(color),
        };
        self.moves.push(record.clone());
        debug!("game {} ply {} {} ({}ms)", self.id, record.ply, record.uci, elapsed_ms);

        let finished = rules::termination(&self.game).map(|outcome| self.finish(outcome));
        Ok(MoveOutcome::Accepted {
            record,
            fen: self.fen(),
            clock: self.clock.snapshot(),
            finished,
        })
    }

    pub fn resign(&mut self, color: Color, now: Instant) -> Result<GameOutcome> {
        if self.outcome.is_some() {
            return Err(ChessError::StaleOrInvalidMove("game is already over"));
        }
        self.clock.stop(now, self.game.side_to_move());
        Ok(self.finish(GameOutcome::win(!color, Termination::Resignation)))
    }

    /// Offer a draw. An offer answering the opponent's pending one is an
    /// agreement.
    pub fn offer_draw(&mut self, color: Color, now: Instant) -> Result<DrawOffer> {
        if self.outcome.is_some() {
            return Err(ChessError::StaleOrInvalidMove("game is already over"));
        }
        if self.draw_offer == Some(!color) {
            self.clock.stop(now, self.game.side_to_move());
            return Ok(DrawOffer::Agreed(self.finish(GameOutcome::draw(Termination::DrawAgreement))));
        }
        self.draw_offer = Some(color);
        Ok(DrawOffer::Offered(color))
    }

    /// End the game on time if the side to move has run out while idle.
    pub fn flag_if_expired(&mut self, now: Instant) -> Option<(GameOutcome, ClockSnapshot)> {
        if self.outcome.is_some() {
            return None;
        }
        let to_move = self.game.side_to_move();
        let snapshot = self.clock.flag_if_expired(to_move, now)?;
        Some((self.finish(GameOutcome::win(!to_move, Termination::Timeout)), snapshot))
    }

    fn finish(&mut self, outcome: GameOutcome) -> GameOutcome {
        debug_assert!(self.outcome.is_none(), "game {} finished twice", self.id);
        self.outcome = Some(outcome);
        self.draw_offer = None;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn session(time_control: TimeControl, now: Instant) -> GameSession {
        GameSession::new(
            GameId::new(),
            PlayerId::new("white"),
            PlayerId::new("black"),
            time_control,
            true,
            now,
        )
        .unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_new_session_classifies_and_starts_clock() {
        let t0 = Instant::now();
        let s = session(TimeControl::new(300_000, 3_000).unwrap(), t0);
        assert_eq!(s.category(), TimeControlCategory::Blitz);
        assert_eq!(s.clock().remaining_ms(Color::White), 300_000);
        assert_eq!(s.side_to_move(), Color::White);
        assert!(!s.is_finished());
    }

    #[test]
    fn test_invalid_time_control_rejected() {
        let err = GameSession::new(
            GameId::new(),
            PlayerId::new("a"),
            PlayerId::new("b"),
            TimeControl { initial_ms: 0, increment_ms: 0 },
            false,
            Instant::now(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ChessError::InvalidTimeControl(_)));
    }

    #[test]
    fn test_moves_charge_the_clock_and_record() {
        let t0 = Instant::now();
        let mut s = session(TimeControl::new(300_000, 3_000).unwrap(), t0);

        let outcome = s.submit_move(Color::White, "e2e4", t0 + ms(2_000)).unwrap();
        match outcome {
            MoveOutcome::Accepted { record, clock, finished, .. } => {
                assert_eq!(record.ply, 1);
                assert_eq!(record.uci, "e2e4");
                assert_eq!(record.remaining_after_ms, 301_000);
                assert_eq!(clock.white_remaining_ms, 301_000);
                assert!(finished.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(s.side_to_move(), Color::Black);
        assert_eq!(s.moves().len(), 1);
    }

    #[test]
    fn test_wrong_turn_rejected() {
        let t0 = Instant::now();
        let mut s = session(TimeControl::new(60_000, 0).unwrap(), t0);
        assert_eq!(s.submit_move(Color::Black, "e7e5", t0 + ms(10)), Err(ChessError::WrongTurn));
        assert!(s.moves().is_empty());
    }

    #[test]
    fn test_illegal_move_leaves_clock_untouched() {
        let t0 = Instant::now();
        let mut s = session(TimeControl::new(60_000, 1_000).unwrap(), t0);
        let before = *s.clock();
        let err = s.submit_move(Color::White, "e2e5", t0 + ms(3_000)).unwrap_err();
        assert!(matches!(err, ChessError::IllegalMove(_)));
        assert_eq!(*s.clock(), before);
    }

    #[test]
    fn test_timeout_beats_illegal_move() {
        let t0 = Instant::now();
        let mut s = session(TimeControl::new(1_000, 0).unwrap(), t0);
        let outcome = s.submit_move(Color::White, "e2e5", t0 + ms(1_500)).unwrap();
        match outcome {
            MoveOutcome::TimedOut { loser, outcome, .. } => {
                assert_eq!(loser, Color::White);
                assert_eq!(outcome, GameOutcome::win(Color::Black, Termination::Timeout));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(s.is_finished());
        assert!(s.moves().is_empty());

        let err = s.submit_move(Color::White, "e2e4", t0 + ms(1_600)).unwrap_err();
        assert!(matches!(err, ChessError::StaleOrInvalidMove(_)));
    }

    #[test]
    fn test_checkmate_finishes_session() {
        let t0 = Instant::now();
        let mut s = session(TimeControl::new(60_000, 0).unwrap(), t0);
        let mut at = t0;
        let mut last = None;
        for (i, uci) in ["f2f3", "e7e5", "g2g4", "d8h4"].iter().enumerate() {
            at += ms(100);
            let color = if i % 2 == 0 { Color::White } else { Color::Black };
            last = Some(s.submit_move(color, uci, at).unwrap());
        }
        match last.unwrap() {
            MoveOutcome::Accepted { finished: Some(outcome), .. } => {
                assert_eq!(outcome, GameOutcome::win(Color::Black, Termination::Checkmate));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(s.is_finished());
    }

    #[test]
    fn test_resign_and_draw_agreement() {
        let t0 = Instant::now();
        let mut s = session(TimeControl::new(60_000, 0).unwrap(), t0);
        let outcome = s.resign(Color::White, t0 + ms(500)).unwrap();
        assert_eq!(outcome, GameOutcome::win(Color::Black, Termination::Resignation));
        assert!(s.resign(Color::Black, t0 + ms(600)).is_err());

        let mut s = session(TimeControl::new(60_000, 0).unwrap(), t0);
        assert_eq!(s.offer_draw(Color::White, t0).unwrap(), DrawOffer::Offered(Color::White));
        assert_eq!(
            s.offer_draw(Color::Black, t0 + ms(10)).unwrap(),
            DrawOffer::Agreed(GameOutcome::draw(Termination::DrawAgreement))
        );
    }

    #[test]
    fn test_moving_declines_pending_offer() {
        let t0 = Instant::now();
        let mut s = session(TimeControl::new(60_000, 0).unwrap(), t0);
        s.offer_draw(Color::Black, t0).unwrap();
        s.submit_move(Color::White, "e2e4", t0 + ms(100)).unwrap();
        // Black's earlier offer was declined, so white's offer is a fresh one.
        assert_eq!(s.offer_draw(Color::White, t0 + ms(200)).unwrap(), DrawOffer::Offered(Color::White));
    }

    #[test]
    fn test_idle_flag() {
        let t0 = Instant::now();
        let mut s = session(TimeControl::new(5_000, 0).unwrap(), t0);
        assert!(s.flag_if_expired(t0 + ms(4_999)).is_none());
        let (outcome, snapshot) = s.flag_if_expired(t0 + ms(5_000)).unwrap();
        assert_eq!(outcome, GameOutcome::win(Color::Black, Termination::Timeout));
        assert_eq!(snapshot.white_remaining_ms, 0);
        assert!(s.flag_if_expired(t0 + ms(9_000)).is_none());
    }

    #[test]
    fn test_color_lookup() {
        let s = session(TimeControl::new(60_000, 0).unwrap(), Instant::now());
        assert_eq!(s.color_of(&PlayerId::new("white")), Some(Color::White));
        assert_eq!(s.color_of(&PlayerId::new("black")), Some(Color::Black));
        assert_eq!(s.color_of(&PlayerId::new("someone")), None);
        assert_eq!(s.player(Color::Black), &PlayerId::new("black"));
    }
}
