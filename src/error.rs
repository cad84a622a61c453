use thiserror::Error;

/// Everything the clock, session and seek layers can reject.
///
/// A clock running out is not in here: it is reported as
/// [`MoveOutcome::TimedOut`](crate::game::MoveOutcome::TimedOut), because it
/// is a legitimate game result rather than a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChessError {
    #[error("invalid time control: {0}")]
    InvalidTimeControl(String),

    #[error("stale or invalid move: {0}")]
    StaleOrInvalidMove(&'static str),

    #[error("not your turn")]
    WrongTurn,

    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// The seek has already been matched or canceled. Callers treat this as
    /// a lost race and search again.
    #[error("seek is no longer open")]
    SeekAlreadyConsumed,

    #[error("rating range {min}..={max} is empty")]
    InvalidRatingRange { min: i32, max: i32 },

    #[error("player already has an open seek")]
    DuplicateSeek,

    #[error("game not found")]
    GameNotFound,

    #[error("player is not seated in this game")]
    NotAPlayer,
}

pub type Result<T, E = ChessError> = std::result::Result<T, E>;
