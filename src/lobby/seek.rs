use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::lobby::rating::Rating;
use crate::time_control::{TimeControl, TimeControlCategory};
use crate::types::{PlayerId, SeekId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorPreference {
    White,
    Black,
    #[default]
    Random,
}

/// Which matching rules a seek follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekPool {
    /// Lobby seeks only pair with identical time controls.
    Lobby,
    /// Quick pairing: same category, rating tolerance widening with wait time.
    #[default]
    Quick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekStatus {
    Open,
    Matched,
    Canceled,
}

/// What a player asks for. Validated by the registry on submission.
#[derive(Debug, Clone)]
pub struct SeekRequest {
    pub seeker_id: PlayerId,
    pub time_control: TimeControl,
    pub rated: bool,
    pub color_preference: ColorPreference,
    pub rating_range_min: Option<i32>,
    pub rating_range_max: Option<i32>,
    pub pool: SeekPool,
}

impl SeekRequest {
    pub fn new(seeker_id: PlayerId, time_control: TimeControl) -> Self {
        SeekRequest {
            seeker_id,
            time_control,
            rated: false,
            color_preference: ColorPreference::Random,
            rating_range_min: None,
            rating_range_max: None,
            pool: SeekPool::Quick,
        }
    }
}

/// Returned by a successful submission; the only way to address a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeekHandle {
    pub id: SeekId,
    pub category: TimeControlCategory,
}

/// An entry of the open-seek set.
#[derive(Debug, Clone)]
pub struct Seek {
    pub id: SeekId,
    pub seeker_id: PlayerId,
    pub time_control: TimeControl,
    pub category: TimeControlCategory,
    pub rated: bool,
    pub color_preference: ColorPreference,
    pub rating_range_min: Option<i32>,
    pub rating_range_max: Option<i32>,
    pub pool: SeekPool,
    /// The seeker's rating when the seek was submitted.
    pub rating: Rating,
    pub created_at: Instant,
    /// Submission order; breaks ties between equal `created_at`.
    pub(crate) seq: u64,
    pub status: SeekStatus,
    /// Set while the seeker's connection is gone. Such seeks are never
    /// matched and are canceled once the grace period passes.
    pub disconnected_at: Option<Instant>,
}

impl Seek {
    pub fn handle(&self) -> SeekHandle {
        SeekHandle { id: self.id, category: self.category }
    }

    /// Whether `rating` falls inside this seek's explicit range.
    pub fn accepts_rating(&self, rating: i32) -> bool {
        self.rating_range_min.map_or(true, |min| rating >= min) && self.rating_range_max.map_or(true, |max| rating <= max)
    }

    pub fn waited(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub(crate) fn fifo_key(&self) -> (Instant, u64) {
        (self.created_at, self.seq)
    }
}
