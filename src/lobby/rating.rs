use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

use crate::time_control::TimeControlCategory;
use crate::types::PlayerId;

/// Glicko-style rating as reported by the rating service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rating {
    pub rating: i32,
    pub deviation: i32,
}

impl Rating {
    /// What an unrated player starts with.
    pub const PROVISIONAL: Rating = Rating { rating: 1500, deviation: 350 };
}

/// Read-only access to players' current ratings. Storage and rating updates
/// live elsewhere.
pub trait RatingProvider: Send + Sync {
    fn current_rating(&self, player: &PlayerId, category: TimeControlCategory) -> Rating;
}

/// Ratings kept in memory; unknown players get [`Rating::PROVISIONAL`].
#[derive(Default)]
pub struct InMemoryRatings {
    table: RwLock<HashMap<(PlayerId, TimeControlCategory), Rating>>,
}

impl InMemoryRatings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, player: PlayerId, category: TimeControlCategory, rating: Rating) {
        self.table.write().insert((player, category), rating);
    }
}

impl RatingProvider for InMemoryRatings {
    fn current_rating(&self, player: &PlayerId, category: TimeControlCategory) -> Rating {
        self.table
            .read()
            .get(&(player.clone(), category))
            .copied()
            .unwrap_or(Rating::PROVISIONAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_players_are_provisional() {
        let ratings = InMemoryRatings::new();
        let alice = PlayerId::new("alice");
        assert_eq!(ratings.current_rating(&alice, TimeControlCategory::Blitz), Rating::PROVISIONAL);

        ratings.set(alice.clone(), TimeControlCategory::Blitz, Rating { rating: 2100, deviation: 60 });
        assert_eq!(ratings.current_rating(&alice, TimeControlCategory::Blitz).rating, 2100);
        assert_eq!(ratings.current_rating(&alice, TimeControlCategory::Bullet), Rating::PROVISIONAL);
    }
}
