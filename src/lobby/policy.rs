use rand::Rng;
use std::time::{Duration, Instant};

use crate::lobby::seek::{ColorPreference, Seek, SeekPool};

/// Tunables of the matching rules.
#[derive(Debug, Clone)]
pub struct LobbyPolicy {
    /// Rating difference a fresh quick-pairing seek accepts.
    pub quick_base_tolerance: i32,
    /// Extra rating difference accepted per second of waiting.
    pub quick_tolerance_per_sec: i32,
    /// Ceiling of the quick-pairing tolerance.
    pub quick_max_tolerance: i32,
    /// How long a disconnected player's seeks survive.
    pub disconnect_grace: Duration,
}

impl Default for LobbyPolicy {
    fn default() -> Self {
        LobbyPolicy {
            quick_base_tolerance: 100,
            quick_tolerance_per_sec: 10,
            quick_max_tolerance: 500,
            disconnect_grace: Duration::from_secs(15),
        }
    }
}

/// Which of the two matched seeks plays white.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seating {
    FirstIsWhite,
    SecondIsWhite,
}

impl LobbyPolicy {
    /// Quick-pairing rating tolerance after waiting `waited`. Never shrinks
    /// as the wait grows.
    pub fn tolerance(&self, waited: Duration) -> i32 {
        let secs = i32::try_from(waited.as_secs()).unwrap_or(i32::MAX);
        self.quick_base_tolerance
            .saturating_add(self.quick_tolerance_per_sec.saturating_mul(secs))
            .min(self.quick_max_tolerance.max(self.quick_base_tolerance))
    }

    /// Whether `seek` may be paired with `other` at `now`.
    pub fn compatible(&self, seek: &Seek, other: &Seek, now: Instant) -> bool {
        if seek.seeker_id == other.seeker_id
            || seek.pool != other.pool
            || seek.rated != other.rated
            || seek.disconnected_at.is_some()
            || other.disconnected_at.is_some()
        {
            return false;
        }

        let same_clock = match seek.pool {
            SeekPool::Lobby => seek.time_control == other.time_control,
            SeekPool::Quick => seek.category == other.category,
        };
        if !same_clock {
            return false;
        }

        if !seek.accepts_rating(other.rating.rating) || !other.accepts_rating(seek.rating.rating) {
            return false;
        }

        match seek.pool {
            SeekPool::Lobby => true,
            SeekPool::Quick => {
                let diff = (seek.rating.rating - other.rating.rating).abs();
                diff <= self.tolerance(seek.waited(now)) && diff <= self.tolerance(other.waited(now))
            }
        }
    }

    /// Ratings an opponent of `seek` may have at `now`, or `None` when no
    /// rating fits. Every seek [`compatible`](Self::compatible) with `seek`
    /// falls inside this window.
    pub fn rating_window(&self, seek: &Seek, now: Instant) -> Option<(i32, i32)> {
        let mut low = seek.rating_range_min.unwrap_or(i32::MIN);
        let mut high = seek.rating_range_max.unwrap_or(i32::MAX);
        if seek.pool == SeekPool::Quick {
            let tolerance = self.tolerance(seek.waited(now));
            low = low.max(seek.rating.rating.saturating_sub(tolerance));
            high = high.min(seek.rating.rating.saturating_add(tolerance));
        }
        (low <= high).then_some((low, high))
    }

    /// Opposite explicit preferences are honoured; everything else is a coin
    /// flip.
    pub fn seat<R: Rng + ?Sized>(&self, first: &Seek, second: &Seek, rng: &mut R) -> Seating {
        match (first.color_preference, second.color_preference) {
            (ColorPreference::White, ColorPreference::Black) => Seating::FirstIsWhite,
            (ColorPreference::Black, ColorPreference::White) => Seating::SecondIsWhite,
            _ if rng.gen_bool(0.5) => Seating::FirstIsWhite,
            _ => Seating::SecondIsWhite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::rating::Rating;
    use crate::lobby::seek::SeekStatus;
    use crate::time_control::TimeControl;
    use crate::types::{PlayerId, SeekId};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seek(player: &str, tc: TimeControl, rating: i32, created_at: Instant) -> Seek {
        Seek {
            id: SeekId::new(),
            seeker_id: PlayerId::new(player),
            time_control: tc,
            category: tc.category().unwrap(),
            rated: true,
            color_preference: ColorPreference::Random,
            rating_range_min: None,
            rating_range_max: None,
            pool: SeekPool::Quick,
            rating: Rating { rating, deviation: 80 },
            created_at,
            seq: 0,
            status: SeekStatus::Open,
            disconnected_at: None,
        }
    }

    fn blitz() -> TimeControl {
        TimeControl::new(300_000, 3_000).unwrap()
    }

    #[test]
    fn test_tolerance_grows_then_caps() {
        let policy = LobbyPolicy::default();
        assert_eq!(policy.tolerance(Duration::ZERO), 100);
        assert_eq!(policy.tolerance(Duration::from_secs(10)), 200);
        assert_eq!(policy.tolerance(Duration::from_secs(3600)), 500);

        let mut last = 0;
        for secs in 0..120 {
            let t = policy.tolerance(Duration::from_secs(secs));
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn test_quick_pool_widens_with_wait() {
        let policy = LobbyPolicy::default();
        let t0 = Instant::now();
        let a = seek("a", blitz(), 1500, t0);
        let b = seek("b", blitz(), 1750, t0);

        assert!(!policy.compatible(&a, &b, t0));
        // Both need 250 of tolerance: 100 + 10 * 15s.
        assert!(policy.compatible(&a, &b, t0 + Duration::from_secs(15)));
    }

    #[test]
    fn test_quick_pool_matches_within_category() {
        let policy = LobbyPolicy::default();
        let t0 = Instant::now();
        let a = seek("a", blitz(), 1500, t0);
        let b = seek("b", TimeControl::new(180_000, 2_000).unwrap(), 1500, t0);
        assert!(policy.compatible(&a, &b, t0));

        let mut lobby_a = a.clone();
        let mut lobby_b = b.clone();
        lobby_a.pool = SeekPool::Lobby;
        lobby_b.pool = SeekPool::Lobby;
        assert!(!policy.compatible(&lobby_a, &lobby_b, t0));
        assert!(!policy.compatible(&a, &lobby_b, t0));
    }

    #[test]
    fn test_rating_window() {
        let policy = LobbyPolicy::default();
        let t0 = Instant::now();
        let mut a = seek("a", blitz(), 1500, t0);
        assert_eq!(policy.rating_window(&a, t0), Some((1400, 1600)));
        assert_eq!(policy.rating_window(&a, t0 + Duration::from_secs(10)), Some((1300, 1700)));

        a.rating_range_min = Some(1550);
        assert_eq!(policy.rating_window(&a, t0), Some((1550, 1600)));
        a.rating_range_min = Some(1700);
        assert_eq!(policy.rating_window(&a, t0), None);

        a.pool = SeekPool::Lobby;
        a.rating_range_max = Some(2000);
        assert_eq!(policy.rating_window(&a, t0), Some((1700, 2000)));
        a.rating_range_min = None;
        assert_eq!(policy.rating_window(&a, t0), Some((i32::MIN, 2000)));
    }

    #[test]
    fn test_basic_exclusions() {
        let policy = LobbyPolicy::default();
        let t0 = Instant::now();
        let a = seek("a", blitz(), 1500, t0);

        let same_player = seek("a", blitz(), 1500, t0);
        assert!(!policy.compatible(&a, &same_player, t0));

        let mut casual = seek("b", blitz(), 1500, t0);
        casual.rated = false;
        assert!(!policy.compatible(&a, &casual, t0));

        let mut gone = seek("c", blitz(), 1500, t0);
        gone.disconnected_at = Some(t0);
        assert!(!policy.compatible(&a, &gone, t0));
    }

    #[test]
    fn test_explicit_ranges_apply_both_ways() {
        let policy = LobbyPolicy::default();
        let t0 = Instant::now();
        let mut a = seek("a", blitz(), 1500, t0);
        a.pool = SeekPool::Lobby;
        let mut b = seek("b", blitz(), 1900, t0);
        b.pool = SeekPool::Lobby;

        assert!(policy.compatible(&a, &b, t0));
        a.rating_range_max = Some(1800);
        assert!(!policy.compatible(&a, &b, t0));
        assert!(!policy.compatible(&b, &a, t0));
    }

    #[test]
    fn test_seating() {
        let policy = LobbyPolicy::default();
        let t0 = Instant::now();
        let mut rng = StdRng::seed_from_u64(7);
        let mut a = seek("a", blitz(), 1500, t0);
        let mut b = seek("b", blitz(), 1500, t0);

        a.color_preference = ColorPreference::Black;
        b.color_preference = ColorPreference::White;
        for _ in 0..20 {
            assert_eq!(policy.seat(&a, &b, &mut rng), Seating::SecondIsWhite);
        }

        a.color_preference = ColorPreference::White;
        b.color_preference = ColorPreference::White;
        let firsts = (0..200)
            .filter(|_| policy.seat(&a, &b, &mut rng) == Seating::FirstIsWhite)
            .count();
        assert!(firsts > 50 && firsts < 150, "same preferences should be random, got {firsts}/200");
    }
}
