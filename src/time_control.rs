//! Time controls and their rating categories.
//!
//! A category is never stored; it is always recomputed from the time
//! control's parameters with [`classify`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ChessError, Result};

/// Moves assumed per game when estimating how long a time control lasts.
const ESTIMATED_MOVES: i64 = 40;

/// Smallest initial allotment a clock may start with.
pub const MIN_INITIAL_MS: i64 = 1_000;

/// One week. Anything longer is not a real-time game.
pub const MAX_INITIAL_MS: i64 = 7 * 24 * 60 * 60 * 1_000;

/// One day per move.
pub const MAX_INCREMENT_MS: i64 = 24 * 60 * 60 * 1_000;

/// Rating / matchmaking bucket of a time control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeControlCategory {
    UltraBullet,
    Bullet,
    Blitz,
    Rapid,
    Classical,
}

impl TimeControlCategory {
    pub const ALL: [TimeControlCategory; 5] = [
        TimeControlCategory::UltraBullet,
        TimeControlCategory::Bullet,
        TimeControlCategory::Blitz,
        TimeControlCategory::Rapid,
        TimeControlCategory::Classical,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeControlCategory::UltraBullet => "ultra_bullet",
            TimeControlCategory::Bullet => "bullet",
            TimeControlCategory::Blitz => "blitz",
            TimeControlCategory::Rapid => "rapid",
            TimeControlCategory::Classical => "classical",
        }
    }
}

impl fmt::Display for TimeControlCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorize a time control from whole seconds.
///
/// The estimated game length is `initial + 40 * increment`; bounds are
/// inclusive upper bounds (29, 179, 479, 1499).
pub fn classify(initial_time_seconds: i64, increment_seconds: i64) -> Result<TimeControlCategory> {
    if initial_time_seconds <= 0 {
        return Err(ChessError::InvalidTimeControl(format!(
            "initial time must be positive, got {initial_time_seconds}s"
        )));
    }
    if increment_seconds < 0 {
        return Err(ChessError::InvalidTimeControl(format!(
            "increment must not be negative, got {increment_seconds}s"
        )));
    }

    let estimated = initial_time_seconds.saturating_add(increment_seconds.saturating_mul(ESTIMATED_MOVES));
    let category = match estimated {
        i64::MIN..=29 => TimeControlCategory::UltraBullet,
        30..=179 => TimeControlCategory::Bullet,
        180..=479 => TimeControlCategory::Blitz,
        480..=1499 => TimeControlCategory::Rapid,
        _ => TimeControlCategory::Classical,
    };
    Ok(category)
}

/// Fischer time control in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeControl {
    pub initial_ms: i64,
    pub increment_ms: i64,
}

impl TimeControl {
    /// Build a validated time control.
    pub fn new(initial_ms: i64, increment_ms: i64) -> Result<Self> {
        let tc = TimeControl { initial_ms, increment_ms };
        tc.validate()?;
        Ok(tc)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_ms < MIN_INITIAL_MS {
            return Err(ChessError::InvalidTimeControl(format!(
                "initial time must be at least {MIN_INITIAL_MS}ms, got {}ms",
                self.initial_ms
            )));
        }
        if self.initial_ms > MAX_INITIAL_MS {
            return Err(ChessError::InvalidTimeControl(format!(
                "initial time must be at most {MAX_INITIAL_MS}ms, got {}ms",
                self.initial_ms
            )));
        }
        if self.increment_ms < 0 {
            return Err(ChessError::InvalidTimeControl(format!(
                "increment must not be negative, got {}ms",
                self.increment_ms
            )));
        }
        if self.increment_ms > MAX_INCREMENT_MS {
            return Err(ChessError::InvalidTimeControl(format!(
                "increment must be at most {MAX_INCREMENT_MS}ms, got {}ms",
                self.increment_ms
            )));
        }
        Ok(())
    }

    /// Category from the whole seconds of both fields.
    pub fn category(&self) -> Result<TimeControlCategory> {
        self.validate()?;
        classify(self.initial_ms / 1000, self.increment_ms / 1000)
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let initial_secs = self.initial_ms / 1000;
        if initial_secs % 60 == 0 {
            write!(f, "{}+{}", initial_secs / 60, self.increment_ms / 1000)
        } else {
            write!(f, "{}s+{}", initial_secs, self.increment_ms / 1000)
        }
    }
}

/// Parses `"<minutes>+<seconds>"`, e.g. `"5+3"`.
impl FromStr for TimeControl {
    type Err = ChessError;

    fn from_str(s: &str) -> Result<Self> {
        let (minutes, increment) = s
            .split_once('+')
            .ok_or_else(|| ChessError::InvalidTimeControl(format!("expected <minutes>+<seconds>, got {s:?}")))?;
        let minutes: i64 = minutes
            .trim()
            .parse()
            .map_err(|_| ChessError::InvalidTimeControl(format!("bad minutes in {s:?}")))?;
        let increment: i64 = increment
            .trim()
            .parse()
            .map_err(|_| ChessError::InvalidTimeControl(format!("bad increment in {s:?}")))?;
        let overflow = || ChessError::InvalidTimeControl(format!("time control {s:?} is out of range"));
        let initial_ms = minutes.checked_mul(60_000).ok_or_else(overflow)?;
        let increment_ms = increment.checked_mul(1_000).ok_or_else(overflow)?;
        TimeControl::new(initial_ms, increment_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_boundaries() {
        assert_eq!(classify(15, 0), Ok(TimeControlCategory::UltraBullet));
        assert_eq!(classify(29, 0), Ok(TimeControlCategory::UltraBullet));
        assert_eq!(classify(30, 0), Ok(TimeControlCategory::Bullet));
        assert_eq!(classify(179, 0), Ok(TimeControlCategory::Bullet));
        assert_eq!(classify(180, 0), Ok(TimeControlCategory::Blitz));
        assert_eq!(classify(479, 0), Ok(TimeControlCategory::Blitz));
        assert_eq!(classify(480, 0), Ok(TimeControlCategory::Rapid));
        assert_eq!(classify(1499, 0), Ok(TimeControlCategory::Rapid));
        assert_eq!(classify(1500, 0), Ok(TimeControlCategory::Classical));
    }

    #[test]
    fn test_increment_weighs_forty_moves() {
        // 2+1: 120 + 40 = 160
        assert_eq!(classify(120, 1), Ok(TimeControlCategory::Bullet));
        // 3+2: 180 + 80 = 260
        assert_eq!(classify(180, 2), Ok(TimeControlCategory::Blitz));
        // 10+5: 600 + 200 = 800
        assert_eq!(classify(600, 5), Ok(TimeControlCategory::Rapid));
        // 15+15: 900 + 600 = 1500
        assert_eq!(classify(900, 15), Ok(TimeControlCategory::Classical));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(matches!(classify(0, 0), Err(ChessError::InvalidTimeControl(_))));
        assert!(matches!(classify(-5, 2), Err(ChessError::InvalidTimeControl(_))));
        assert!(matches!(classify(60, -1), Err(ChessError::InvalidTimeControl(_))));
    }

    #[test]
    fn test_time_control_validation() {
        assert!(TimeControl::new(300_000, 3_000).is_ok());
        assert!(TimeControl::new(999, 0).is_err());
        assert!(TimeControl::new(60_000, -1).is_err());
        assert!(TimeControl::new(MAX_INITIAL_MS, MAX_INCREMENT_MS).is_ok());
        assert!(matches!(TimeControl::new(60_000, i64::MAX), Err(ChessError::InvalidTimeControl(_))));
        assert!(matches!(TimeControl::new(i64::MAX, 0), Err(ChessError::InvalidTimeControl(_))));
    }

    #[test]
    fn test_parse_and_display() {
        let tc: TimeControl = "5+3".parse().unwrap();
        assert_eq!(tc, TimeControl { initial_ms: 300_000, increment_ms: 3_000 });
        assert_eq!(tc.to_string(), "5+3");
        assert_eq!(tc.category(), Ok(TimeControlCategory::Blitz));

        assert!("5".parse::<TimeControl>().is_err());
        assert!("x+3".parse::<TimeControl>().is_err());
        assert!("0+0".parse::<TimeControl>().is_err());
        assert!(matches!(
            "9223372036854775807+0".parse::<TimeControl>(),
            Err(ChessError::InvalidTimeControl(_))
        ));
        assert!(matches!(
            "5+9223372036854775807".parse::<TimeControl>(),
            Err(ChessError::InvalidTimeControl(_))
        ));

        let quarter = TimeControl::new(15_000, 0).unwrap();
        assert_eq!(quarter.to_string(), "15s+0");
        assert_eq!(quarter.category(), Ok(TimeControlCategory::UltraBullet));
    }
}
