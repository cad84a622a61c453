use log::{debug, info};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ChessError, Result};
use crate::game::GameSession;
use crate::lobby::policy::{LobbyPolicy, Seating};
use crate::lobby::rating::RatingProvider;
use crate::lobby::seek::{Seek, SeekHandle, SeekPool, SeekRequest, SeekStatus};
use crate::time_control::TimeControlCategory;
use crate::types::{GameId, PlayerId, SeekId};

/// Width of the rating buckets open seeks are filed under.
pub const RATING_BUCKET_WIDTH: i32 = 100;

fn bucket_of(rating: i32) -> i32 {
    rating.div_euclid(RATING_BUCKET_WIDTH)
}

/// Two seeks that were consumed together and the game created for them.
pub struct Pairing {
    pub session: GameSession,
    pub white_seek: Seek,
    pub black_seek: Seek,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeekStats {
    pub open_by_category: Vec<(TimeControlCategory, usize)>,
    /// Seeks consumed by a match; two per game created.
    pub matched_total: u64,
    /// Seeks withdrawn or swept after a disconnect.
    pub canceled_total: u64,
}

/// Open seeks of one category, filed by pool and rating bucket so matching
/// only walks the buckets an opponent's rating can fall into.
#[derive(Default)]
struct Shard {
    buckets: BTreeMap<(SeekPool, i32), Vec<Seek>>,
    located: HashMap<SeekId, (SeekPool, i32)>,
}

impl Shard {
    fn insert(&mut self, seek: Seek) {
        let key = (seek.pool, bucket_of(seek.rating.rating));
        self.located.insert(seek.id, key);
        self.buckets.entry(key).or_default().push(seek);
    }

    fn get(&self, id: SeekId) -> Option<&Seek> {
        let key = self.located.get(&id)?;
        self.buckets.get(key)?.iter().find(|s| s.id == id)
    }

    fn get_mut(&mut self, id: SeekId) -> Option<&mut Seek> {
        let key = self.located.get(&id)?;
        self.buckets.get_mut(key)?.iter_mut().find(|s| s.id == id)
    }

    fn remove(&mut self, id: SeekId) -> Option<Seek> {
        let key = self.located.remove(&id)?;
        let bucket = self.buckets.get_mut(&key)?;
        let index = bucket.iter().position(|s| s.id == id)?;
        let seek = bucket.remove(index);
        if bucket.is_empty() {
            self.buckets.remove(&key);
        }
        Some(seek)
    }

    /// Seeks of `pool` in the buckets covering `low..=high`. Edge buckets may
    /// hold ratings just outside the range.
    fn candidates(&self, pool: SeekPool, low: i32, high: i32) -> impl Iterator<Item = &Seek> {
        self.buckets
            .range((pool, bucket_of(low))..=(pool, bucket_of(high)))
            .flat_map(|(_, seeks)| seeks.iter())
    }

    fn iter(&self) -> impl Iterator<Item = &Seek> {
        self.buckets.values().flatten()
    }

    fn len(&self) -> usize {
        self.located.len()
    }

    fn take_where(&mut self, mut pred: impl FnMut(&Seek) -> bool) -> Vec<Seek> {
        let mut taken = Vec::new();
        for seeks in self.buckets.values_mut() {
            let (out, kept): (Vec<Seek>, Vec<Seek>) = std::mem::take(seeks).into_iter().partition(|s| pred(s));
            *seeks = kept;
            taken.extend(out);
        }
        self.buckets.retain(|_, seeks| !seeks.is_empty());
        for seek in &taken {
            self.located.remove(&seek.id);
        }
        taken
    }
}

/// The open-seek set, one mutex per time-control category.
///
/// Every operation that adds, consumes or cancels a seek does so under its
/// category's lock, so a seek leaves the open set exactly once. When a
/// second lock is needed it is always taken after the shard lock.
pub struct MatchSeekRegistry {
    shards: [Mutex<Shard>; 5],
    owners: Mutex<HashMap<PlayerId, SeekHandle>>,
    policy: LobbyPolicy,
    ratings: Arc<dyn RatingProvider>,
    rng: Mutex<StdRng>,
    next_seq: AtomicU64,
    matched_total: AtomicU64,
    canceled_total: AtomicU64,
}

impl MatchSeekRegistry {
    pub fn new(policy: LobbyPolicy, ratings: Arc<dyn RatingProvider>, rng_seed: Option<u64>) -> Self {
        let rng = match rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        MatchSeekRegistry {
            shards: Default::default(),
            owners: Mutex::new(HashMap::new()),
            policy,
            ratings,
            rng: Mutex::new(rng),
            next_seq: AtomicU64::new(0),
            matched_total: AtomicU64::new(0),
            canceled_total: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &LobbyPolicy {
        &self.policy
    }

    fn shard(&self, category: TimeControlCategory) -> &Mutex<Shard> {
        &self.shards[category.index()]
    }

    /// Validate and open a seek. A player may have one open seek at a time.
    pub fn submit_seek(&self, request: SeekRequest, now: Instant) -> Result<SeekHandle> {
        let category = request.time_control.category()?;
        if let (Some(min), Some(max)) = (request.rating_range_min, request.rating_range_max) {
            if min > max {
                return Err(ChessError::InvalidRatingRange { min, max });
            }
        }
        let rating = self.ratings.current_rating(&request.seeker_id, category);

        let seek = Seek {
            id: SeekId::new(),
            seeker_id: request.seeker_id,
            time_control: request.time_control,
            category,
            rated: request.rated,
            color_preference: request.color_preference,
            rating_range_min: request.rating_range_min,
            rating_range_max: request.rating_range_max,
            pool: request.pool,
            rating,
            created_at: now,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            status: SeekStatus::Open,
            disconnected_at: None,
        };
        let handle = seek.handle();

        let mut shard = self.shard(category).lock();
        let mut owners = self.owners.lock();
        if owners.contains_key(&seek.seeker_id) {
            return Err(ChessError::DuplicateSeek);
        }
        info!(
            "Seek {} opened by {} ({} {}, rating {})",
            seek.id, seek.seeker_id, seek.time_control, category, rating.rating
        );
        owners.insert(seek.seeker_id.clone(), handle);
        shard.insert(seek);
        Ok(handle)
    }

    /// Pair the seek behind `handle` with the oldest compatible open seek.
    ///
    /// `Ok(None)` means nobody fits yet and the seek stays open.
    /// [`ChessError::SeekAlreadyConsumed`] means the seek was matched or
    /// canceled by someone else first.
    pub fn try_match(&self, handle: SeekHandle, now: Instant) -> Result<Option<Pairing>> {
        let mut shard = self.shard(handle.category).lock();
        self.pair_at(&mut shard, handle.id, now)
    }

    /// Re-run quick pairing for every open seek, oldest first, so tolerances
    /// that widened since submission get a chance to match.
    pub fn match_waiting(&self, now: Instant) -> Vec<Pairing> {
        let mut pairings = Vec::new();
        for category in TimeControlCategory::ALL {
            let mut shard = self.shard(category).lock();
            let mut order: Vec<((Instant, u64), SeekId)> = shard.iter().map(|s| (s.fifo_key(), s.id)).collect();
            order.sort_by_key(|(key, _)| *key);

            for (_, id) in order {
                match self.pair_at(&mut shard, id, now) {
                    Ok(Some(pairing)) => pairings.push(pairing),
                    // Already taken as someone's partner earlier in this pass.
                    Ok(None) | Err(ChessError::SeekAlreadyConsumed) => {}
                    Err(e) => debug!("Skipping seek {id}: {e}"),
                }
            }
        }
        pairings
    }

    fn pair_at(&self, shard: &mut Shard, id: SeekId, now: Instant) -> Result<Option<Pairing>> {
        let seek = shard.get(id).ok_or(ChessError::SeekAlreadyConsumed)?;
        let Some((low, high)) = self.policy.rating_window(seek, now) else {
            return Ok(None);
        };
        let partner = shard
            .candidates(seek.pool, low, high)
            .filter(|other| other.id != id && self.policy.compatible(seek, other, now))
            .min_by_key(|other| other.fifo_key());
        let Some(waiting) = partner else {
            return Ok(None);
        };

        // The waiting seek's exact time control is the one that is played.
        let seating = self.policy.seat(seek, waiting, &mut *self.rng.lock());
        let (white, black) = match seating {
            Seating::FirstIsWhite => (seek, waiting),
            Seating::SecondIsWhite => (waiting, seek),
        };
        let session = GameSession::new(
            GameId::new(),
            white.seeker_id.clone(),
            black.seeker_id.clone(),
            waiting.time_control,
            waiting.rated,
            now,
        )?;
        let partner_id = waiting.id;

        let (Some(mut first), Some(mut second)) = (shard.remove(id), shard.remove(partner_id)) else {
            return Err(ChessError::SeekAlreadyConsumed);
        };
        first.status = SeekStatus::Matched;
        second.status = SeekStatus::Matched;

        let mut owners = self.owners.lock();
        owners.remove(&first.seeker_id);
        owners.remove(&second.seeker_id);
        drop(owners);
        self.matched_total.fetch_add(2, Ordering::Relaxed);

        let (white_seek, black_seek) = match seating {
            Seating::FirstIsWhite => (first, second),
            Seating::SecondIsWhite => (second, first),
        };
        info!(
            "Matched seeks {} and {} into game {} ({} vs {})",
            white_seek.id,
            black_seek.id,
            session.id(),
            session.white(),
            session.black()
        );
        Ok(Some(Pairing { session, white_seek, black_seek }))
    }

    /// Withdraw an open seek.
    pub fn cancel(&self, handle: SeekHandle) -> Result<Seek> {
        let mut shard = self.shard(handle.category).lock();
        let mut seek = shard.remove(handle.id).ok_or(ChessError::SeekAlreadyConsumed)?;
        seek.status = SeekStatus::Canceled;
        self.owners.lock().remove(&seek.seeker_id);
        self.canceled_total.fetch_add(1, Ordering::Relaxed);
        info!("Seek {} canceled", seek.id);
        Ok(seek)
    }

    /// The open seek of `player`, if any.
    pub fn handle_of(&self, player: &PlayerId) -> Option<SeekHandle> {
        self.owners.lock().get(player).copied()
    }

    pub fn cancel_all_for(&self, player: &PlayerId) -> Option<Seek> {
        let handle = self.handle_of(player)?;
        self.cancel(handle).ok()
    }

    /// Hide `player`'s seek from matching until they come back or the grace
    /// period runs out.
    pub fn mark_disconnected(&self, player: &PlayerId, now: Instant) {
        self.set_disconnected(player, Some(now));
    }

    pub fn mark_reconnected(&self, player: &PlayerId) {
        self.set_disconnected(player, None);
    }

    fn set_disconnected(&self, player: &PlayerId, at: Option<Instant>) {
        let Some(handle) = self.handle_of(player) else {
            return;
        };
        if let Some(seek) = self.shard(handle.category).lock().get_mut(handle.id) {
            seek.disconnected_at = at;
        }
    }

    /// Cancel seeks whose owner has been gone longer than the grace period.
    pub fn sweep(&self, now: Instant) -> Vec<Seek> {
        let grace = self.policy.disconnect_grace;
        let mut canceled = Vec::new();
        for category in TimeControlCategory::ALL {
            let mut shard = self.shard(category).lock();
            let expired =
                shard.take_where(|s| s.disconnected_at.is_some_and(|at| now.saturating_duration_since(at) >= grace));
            if expired.is_empty() {
                continue;
            }
            let mut owners = self.owners.lock();
            for mut seek in expired {
                owners.remove(&seek.seeker_id);
                seek.status = SeekStatus::Canceled;
                info!("Seek {} canceled after {} disconnected", seek.id, seek.seeker_id);
                canceled.push(seek);
            }
        }
        self.canceled_total.fetch_add(canceled.len() as u64, Ordering::Relaxed);
        canceled
    }

    /// Every open seek, oldest first.
    pub fn open_seeks(&self) -> Vec<Seek> {
        let mut all: Vec<Seek> = TimeControlCategory::ALL
            .iter()
            .flat_map(|c| self.shard(*c).lock().iter().cloned().collect::<Vec<_>>())
            .collect();
        all.sort_by_key(|s| s.fifo_key());
        all
    }

    pub fn stats(&self) -> SeekStats {
        SeekStats {
            open_by_category: TimeControlCategory::ALL
                .iter()
                .map(|c| (*c, self.shard(*c).lock().len()))
                .collect(),
            matched_total: self.matched_total.load(Ordering::Relaxed),
            canceled_total: self.canceled_total.load(Ordering::Relaxed),
        }
    }
}
