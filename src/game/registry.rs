use log::info;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::ClockSnapshot;
use crate::error::{ChessError, Result};
use crate::game::rules::{color_to_string, GameOutcome};
use crate::game::session::{DrawOffer, GameSession, MoveOutcome};
use crate::types::{GameId, PlayerId};

pub type SharedSession = Arc<Mutex<GameSession>>;

/// A game that ran out of time without anyone moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleTimeout {
    pub game_id: GameId,
    pub outcome: GameOutcome,
    pub clock: ClockSnapshot,
}

/// All live sessions, plus the ids of recently finished ones.
///
/// The map lock is only held to look a session up; all game work happens
/// under that session's own mutex, so different games never wait on each
/// other. When both maps are locked, `games` comes first.
#[derive(Default)]
pub struct GameRegistry {
    games: RwLock<HashMap<GameId, SharedSession>>,
    /// Finished games and when they left the live set. Late requests for
    /// them are stale, not unknown.
    retired: Mutex<HashMap<GameId, Instant>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: GameSession) -> SharedSession {
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));
        self.games.write().insert(id, shared.clone());
        shared
    }

    pub fn get(&self, id: &GameId) -> Result<SharedSession> {
        if let Some(shared) = self.games.read().get(id) {
            return Ok(shared.clone());
        }
        if self.retired.lock().contains_key(id) {
            return Err(ChessError::StaleOrInvalidMove("game is already over"));
        }
        Err(ChessError::GameNotFound)
    }

    /// Take a finished game out of the live set, remembering its id.
    pub fn retire(&self, id: &GameId, now: Instant) -> Option<SharedSession> {
        let mut games = self.games.write();
        let shared = games.remove(id)?;
        self.retired.lock().insert(*id, now);
        Some(shared)
    }

    /// Forget finished games retired more than `retention` ago.
    pub fn prune_retired(&self, now: Instant, retention: Duration) -> usize {
        let mut retired = self.retired.lock();
        let before = retired.len();
        retired.retain(|_, at| now.saturating_duration_since(*at) < retention);
        before - retired.len()
    }

    pub fn len(&self) -> usize {
        self.games.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Play a move on behalf of `player`.
    pub fn submit_move(&self, id: &GameId, player: &PlayerId, uci: &str, received_at: Instant) -> Result<MoveOutcome> {
        let shared = self.get(id)?;
        let mut session = shared.lock();
        let color = session.color_of(player).ok_or(ChessError::NotAPlayer)?;
        session.submit_move(color, uci, received_at)
    }

    pub fn resign(&self, id: &GameId, player: &PlayerId, now: Instant) -> Result<GameOutcome> {
        let shared = self.get(id)?;
        let mut session = shared.lock();
        let color = session.color_of(player).ok_or(ChessError::NotAPlayer)?;
        session.resign(color, now)
    }

    pub fn offer_draw(&self, id: &GameId, player: &PlayerId, now: Instant) -> Result<DrawOffer> {
        let shared = self.get(id)?;
        let mut session = shared.lock();
        let color = session.color_of(player).ok_or(ChessError::NotAPlayer)?;
        session.offer_draw(color, now)
    }

    /// Flag every live game whose side to move has run out of time.
    pub fn flag_expired(&self, now: Instant) -> Vec<IdleTimeout> {
        let sessions: Vec<SharedSession> = self.games.read().values().cloned().collect();

        let mut flagged = Vec::new();
        for shared in sessions {
            let mut session = shared.lock();
            if let Some((outcome, clock)) = session.flag_if_expired(now) {
                info!("Game {} flagged, {} to move ran out of time", session.id(), color_to_string(session.side_to_move()));
                flagged.push(IdleTimeout { game_id: session.id(), outcome, clock });
            }
        }
        flagged
    }

    /// Ids of every game `player` is seated in.
    pub fn games_of(&self, player: &PlayerId) -> Vec<GameId> {
        self.games
            .read()
            .iter()
            .filter(|(_, shared)| shared.lock().color_of(player).is_some())
            .map(|(id, _)| *id)
            .collect()
    }
}
