use actix::Recipient;
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::archive::{record_with_retry, FinishedGame, GameRecorder};
use crate::config::ServerConfig;
use crate::game::GameRegistry;
use crate::lobby::{MatchSeekRegistry, Pairing, RatingProvider};
use crate::models::messages::{ChessWebSocketMessage, ServerMessage};
use crate::types::{GameId, PlayerId};

pub type ConnectionId = String;

/// Application state shared between connections
pub struct AppState {
    pub config: ServerConfig,
    pub games: GameRegistry,
    pub seeks: MatchSeekRegistry,
    pub recorder: Arc<dyn GameRecorder>,
    /// Connections subscribed to each game: both players and spectators.
    pub connections: Mutex<HashMap<GameId, Vec<ConnectionId>>>,
    pub sessions: Mutex<HashMap<ConnectionId, Recipient<ChessWebSocketMessage>>>,
    /// A player may be connected from several tabs.
    pub players: Mutex<HashMap<PlayerId, Vec<ConnectionId>>>,
}

impl AppState {
    pub fn new(config: ServerConfig, ratings: Arc<dyn RatingProvider>, recorder: Arc<dyn GameRecorder>) -> Self {
        let seeks = MatchSeekRegistry::new(config.lobby_policy(), ratings, config.rng_seed);
        AppState {
            config,
            games: GameRegistry::new(),
            seeks,
            recorder,
            connections: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            players: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_connection(&self, id: ConnectionId, player: PlayerId, recipient: Recipient<ChessWebSocketMessage>) {
        self.sessions.lock().insert(id.clone(), recipient);
        self.players.lock().entry(player).or_default().push(id);
    }

    /// Forget a connection. Returns `true` when it was the player's last one.
    pub fn unregister_connection(&self, id: &str, player: &PlayerId) -> bool {
        self.sessions.lock().remove(id);
        for subscribers in self.connections.lock().values_mut() {
            subscribers.retain(|c| c != id);
        }

        let mut players = self.players.lock();
        let Some(ids) = players.get_mut(player) else {
            return true;
        };
        ids.retain(|c| c != id);
        if ids.is_empty() {
            players.remove(player);
            true
        } else {
            false
        }
    }

    pub fn is_connected(&self, player: &PlayerId) -> bool {
        self.players.lock().contains_key(player)
    }

    pub fn subscribe(&self, game_id: GameId, connection: &str) {
        let mut connections = self.connections.lock();
        let subscribers = connections.entry(game_id).or_default();
        if !subscribers.iter().any(|c| c == connection) {
            subscribers.push(connection.to_string());
        }
    }

    fn subscribe_player(&self, game_id: GameId, player: &PlayerId) {
        let ids = self.players.lock().get(player).cloned().unwrap_or_default();
        for id in ids {
            self.subscribe(game_id, &id);
        }
    }

    fn deliver(&self, connection_ids: &[ConnectionId], message: &ServerMessage) {
        let message_str = match serde_json::to_string(message) {
            Ok(s) => s,
            Err(e) => {
                warn!("Error serializing message: {}", e);
                return;
            }
        };

        // Copy the recipients out so no lock is held while sending.
        let recipients: Vec<Recipient<ChessWebSocketMessage>> = {
            let sessions = self.sessions.lock();
            connection_ids.iter().filter_map(|id| sessions.get(id).cloned()).collect()
        };
        for recipient in recipients {
            recipient.do_send(ChessWebSocketMessage(message_str.clone()));
        }
    }

    pub fn broadcast_to_game(&self, game_id: GameId, message: &ServerMessage) {
        let connection_ids = match self.connections.lock().get(&game_id) {
            Some(ids) => ids.clone(),
            None => {
                warn!("No connections found for game {}", game_id);
                return;
            }
        };
        self.deliver(&connection_ids, message);
    }

    pub fn send_to_player(&self, player: &PlayerId, message: &ServerMessage) {
        let connection_ids = self.players.lock().get(player).cloned().unwrap_or_default();
        self.deliver(&connection_ids, message);
    }

    /// Register the game created by a match and tell both players about it.
    pub fn start_game(&self, pairing: Pairing) {
        let session = pairing.session;
        let game_id = session.id();
        let white = session.white().clone();
        let black = session.black().clone();
        let notification = ServerMessage::MatchFound {
            game_session_id: game_id,
            white_id: white.clone(),
            black_id: black.clone(),
            initial_time_ms: session.time_control().initial_ms,
            increment_ms: session.time_control().increment_ms,
            category: session.category(),
            rated: session.rated(),
        };
        let clock = session.clock().snapshot();
        self.games.insert(session);

        self.subscribe_player(game_id, &white);
        self.subscribe_player(game_id, &black);
        info!("Game {} started: {} (white) vs {} (black)", game_id, white, black);
        self.broadcast_to_game(game_id, &notification);
        self.broadcast_to_game(game_id, &ServerMessage::clock_update(game_id, clock));
    }

    /// Drop a finished game from the live set and hand it to the recorder in
    /// the background.
    pub fn finish_game(&self, game_id: GameId) {
        let Some(shared) = self.games.retire(&game_id, Instant::now()) else {
            return;
        };
        let finished = FinishedGame::from_session(&shared.lock());
        self.connections.lock().remove(&game_id);

        let Some(finished) = finished else {
            warn!("Game {} removed before it finished", game_id);
            return;
        };
        let recorder = self.recorder.clone();
        let policy = self.config.retry_policy();
        actix_rt::spawn(async move {
            let _ = record_with_retry(recorder.as_ref(), &finished, policy).await;
        });
    }
}
