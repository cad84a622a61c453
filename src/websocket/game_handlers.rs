use actix_web_actors::ws;
use chess::Color;
use log::{debug, info, warn};
use std::time::Instant;

use crate::error::{ChessError, Result};
use crate::game::rules::color_to_string;
use crate::game::{DrawOffer, MoveOutcome};
use crate::lobby::SeekRequest;
use crate::models::messages::{ClientMessage, SeekView, ServerMessage};
use crate::models::AppState;
use crate::time_control::TimeControl;
use crate::types::{GameId, PlayerId, SeekId};
use crate::websocket::handler::ChessWebSocket;

impl ChessWebSocket {
    pub fn handle_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        for reply in dispatch(&self.app_state, &self.id, &self.player_id, msg) {
            self.send(&reply, ctx);
        }
    }

    /// Send the current position and live clock of a game to this connection.
    pub fn send_game_state(&self, game_id: GameId, ctx: &mut ws::WebsocketContext<Self>) {
        let reply = match game_state(&self.app_state, game_id, Instant::now()) {
            Ok(state) => state,
            Err(e) => ServerMessage::error(e),
        };
        self.send(&reply, ctx);
    }
}

/// Act on one message from `player`, received on `connection`.
///
/// Everything other subscribers need to see is broadcast from here; the
/// returned messages go back to the sender alone.
pub fn dispatch(state: &AppState, connection: &str, player: &PlayerId, msg: ClientMessage) -> Vec<ServerMessage> {
    match msg {
        ClientMessage::Move { game_id, uci, client_timestamp } => {
            // Stamp on receipt; the client's own clock is never trusted.
            let received_at = Instant::now();
            if let Some(ts) = client_timestamp {
                debug!("Move {} in game {} carries client timestamp {}", uci, game_id, ts);
            }
            play_move(state, player, game_id, &uci, received_at)
        }
        ClientMessage::Seek {
            initial_time_ms,
            increment_ms,
            rated,
            color_preference,
            rating_range_min,
            rating_range_max,
            pool,
        } => {
            let time_control = TimeControl { initial_ms: initial_time_ms, increment_ms };
            let request = SeekRequest {
                rated,
                color_preference,
                rating_range_min,
                rating_range_max,
                pool,
                ..SeekRequest::new(player.clone(), time_control)
            };
            vec![seek(state, request, Instant::now())]
        }
        ClientMessage::CancelSeek { seek_id } => vec![cancel_seek(state, player, seek_id)],
        ClientMessage::Resign { game_id } => resign(state, player, game_id, Instant::now()),
        ClientMessage::OfferDraw { game_id } => offer_draw(state, player, game_id, Instant::now()),
        ClientMessage::Watch { game_id } => vec![watch(state, connection, game_id)],
        ClientMessage::ListSeeks => {
            let seeks = state.seeks.open_seeks().iter().map(SeekView::from).collect();
            vec![ServerMessage::SeekList { seeks }]
        }
    }
}

fn seek(state: &AppState, request: SeekRequest, now: Instant) -> ServerMessage {
    let player = request.seeker_id.clone();
    let time_control = request.time_control;
    let handle = match state.seeks.submit_seek(request, now) {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Seek from {} rejected: {}", player, e);
            return ServerMessage::error(e);
        }
    };
    info!("Player {} seeks {} ({})", player, time_control, handle.category);

    match state.seeks.try_match(handle, now) {
        Ok(Some(pairing)) => state.start_game(pairing),
        Ok(None) => debug!("Seek {} is waiting for an opponent", handle.id),
        // The housekeeper paired it first; that game is already announced.
        Err(ChessError::SeekAlreadyConsumed) => debug!("Seek {} was consumed concurrently", handle.id),
        Err(e) => warn!("Matching seek {} failed: {}", handle.id, e),
    }
    ServerMessage::SeekAccepted { seek_id: handle.id, category: handle.category }
}

fn cancel_seek(state: &AppState, player: &PlayerId, seek_id: SeekId) -> ServerMessage {
    let handle = match state.seeks.handle_of(player) {
        Some(handle) if handle.id == seek_id => handle,
        _ => {
            warn!("Player {} cannot cancel seek {}", player, seek_id);
            return ServerMessage::error(ChessError::SeekAlreadyConsumed);
        }
    };
    match state.seeks.cancel(handle) {
        Ok(seek) => {
            info!("Player {} canceled seek {}", player, seek.id);
            ServerMessage::SeekCanceled { seek_id: seek.id }
        }
        Err(e) => ServerMessage::error(e),
    }
}

pub(crate) fn play_move(
    state: &AppState,
    player: &PlayerId,
    game_id: GameId,
    uci: &str,
    received_at: Instant,
) -> Vec<ServerMessage> {
    let outcome = match state.games.submit_move(&game_id, player, uci, received_at) {
        Ok(outcome) => outcome,
        Err(e) => {
            info!("Move {} in game {} rejected: {}", uci, game_id, e);
            return vec![ServerMessage::MoveRejected { game_id, reason: e.to_string() }];
        }
    };

    match outcome {
        MoveOutcome::Accepted { record, fen, clock, finished } => {
            state.broadcast_to_game(game_id, &ServerMessage::MoveMade { game_id, uci: record.uci, fen, ply: record.ply });
            state.broadcast_to_game(game_id, &ServerMessage::clock_update(game_id, clock));
            if let Some(outcome) = finished {
                info!("Game {} over: {:?}", game_id, outcome.reason);
                state.broadcast_to_game(game_id, &ServerMessage::game_over(game_id, outcome));
                state.finish_game(game_id);
            }
        }
        MoveOutcome::TimedOut { loser, clock, outcome } => {
            info!("Game {}: {} lost on time", game_id, color_to_string(loser));
            state.broadcast_to_game(game_id, &ServerMessage::clock_update(game_id, clock));
            state.broadcast_to_game(game_id, &ServerMessage::game_over(game_id, outcome));
            state.finish_game(game_id);
        }
    }
    Vec::new()
}

fn resign(state: &AppState, player: &PlayerId, game_id: GameId, now: Instant) -> Vec<ServerMessage> {
    match state.games.resign(&game_id, player, now) {
        Ok(outcome) => {
            info!("Player {} resigned game {}", player, game_id);
            broadcast_final_clock(state, game_id);
            state.broadcast_to_game(game_id, &ServerMessage::game_over(game_id, outcome));
            state.finish_game(game_id);
            Vec::new()
        }
        Err(e) => vec![ServerMessage::error(e)],
    }
}

fn offer_draw(state: &AppState, player: &PlayerId, game_id: GameId, now: Instant) -> Vec<ServerMessage> {
    match state.games.offer_draw(&game_id, player, now) {
        Ok(DrawOffer::Offered(color)) => {
            state.broadcast_to_game(game_id, &ServerMessage::DrawOffered { game_id, by: color_to_string(color) });
        }
        Ok(DrawOffer::Agreed(outcome)) => {
            info!("Game {} drawn by agreement", game_id);
            broadcast_final_clock(state, game_id);
            state.broadcast_to_game(game_id, &ServerMessage::game_over(game_id, outcome));
            state.finish_game(game_id);
        }
        Err(e) => return vec![ServerMessage::error(e)],
    }
    Vec::new()
}

fn watch(state: &AppState, connection: &str, game_id: GameId) -> ServerMessage {
    match game_state(state, game_id, Instant::now()) {
        Ok(message) => {
            state.subscribe(game_id, connection);
            message
        }
        Err(e) => ServerMessage::error(e),
    }
}

/// Position and live clock of a game.
pub fn game_state(state: &AppState, game_id: GameId, now: Instant) -> Result<ServerMessage> {
    let shared = state.games.get(&game_id)?;
    let session = shared.lock();
    let to_move = session.side_to_move();
    Ok(ServerMessage::GameState {
        game_id,
        fen: session.fen(),
        white_id: session.white().clone(),
        black_id: session.black().clone(),
        white_remaining_ms: session.clock().remaining_at(Color::White, to_move, now),
        black_remaining_ms: session.clock().remaining_at(Color::Black, to_move, now),
        side_to_move: color_to_string(to_move),
    })
}

fn broadcast_final_clock(state: &AppState, game_id: GameId) {
    if let Ok(shared) = state.games.get(&game_id) {
        let clock = shared.lock().clock().snapshot();
        state.broadcast_to_game(game_id, &ServerMessage::clock_update(game_id, clock));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::LogRecorder;
    use crate::config::ServerConfig;
    use crate::lobby::{ColorPreference, InMemoryRatings, SeekPool};
    use crate::models::ChessWebSocketMessage;
    use actix::{Actor, Context, Handler};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    type Inbox = Arc<Mutex<Vec<Value>>>;

    struct Collector(Inbox);

    impl Actor for Collector {
        type Context = Context<Self>;
    }

    impl Handler<ChessWebSocketMessage> for Collector {
        type Result = ();

        fn handle(&mut self, msg: ChessWebSocketMessage, _: &mut Self::Context) {
            self.0.lock().push(serde_json::from_str(&msg.0).unwrap());
        }
    }

    fn state() -> AppState {
        AppState::new(ServerConfig::default(), Arc::new(InMemoryRatings::new()), Arc::new(LogRecorder))
    }

    fn connect(state: &AppState, player: &str) -> Inbox {
        let inbox = Inbox::default();
        let addr = Collector(inbox.clone()).start();
        state.register_connection(format!("{player}-conn"), PlayerId::new(player), addr.recipient());
        inbox
    }

    fn seek_msg(initial_time_ms: i64) -> ClientMessage {
        ClientMessage::Seek {
            initial_time_ms,
            increment_ms: 0,
            rated: false,
            color_preference: ColorPreference::Random,
            rating_range_min: None,
            rating_range_max: None,
            pool: SeekPool::Quick,
        }
    }

    fn types(inbox: &Inbox) -> Vec<String> {
        inbox.lock().iter().map(|v| v["message_type"].as_str().unwrap_or_default().to_string()).collect()
    }

    fn message_type(message: &ServerMessage) -> String {
        serde_json::to_value(message).unwrap()["message_type"].as_str().unwrap().to_string()
    }

    async fn settle() {
        actix_rt::time::sleep(Duration::from_millis(20)).await;
    }

    /// Seat alice and bob in a one-minute game. Returns the game and who is white.
    fn matched_game(state: &AppState) -> (GameId, PlayerId, PlayerId) {
        let alice = PlayerId::new("alice");
        let bob = PlayerId::new("bob");
        let replies = dispatch(state, "alice-conn", &alice, seek_msg(60_000));
        assert_eq!(message_type(&replies[0]), "seek_accepted");
        let replies = dispatch(state, "bob-conn", &bob, seek_msg(60_000));
        assert_eq!(message_type(&replies[0]), "seek_accepted");

        let game_id = state.games.games_of(&alice)[0];
        let shared = state.games.get(&game_id).unwrap();
        let session = shared.lock();
        (game_id, session.white().clone(), session.black().clone())
    }

    #[test]
    fn test_match_is_announced_to_both_players() {
        actix::System::new().block_on(async {
            let state = state();
            let alice = connect(&state, "alice");
            let bob = connect(&state, "bob");
            matched_game(&state);
            settle().await;

            assert_eq!(types(&alice), ["match_found", "clock_update"]);
            assert_eq!(types(&bob), ["match_found", "clock_update"]);
        });
    }

    #[test]
    fn test_timeout_reaches_both_players() {
        actix::System::new().block_on(async {
            let state = state();
            let alice = connect(&state, "alice");
            let bob = connect(&state, "bob");
            let (game_id, white, black) = matched_game(&state);
            let started = Instant::now();

            let replies = play_move(&state, &white, game_id, "e2e4", started + Duration::from_secs(61));
            assert!(replies.is_empty());
            settle().await;

            for inbox in [&alice, &bob] {
                assert_eq!(types(inbox)[2..], ["clock_update", "game_over"]);
                let game_over = inbox.lock()[3].clone();
                assert_eq!(game_over["reason"], "timeout");
                assert_eq!(game_over["winner"], "black");
            }
            assert!(state.games.is_empty());

            // The game is over; a late move is stale, not unknown.
            let replies = play_move(&state, &black, game_id, "e7e5", started + Duration::from_secs(62));
            match &replies[..] {
                [ServerMessage::MoveRejected { reason, .. }] => assert!(reason.starts_with("stale or invalid move")),
                other => panic!("expected a rejection, got {other:?}"),
            }
        });
    }

    #[test]
    fn test_rejected_move_goes_to_sender_only() {
        actix::System::new().block_on(async {
            let state = state();
            let alice = connect(&state, "alice");
            let bob = connect(&state, "bob");
            let (game_id, _, black) = matched_game(&state);
            settle().await;

            let replies = play_move(&state, &black, game_id, "e7e5", Instant::now());
            assert!(matches!(&replies[..], [ServerMessage::MoveRejected { .. }]));
            let replies = dispatch(
                &state,
                "carol-conn",
                &PlayerId::new("carol"),
                ClientMessage::Move { game_id, uci: "e2e4".into(), client_timestamp: None },
            );
            assert!(matches!(&replies[..], [ServerMessage::MoveRejected { .. }]));
            settle().await;

            assert_eq!(types(&alice).len(), 2);
            assert_eq!(types(&bob).len(), 2);
        });
    }

    #[test]
    fn test_cancel_seek_checks_ownership() {
        actix::System::new().block_on(async {
            let state = state();
            let alice = PlayerId::new("alice");
            let seek_id = match &dispatch(&state, "alice-conn", &alice, seek_msg(300_000))[..] {
                [ServerMessage::SeekAccepted { seek_id, .. }] => *seek_id,
                other => panic!("expected acceptance, got {other:?}"),
            };

            let replies = dispatch(&state, "bob-conn", &PlayerId::new("bob"), ClientMessage::CancelSeek { seek_id });
            assert_eq!(message_type(&replies[0]), "error");
            assert_eq!(state.seeks.open_seeks().len(), 1);

            let replies = dispatch(&state, "alice-conn", &alice, ClientMessage::CancelSeek { seek_id });
            assert_eq!(replies, [ServerMessage::SeekCanceled { seek_id }]);
            assert!(state.seeks.open_seeks().is_empty());
        });
    }

    #[test]
    fn test_watch_subscribes_spectator() {
        actix::System::new().block_on(async {
            let state = state();
            connect(&state, "alice");
            connect(&state, "bob");
            let carol = connect(&state, "carol");
            let (game_id, white, _) = matched_game(&state);

            let replies = dispatch(&state, "carol-conn", &PlayerId::new("carol"), ClientMessage::Watch { game_id });
            assert_eq!(message_type(&replies[0]), "game_state");

            play_move(&state, &white, game_id, "e2e4", Instant::now());
            settle().await;
            assert_eq!(types(&carol), ["move_made", "clock_update"]);

            let unknown = dispatch(&state, "carol-conn", &PlayerId::new("carol"), ClientMessage::Watch { game_id: GameId::new() });
            assert_eq!(message_type(&unknown[0]), "error");
        });
    }
}
