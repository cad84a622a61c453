use actix::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{info, warn};
use serde::Deserialize;
use std::time::Instant;
use uuid::Uuid;

use crate::models::{AppState, ChessWebSocketMessage, ClientMessage, ServerMessage};
use crate::types::PlayerId;

/// WebSocket handler for chess games
pub struct ChessWebSocket {
    pub id: String,
    pub player_id: PlayerId,
    pub app_state: web::Data<AppState>,
}

impl Actor for ChessWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if self.app_state.is_connected(&self.player_id) {
            info!("Player {} opened another connection", self.player_id);
        }
        self.app_state
            .register_connection(self.id.clone(), self.player_id.clone(), ctx.address().recipient());
        self.app_state.seeks.mark_reconnected(&self.player_id);
        info!("WebSocket connection started: {} (player {})", self.id, self.player_id);

        // Reattach to games in progress, e.g. after a page reload.
        for game_id in self.app_state.games.games_of(&self.player_id) {
            self.app_state.subscribe(game_id, &self.id);
            self.send_game_state(game_id, ctx);
        }
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        let last = self.app_state.unregister_connection(&self.id, &self.player_id);
        if last {
            // Seeks survive a short disconnect; the housekeeper cancels them
            // once the grace period is over.
            self.app_state.seeks.mark_disconnected(&self.player_id, Instant::now());
        }
        info!("WebSocket connection closed: {}", self.id);
        Running::Stop
    }
}

impl Handler<ChessWebSocketMessage> for ChessWebSocket {
    type Result = ();

    fn handle(&mut self, msg: ChessWebSocketMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

// WebSocket message handler
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChessWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(text.as_ref()) {
                Ok(client_msg) => self.handle_message(client_msg, ctx),
                Err(e) => {
                    warn!("Error parsing client message from {}: {}", self.id, e);
                    self.send(&ServerMessage::error(format!("Invalid message format: {e}")), ctx);
                }
            },
            Ok(ws::Message::Binary(_)) => {
                warn!("Binary messages are not supported");
                self.send(&ServerMessage::error("Binary messages are not supported"), ctx);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Connection closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            _ => {
                ctx.stop();
            }
        }
    }
}

impl ChessWebSocket {
    /// Reply to this connection only.
    pub fn send(&self, message: &ServerMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(message) {
            Ok(text) => ctx.text(text),
            Err(e) => warn!("Error serializing message: {}", e),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub player: Option<String>,
}

/// WebSocket connection handler
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<ConnectQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let id = Uuid::new_v4().to_string();
    let player_id = match query.into_inner().player {
        Some(player) if !player.trim().is_empty() => PlayerId::new(player.trim()),
        _ => PlayerId::anonymous(),
    };
    info!("New WebSocket connection {} for player {}", id, player_id);

    let ws = ChessWebSocket {
        id,
        player_id,
        app_state: app_state.clone(),
    };

    ws::start(ws, &req, stream)
}
