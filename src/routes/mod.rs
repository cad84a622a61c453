use actix_files as fs;
use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::lobby::SeekStats;
use crate::models::AppState;

pub async fn index() -> impl Responder {
    HttpResponse::Ok().body("Chess Clock Server")
}

#[derive(Debug, Serialize)]
pub struct ServerStats {
    pub live_games: usize,
    pub seeks: SeekStats,
}

/// Lobby counters and the number of games in progress.
pub async fn stats(app_state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(ServerStats {
        live_games: app_state.games.len(),
        seeks: app_state.seeks.stats(),
    })
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: &str) {
    cfg.service(web::resource("/ws").route(web::get().to(crate::websocket::ws_index)))
        .service(web::resource("/stats").route(web::get().to(stats)))
        .service(web::resource("/").route(web::get().to(index)))
        .service(fs::Files::new("/static", static_dir));
}
