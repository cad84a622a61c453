use actix::Actor;
use actix_web::{web, App, HttpServer};
use clap::Parser;
use log::info;
use std::sync::Arc;

use chess_clock_server::archive::LogRecorder;
use chess_clock_server::config::ServerConfig;
use chess_clock_server::lobby::InMemoryRatings;
use chess_clock_server::models::AppState;
use chess_clock_server::routes::configure_routes;
use chess_clock_server::websocket::Housekeeper;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServerConfig::parse();
    let bind = config.bind.clone();
    let static_dir = config.static_dir.clone();
    info!("Starting chess clock server at http://{}", bind);

    // Create shared application state
    let app_state = web::Data::new(AppState::new(
        config,
        Arc::new(InMemoryRatings::new()),
        Arc::new(LogRecorder),
    ));
    Housekeeper::new(app_state.clone()).start();

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(|cfg| configure_routes(cfg, &static_dir))
    })
    .bind(bind)?
    .run()
    .await
}
