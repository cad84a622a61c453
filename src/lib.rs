//! Real-time chess server: server-authoritative clocks, time-control
//! classification, seek matching and game sessions over WebSockets.

pub mod archive;
pub mod clock;
pub mod config;
pub mod error;
pub mod game;
pub mod lobby;
pub mod models;
pub mod routes;
pub mod time_control;
pub mod types;
pub mod websocket;

pub use error::{ChessError, Result};
