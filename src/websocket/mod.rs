pub mod game_handlers;
pub mod handler;
pub mod housekeeping;

pub use handler::{ws_index, ChessWebSocket};
pub use housekeeping::Housekeeper;
