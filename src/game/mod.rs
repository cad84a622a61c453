pub mod registry;
pub mod rules;
pub mod session;

pub use registry::{GameRegistry, IdleTimeout, SharedSession};
pub use rules::{GameOutcome, Termination};
pub use session::{DrawOffer, GameSession, MoveOutcome, MoveRecord};
