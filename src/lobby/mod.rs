//! Open seeks and how they are paired into games.

pub mod policy;
pub mod rating;
pub mod registry;
pub mod seek;

pub use policy::{LobbyPolicy, Seating};
pub use rating::{InMemoryRatings, Rating, RatingProvider};
pub use registry::{MatchSeekRegistry, Pairing, SeekStats};
pub use seek::{ColorPreference, Seek, SeekHandle, SeekPool, SeekRequest, SeekStatus};
