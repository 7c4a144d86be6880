//! Cache, playback and registry.

mod cache;
mod manager;
mod player;
mod state;

pub use cache::{generate_cache_name, HistorianCache};
pub use manager::HistorianManager;
pub use player::HistorianPlayer;
pub use state::{PlaybackDirection, PlaybackState};
