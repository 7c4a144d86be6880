//! Digital-twin data historian.
//!
//! Captures time-stamped device events into named caches, persists them
//! through a pluggable connector, and replays them in original or reversed
//! order with the historical gaps (optionally scaled) preserved.

pub mod config;
pub mod data;
pub mod error;
pub mod historian;
pub mod layout;
pub mod listener;
pub mod persistence;

pub use config::{HistorianConfig, PlayerConfig};
pub use data::{CacheEntry, DataKind, Payload, Record, ResourceDescriptor, TimeRange};
pub use error::{Error, Result};
pub use historian::{
    HistorianCache, HistorianManager, HistorianPlayer, PlaybackDirection, PlaybackState,
};
pub use layout::PersistenceDataType;
pub use listener::{DataEventListener, LogStatusListener, StatusListener};
pub use persistence::{
    DataLoader, DataStorer, FilePersistenceConnector, PersistenceConnector, SerializerKind,
};
