use std::path::PathBuf;

use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid cache name: {0:?}")]
    InvalidCacheName(String),
    #[error("invalid path component for {field}: {value:?}")]
    InvalidComponent { field: &'static str, value: String },
    #[error("invalid root path: {}", .0.display())]
    InvalidRootPath(PathBuf),
    #[error("invalid time range: end {end} precedes start {start}")]
    InvalidTimeRange {
        start: OffsetDateTime,
        end: OffsetDateTime,
    },
    #[error("historian registry full ({0} caches)")]
    RegistryFull(usize),
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
