//! Historian configuration.
//!
//! Defines storage location, serializer, registry limits and per-player
//! playback defaults. Loaded from and saved to JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::persistence::SerializerKind;
use crate::Result;

pub const DEFAULT_PRODUCT_NAME: &str = "PDT";
pub const DEFAULT_ROOT_PATH: &str = "/tmp";
pub const DEFAULT_DELAY_FACTOR: f64 = 1.0;

/// Delay factors must be finite and strictly positive.
pub fn is_valid_delay_factor(factor: f64) -> bool {
    factor.is_finite() && factor > 0.0
}

/// Configuration for a historian manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorianConfig {
    /// Storage root; must be an existing directory.
    /// Default: /tmp
    pub root_path: PathBuf,

    /// Directory name under the root.
    /// Default: PDT
    pub product_name: String,

    /// Cache file encoding.
    /// Default: json
    pub serializer: SerializerKind,

    /// Maximum number of open caches.
    /// Default: 10
    pub max_cache_count: usize,

    /// Reported only, not enforced.
    /// Default: 512 MB
    pub max_cache_size_bytes: u64,

    pub player: PlayerConfig,
}

impl Default for HistorianConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from(DEFAULT_ROOT_PATH),
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            serializer: SerializerKind::Json,
            max_cache_count: 10,
            max_cache_size_bytes: 512 * 1024 * 1024, // 512 MB
            player: PlayerConfig::default(),
        }
    }
}

impl HistorianConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let mut config: Self = serde_json::from_slice(&data)?;
        config.player = config.player.validated();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}

/// Playback defaults applied to every new player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Drive playback from a background thread.
    /// Default: false
    pub threaded_playback: bool,

    /// Rewind instead of stopping at the end of the cache.
    /// Default: false
    pub loop_at_end: bool,

    /// Drop connection-state and message events on ingest.
    /// Default: false
    pub cache_only_data_events: bool,

    /// Multiplier on historical gaps; must be > 0.
    /// Default: 1.0
    pub delay_factor: f64,

    /// Flush after this many unflushed entries; 0 disables.
    /// Default: 500
    pub flush_threshold: usize,

    /// Playback thread poll interval while not playing.
    /// Default: 1000 ms
    pub idle_poll_ms: u64,

    /// Bound on joining the playback thread at stop.
    /// Default: 500 ms
    pub max_join_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            threaded_playback: false,
            loop_at_end: false,
            cache_only_data_events: false,
            delay_factor: DEFAULT_DELAY_FACTOR,
            flush_threshold: 500,
            idle_poll_ms: 1000,
            max_join_ms: 500,
        }
    }
}

impl PlayerConfig {
    /// Falls back to the default delay factor when the configured one is
    /// not finite and positive.
    pub fn validated(mut self) -> Self {
        if !is_valid_delay_factor(self.delay_factor) {
            warn!(
                "invalid playback delay factor {}, using {DEFAULT_DELAY_FACTOR}",
                self.delay_factor
            );
            self.delay_factor = DEFAULT_DELAY_FACTOR;
        }
        self
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn max_join(&self) -> Duration {
        Duration::from_millis(self.max_join_ms)
    }
}
