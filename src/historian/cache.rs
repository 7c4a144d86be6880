use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use time::OffsetDateTime;

use super::state::{PlaybackDirection, PlaybackState};
use crate::data::CacheEntry;
use crate::layout::normalize_cache_name;
use crate::persistence::{DataLoader, DataStorer};
use crate::Result;

static NAME_SEQ: AtomicU64 = AtomicU64::new(0);

/// `{product}_HistorianCache_{12 hex}`, unique per process and call.
pub fn generate_cache_name(product: &str) -> String {
    let seq = NAME_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut hasher = blake3::Hasher::new();
    hasher.update(&OffsetDateTime::now_utc().unix_timestamp_nanos().to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(&seq.to_le_bytes());
    let hash = hasher.finalize().to_hex();
    format!("{product}_HistorianCache_{}", &hash.as_str()[..12])
}

/// Ordered, append-only event list with a direction-aware read cursor.
///
/// `next()` first yields the entry under the cursor (after construction, a
/// rewind, a clear or `set_starting_index`) and steps from there on. Running
/// off either end wraps the cursor to 0 and yields `None` once.
pub struct HistorianCache {
    name: String,
    storage_file_name: Option<PathBuf>,
    entries: Vec<CacheEntry>,
    cursor: usize,
    current: Option<usize>,
    direction: PlaybackDirection,
    state: PlaybackState,
    approx_memory_usage: u64,
    new_entry_count: usize,
    loader: Option<Arc<dyn DataLoader>>,
    storer: Option<Arc<dyn DataStorer>>,
}

impl HistorianCache {
    pub fn new(name: &str) -> Result<Self> {
        let name = normalize_cache_name(name)?;
        Ok(Self {
            name,
            storage_file_name: None,
            entries: Vec::new(),
            cursor: 0,
            current: None,
            direction: PlaybackDirection::Forward,
            state: PlaybackState::Uninitialized,
            approx_memory_usage: 0,
            new_entry_count: 0,
            loader: None,
            storer: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_file_name(&self) -> Option<&Path> {
        self.storage_file_name.as_deref()
    }

    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_file_name.as_deref().and_then(Path::parent)
    }

    pub fn set_storage_file_name(&mut self, path: Option<PathBuf>) {
        self.storage_file_name = path;
    }

    pub fn set_loader(&mut self, loader: Option<Arc<dyn DataLoader>>) {
        self.loader = loader;
    }

    pub fn set_storer(&mut self, storer: Option<Arc<dyn DataStorer>>) {
        self.storer = storer;
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&CacheEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn direction(&self) -> PlaybackDirection {
        self.direction
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn set_state(&mut self, state: PlaybackState) {
        self.state = state;
    }

    pub fn approx_memory_usage(&self) -> u64 {
        self.approx_memory_usage
    }

    pub fn new_entry_count(&self) -> usize {
        self.new_entry_count
    }

    pub fn add(&mut self, entry: CacheEntry) {
        self.add_with(entry, true);
    }

    /// `count_as_new = false` for entries that already exist in the store.
    pub fn add_with(&mut self, entry: CacheEntry, count_as_new: bool) {
        self.approx_memory_usage += entry.approx_byte_count() as u64;
        self.entries.push(entry);
        if count_as_new {
            self.new_entry_count += 1;
        }
    }

    pub fn add_many(&mut self, entries: impl IntoIterator<Item = CacheEntry>) {
        self.add_many_with(entries, true);
    }

    pub fn add_many_with(&mut self, entries: impl IntoIterator<Item = CacheEntry>, count_as_new: bool) {
        for entry in entries {
            self.add_with(entry, count_as_new);
        }
    }

    /// Last entry returned by `next()`, if any since the last rewind.
    pub fn current_entry(&self) -> Option<&CacheEntry> {
        self.current.and_then(|index| self.entries.get(index))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn next(&mut self) -> Option<&CacheEntry> {
        match self.next_index() {
            Some(index) => {
                self.cursor = index;
                self.current = Some(index);
                self.entries.get(index)
            }
            None => {
                self.cursor = 0;
                self.current = None;
                None
            }
        }
    }

    pub fn peek_next(&self) -> Option<&CacheEntry> {
        self.next_index().and_then(|index| self.entries.get(index))
    }

    fn next_index(&self) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        if self.current.is_none() {
            return Some(self.cursor);
        }
        let next = self.cursor as isize + self.direction.step();
        if next < 0 || next as usize >= self.entries.len() {
            None
        } else {
            Some(next as usize)
        }
    }

    /// Changes the step for subsequent `next()` calls; the cursor stays put.
    pub fn set_direction(&mut self, direction: PlaybackDirection) {
        self.direction = direction;
    }

    pub fn set_starting_index(&mut self, index: usize) -> bool {
        if index >= self.entries.len() {
            debug!(
                "cache {}: starting index {index} out of range (len {})",
                self.name,
                self.entries.len()
            );
            return false;
        }
        self.cursor = index;
        self.current = None;
        true
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.current = None;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.current = None;
        self.approx_memory_usage = 0;
        self.new_entry_count = 0;
    }

    /// Replaces the in-memory entries with whatever the loader holds.
    ///
    /// A failed flush aborts before anything is dropped. A failed load leaves
    /// the cache empty. `Ok(false)` means the store had nothing for this name.
    pub fn load(&mut self, flush_first: bool) -> Result<bool> {
        if flush_first && !self.flush_pending()? {
            warn!("cache {}: unflushed entries and no storer, load skipped", self.name);
            return Ok(false);
        }
        let Some(loader) = self.loader.clone() else {
            warn!("cache {}: no loader configured", self.name);
            return Ok(false);
        };
        self.clear();
        let entries = loader.load_entries(&self.name)?;
        if entries.is_empty() {
            debug!("cache {}: nothing to load", self.name);
            return Ok(false);
        }
        self.add_many_with(entries, false);
        info!("cache {}: loaded {} entries", self.name, self.entries.len());
        Ok(true)
    }

    /// Writes the whole entry list. Only an empty cache is a no-op.
    pub fn store(&mut self) -> Result<bool> {
        if self.entries.is_empty() {
            return Ok(true);
        }
        let Some(storer) = self.storer.clone() else {
            debug!("cache {}: no storer configured", self.name);
            return Ok(false);
        };
        let written = storer.store_historian_cache(self)?;
        debug!(
            "cache {}: flushed {} new entries ({written} bytes)",
            self.name, self.new_entry_count
        );
        self.new_entry_count = 0;
        Ok(true)
    }

    /// Like [`store`](Self::store), but skips the write when nothing was
    /// added since the last successful store.
    pub(crate) fn flush_pending(&mut self) -> Result<bool> {
        if self.new_entry_count == 0 {
            return Ok(true);
        }
        self.store()
    }
}

impl fmt::Debug for HistorianCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistorianCache")
            .field("name", &self.name)
            .field("len", &self.entries.len())
            .field("cursor", &self.cursor)
            .field("current", &self.current)
            .field("direction", &self.direction)
            .field("state", &self.state)
            .field("approx_memory_usage", &self.approx_memory_usage)
            .field("new_entry_count", &self.new_entry_count)
            .finish_non_exhaustive()
    }
}
