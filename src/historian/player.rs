use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use log::{debug, error, info, warn};

use super::cache::HistorianCache;
use super::state::{PlaybackDirection, PlaybackState};
use crate::config::{is_valid_delay_factor, PlayerConfig};
use crate::data::{
    ActuatorData, CacheEntry, ConnectionStateData, MessageData, Payload, SensorData,
    SystemPerformanceData,
};
use crate::layout::PersistenceDataType;
use crate::listener::DataEventListener;
use crate::persistence::{DataLoader, DataStorer, PersistenceConnector};
use crate::Result;

/// Plays one [`HistorianCache`] back to a [`DataEventListener`], and fills it
/// from live events while not playing.
///
/// Playback is driven either by the caller through
/// [`trigger_next_event`](Self::trigger_next_event) or by a background thread
/// (`threaded_playback`). Both use the same stepping: the wait before an entry
/// is the gap to the previous entry scaled by the delay factor.
pub struct HistorianPlayer {
    shared: Arc<Shared>,
    worker: Mutex<Option<PlaybackWorker>>,
}

struct Shared {
    name: String,
    inner: Mutex<Inner>,
    signal: Condvar,
    listener: RwLock<Option<Arc<dyn DataEventListener>>>,
}

struct Inner {
    cache: HistorianCache,
    display_name: String,
    config: PlayerConfig,
    cache_filling_enabled: bool,
    playback_enabled: bool,
    playback_mode_active: bool,
    needs_cache_load: bool,
    worker_active: bool,
    epoch: u64,
}

struct PlaybackWorker {
    thread_id: ThreadId,
    handle: JoinHandle<()>,
    exited: Receiver<()>,
}

enum Step {
    Emit { entry: CacheEntry, delay_ms: u64 },
    Rewound,
    Exhausted,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, entry: &CacheEntry) {
        let listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            entry.dispatch(listener.as_ref());
        }
    }
}

fn scaled_delay(gap_ms: u64, factor: f64) -> u64 {
    (gap_ms as f64 * factor).round() as u64
}

impl Inner {
    /// Wait owed before the entry `advance` would emit next.
    fn pending_delay(&self) -> u64 {
        match (self.cache.current_entry(), self.cache.peek_next()) {
            (Some(current), Some(next)) => {
                scaled_delay(current.delta_millis(next), self.config.delay_factor)
            }
            _ => 0,
        }
    }

    fn advance(&mut self) -> Step {
        let previous = self.cache.current_entry().cloned();
        let next = self.cache.next().cloned();
        match next {
            Some(entry) => {
                let delay_ms = previous
                    .map(|prev| scaled_delay(prev.delta_millis(&entry), self.config.delay_factor))
                    .unwrap_or(0);
                Step::Emit { entry, delay_ms }
            }
            None if self.config.loop_at_end && !self.cache.is_empty() => {
                self.cache.reset();
                Step::Rewound
            }
            None => Step::Exhausted,
        }
    }

    fn flush(&mut self) {
        if let Err(err) = self.cache.flush_pending() {
            warn!("player {}: flush failed: {err}", self.cache.name());
        }
    }
}

impl HistorianPlayer {
    pub fn new(name: &str, config: PlayerConfig) -> Result<Self> {
        Ok(Self::from_cache(HistorianCache::new(name)?, config))
    }

    pub fn from_cache(cache: HistorianCache, config: PlayerConfig) -> Self {
        let name = cache.name().to_string();
        let inner = Inner {
            cache,
            display_name: name.clone(),
            config: config.validated(),
            cache_filling_enabled: false,
            playback_enabled: true,
            playback_mode_active: false,
            needs_cache_load: true,
            worker_active: false,
            epoch: 0,
        };
        Self {
            shared: Arc::new(Shared {
                name,
                inner: Mutex::new(inner),
                signal: Condvar::new(),
                listener: RwLock::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Cache name; doubles as the player's registry key.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn display_name(&self) -> String {
        self.shared.lock().display_name.clone()
    }

    pub fn set_display_name(&self, display_name: impl Into<String>) {
        self.shared.lock().display_name = display_name.into();
    }

    pub fn set_event_listener(&self, listener: Option<Arc<dyn DataEventListener>>) {
        *self
            .shared
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = listener;
    }

    pub fn set_loader(&self, loader: Option<Arc<dyn DataLoader>>) {
        self.shared.lock().cache.set_loader(loader);
    }

    pub fn set_storer(&self, storer: Option<Arc<dyn DataStorer>>) {
        self.shared.lock().cache.set_storer(storer);
    }

    /// Uses `connector` as both loader and storer and re-resolves the cache
    /// file location. In-memory entries are left alone.
    pub fn set_connector(&self, connector: &Arc<dyn PersistenceConnector>) {
        let mut inner = self.shared.lock();
        let resolved = connector.resolve_storage_name(&self.shared.name, PersistenceDataType::Historian);
        match resolved {
            Ok(path) => inner.cache.set_storage_file_name(Some(path)),
            Err(err) => {
                warn!("player {}: cannot resolve storage: {err}", self.shared.name);
                inner.cache.set_storage_file_name(None);
            }
        }
        inner.cache.set_loader(Some(Arc::clone(connector).into_loader()));
        inner.cache.set_storer(Some(Arc::clone(connector).into_storer()));
    }

    pub fn storage_file_name(&self) -> Option<PathBuf> {
        self.shared
            .lock()
            .cache
            .storage_file_name()
            .map(|path| path.to_path_buf())
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.shared.lock().cache.state()
    }

    pub fn is_playing(&self) -> bool {
        self.playback_state() == PlaybackState::Play
    }

    pub fn direction(&self) -> PlaybackDirection {
        self.shared.lock().cache.direction()
    }

    pub fn set_direction(&self, direction: PlaybackDirection) {
        self.shared.lock().cache.set_direction(direction);
    }

    pub fn playback_delay_factor(&self) -> f64 {
        self.shared.lock().config.delay_factor
    }

    /// Accepts only finite factors above zero; anything else keeps the
    /// current factor and returns `false`.
    pub fn set_playback_delay_factor(&self, factor: f64) -> bool {
        if !is_valid_delay_factor(factor) {
            warn!(
                "player {}: ignoring playback delay factor {factor}",
                self.shared.name
            );
            return false;
        }
        self.shared.lock().config.delay_factor = factor;
        self.shared.signal.notify_all();
        true
    }

    pub fn enable_threaded_playback(&self, enable: bool) {
        self.shared.lock().config.threaded_playback = enable;
    }

    pub fn is_threaded_playback_enabled(&self) -> bool {
        self.shared.lock().config.threaded_playback
    }

    pub fn enable_loop_at_end(&self, enable: bool) {
        self.shared.lock().config.loop_at_end = enable;
    }

    pub fn enable_cache_only_data_events(&self, enable: bool) {
        self.shared.lock().config.cache_only_data_events = enable;
    }

    pub fn enable_cache_filling(&self, enable: bool) {
        self.shared.lock().cache_filling_enabled = enable;
    }

    pub fn is_cache_filling_enabled(&self) -> bool {
        self.shared.lock().cache_filling_enabled
    }

    pub fn enable_playback(&self, enable: bool) {
        self.shared.lock().playback_enabled = enable;
    }

    pub fn is_playback_enabled(&self) -> bool {
        self.shared.lock().playback_enabled
    }

    pub fn is_playback_mode_active(&self) -> bool {
        self.shared.lock().playback_mode_active
    }

    pub fn needs_cache_load(&self) -> bool {
        self.shared.lock().needs_cache_load
    }

    pub fn cache_size(&self) -> usize {
        self.shared.lock().cache.len()
    }

    pub fn approx_memory_usage(&self) -> u64 {
        self.shared.lock().cache.approx_memory_usage()
    }

    pub fn new_entry_count(&self) -> usize {
        self.shared.lock().cache.new_entry_count()
    }

    pub fn entry(&self, index: usize) -> Option<CacheEntry> {
        self.shared.lock().cache.entry(index).cloned()
    }

    pub fn entries(&self) -> Vec<CacheEntry> {
        self.shared.lock().cache.entries().to_vec()
    }

    /// Entry most recently dispatched, if any since the last rewind.
    pub fn current_entry(&self) -> Option<CacheEntry> {
        self.shared.lock().cache.current_entry().cloned()
    }

    pub fn set_starting_index(&self, index: usize) -> bool {
        self.shared.lock().cache.set_starting_index(index)
    }

    /// Appends directly, bypassing the ingest guard.
    pub fn add_entries(&self, entries: impl IntoIterator<Item = CacheEntry>) {
        self.shared.lock().cache.add_many(entries);
    }

    /// Flushes, then replaces the in-memory entries with the stored ones.
    pub fn load_cache(&self) -> Result<bool> {
        let mut inner = self.shared.lock();
        let loaded = inner.cache.load(true)?;
        if loaded {
            inner.needs_cache_load = false;
        }
        Ok(loaded)
    }

    pub fn store_cache(&self) -> Result<bool> {
        self.shared.lock().cache.store()
    }

    pub fn clear_cache(&self) {
        let mut inner = self.shared.lock();
        inner.cache.clear();
        inner.needs_cache_load = true;
    }

    pub fn play(&self) -> bool {
        let mut inner = self.shared.lock();
        if inner.needs_cache_load {
            match inner.cache.load(true) {
                Ok(true) => inner.needs_cache_load = false,
                Ok(false) => debug!("player {}: nothing loaded before play", self.shared.name),
                Err(err) => warn!("player {}: load before play failed: {err}", self.shared.name),
            }
        } else {
            inner.flush();
        }
        if !inner.playback_enabled {
            info!("player {}: playback disabled", self.shared.name);
            return false;
        }
        if inner.cache.is_empty() {
            info!("player {}: nothing to play", self.shared.name);
            return false;
        }
        inner.cache.set_state(PlaybackState::Play);
        inner.playback_mode_active = true;

        let spawn = inner.config.threaded_playback && !inner.worker_active;
        if spawn {
            inner.worker_active = true;
        }
        let epoch = inner.epoch;
        let max_join = inner.config.max_join();
        drop(inner);
        self.shared.signal.notify_all();

        if spawn && !self.spawn_worker(epoch, max_join) {
            let mut inner = self.shared.lock();
            if inner.epoch == epoch {
                inner.worker_active = false;
            }
            return false;
        }
        info!("player {}: playing", self.shared.name);
        true
    }

    pub fn pause(&self) -> bool {
        let mut inner = self.shared.lock();
        inner.flush();
        if !matches!(
            inner.cache.state(),
            PlaybackState::Play | PlaybackState::Pause
        ) {
            return false;
        }
        inner.cache.set_state(PlaybackState::Pause);
        drop(inner);
        self.shared.signal.notify_all();
        info!("player {}: paused", self.shared.name);
        true
    }

    /// Flushes, stops and joins the playback thread (bounded by
    /// `max_join_ms`). Returns whether playback was running or paused.
    pub fn stop(&self) -> bool {
        let mut inner = self.shared.lock();
        inner.flush();
        let was_active = matches!(
            inner.cache.state(),
            PlaybackState::Play | PlaybackState::Pause
        );
        if was_active {
            inner.cache.set_state(PlaybackState::Stop);
        }
        inner.playback_mode_active = false;
        inner.epoch += 1;
        inner.worker_active = false;
        let max_join = inner.config.max_join();
        drop(inner);
        self.shared.signal.notify_all();
        self.join_worker(max_join);
        if was_active {
            info!("player {}: stopped", self.shared.name);
        }
        was_active
    }

    /// Stops, disables filling and playback, rewinds, and optionally drops
    /// every entry (a later play reloads from the store).
    pub fn reset(&self, clear_cache: bool) -> bool {
        self.stop();
        let mut inner = self.shared.lock();
        inner.cache_filling_enabled = false;
        inner.playback_enabled = false;
        inner.cache.reset();
        inner.cache.set_state(PlaybackState::Uninitialized);
        if clear_cache {
            inner.cache.clear();
            inner.needs_cache_load = true;
        }
        true
    }

    /// Emits one entry and returns how long (ms) the caller should wait before
    /// the next call.
    pub fn trigger_next_event(&self) -> u64 {
        let step = self.shared.lock().advance();
        match step {
            Step::Emit { entry, delay_ms } => {
                self.shared.dispatch(&entry);
                delay_ms
            }
            Step::Rewound => 0,
            Step::Exhausted => {
                self.stop();
                0
            }
        }
    }

    pub fn handle_actuator_data(&self, data: &ActuatorData) -> bool {
        self.ingest(data.clone().into())
    }

    pub fn handle_connection_state_data(&self, data: &ConnectionStateData) -> bool {
        self.ingest(data.clone().into())
    }

    pub fn handle_message_data(&self, data: &MessageData) -> bool {
        self.ingest(data.clone().into())
    }

    pub fn handle_sensor_data(&self, data: &SensorData) -> bool {
        self.ingest(data.clone().into())
    }

    pub fn handle_system_performance_data(&self, data: &SystemPerformanceData) -> bool {
        self.ingest(data.clone().into())
    }

    fn ingest(&self, payload: Payload) -> bool {
        let mut inner = self.shared.lock();
        if inner.playback_mode_active || !inner.cache_filling_enabled {
            return false;
        }
        if inner.config.cache_only_data_events && !payload.kind().is_data_event() {
            return false;
        }
        inner.cache.add(CacheEntry::new(payload));
        let threshold = inner.config.flush_threshold;
        if threshold > 0 && inner.cache.new_entry_count() >= threshold {
            inner.flush();
        }
        true
    }

    fn spawn_worker(&self, epoch: u64, max_join: Duration) -> bool {
        self.join_worker(max_join);
        let shared = Arc::clone(&self.shared);
        let (exit_tx, exited) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name(format!("historian-play-{}", self.shared.name))
            .spawn(move || {
                let _exit = exit_tx;
                run_playback(&shared, epoch);
            });
        match spawned {
            Ok(handle) => {
                let thread_id = handle.thread().id();
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(PlaybackWorker {
                    thread_id,
                    handle,
                    exited,
                });
                true
            }
            Err(err) => {
                error!("player {}: cannot start playback thread: {err}", self.shared.name);
                false
            }
        }
    }

    fn join_worker(&self, max_join: Duration) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };
        if worker.thread_id == thread::current().id() {
            // Called from a listener on the playback thread; it exits on its own.
            return;
        }
        match worker.exited.recv_timeout(max_join) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "player {}: playback thread did not exit within {max_join:?}; detaching",
                    self.shared.name
                );
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    error!("player {}: playback thread panicked", self.shared.name);
                }
            }
        }
    }
}

fn run_playback(shared: &Shared, epoch: u64) {
    debug!("player {}: playback thread started", shared.name);
    let mut inner = shared.lock();
    loop {
        if inner.epoch != epoch {
            break;
        }
        match inner.cache.state() {
            PlaybackState::Play => {}
            PlaybackState::Stop => {
                inner.worker_active = false;
                break;
            }
            PlaybackState::Pause | PlaybackState::Uninitialized => {
                let idle = inner.config.idle_poll();
                inner = shared
                    .signal
                    .wait_timeout(inner, idle)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|poisoned| poisoned.into_inner().0);
                continue;
            }
        }

        let delay = inner.pending_delay();
        if delay > 0 {
            inner = shared
                .signal
                .wait_timeout_while(inner, Duration::from_millis(delay), |state| {
                    state.epoch == epoch && state.cache.state() == PlaybackState::Play
                })
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
            if inner.epoch != epoch || inner.cache.state() != PlaybackState::Play {
                continue;
            }
        }

        match inner.advance() {
            Step::Emit { entry, .. } => {
                drop(inner);
                shared.dispatch(&entry);
                inner = shared.lock();
            }
            Step::Rewound => {}
            Step::Exhausted => {
                inner.cache.set_state(PlaybackState::Stop);
                inner.playback_mode_active = false;
                inner.worker_active = false;
                inner.flush();
                info!("player {}: end of cache, stopped", shared.name);
                break;
            }
        }
    }
    debug!("player {}: playback thread exiting", shared.name);
}

impl DataEventListener for HistorianPlayer {
    fn on_actuator_data(&self, data: &ActuatorData) {
        self.handle_actuator_data(data);
    }

    fn on_connection_state_data(&self, data: &ConnectionStateData) {
        self.handle_connection_state_data(data);
    }

    fn on_message_data(&self, data: &MessageData) {
        self.handle_message_data(data);
    }

    fn on_sensor_data(&self, data: &SensorData) {
        self.handle_sensor_data(data);
    }

    fn on_system_performance_data(&self, data: &SystemPerformanceData) {
        self.handle_system_performance_data(data);
    }
}

impl Drop for HistorianPlayer {
    fn drop(&mut self) {
        let max_join = {
            let mut inner = self.shared.lock();
            inner.flush();
            inner.epoch += 1;
            inner.worker_active = false;
            inner.config.max_join()
        };
        self.shared.signal.notify_all();
        self.join_worker(max_join);
    }
}

impl fmt::Debug for HistorianPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("HistorianPlayer")
            .field("name", &self.shared.name)
            .field("cache", &inner.cache)
            .field("playback_enabled", &inner.playback_enabled)
            .field("playback_mode_active", &inner.playback_mode_active)
            .field("cache_filling_enabled", &inner.cache_filling_enabled)
            .finish_non_exhaustive()
    }
}
