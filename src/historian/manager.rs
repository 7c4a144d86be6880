use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use log::{debug, info, warn};
use time::OffsetDateTime;

use super::cache::generate_cache_name;
use super::player::HistorianPlayer;
use super::state::PlaybackDirection;
use crate::config::HistorianConfig;
use crate::data::{
    ActuatorData, ConnectionStateData, ResourceDescriptor, SensorData, SystemPerformanceData,
};
use crate::layout::{normalize_cache_name, PersistenceDataType};
use crate::listener::{DataEventListener, StatusListener};
use crate::persistence::{FilePersistenceConnector, PersistenceConnector};
use crate::{Error, Result};

/// Registry of players keyed by cache name, sharing one persistence connector.
pub struct HistorianManager {
    config: RwLock<HistorianConfig>,
    players: Mutex<HashMap<String, Arc<HistorianPlayer>>>,
    connector: RwLock<Option<Arc<dyn PersistenceConnector>>>,
    status_listener: RwLock<Option<Arc<dyn StatusListener>>>,
    event_listener: RwLock<Option<Arc<dyn DataEventListener>>>,
}

impl HistorianManager {
    /// File-backed manager rooted at `config.root_path`.
    pub fn new(config: HistorianConfig) -> Result<Self> {
        let connector = FilePersistenceConnector::new(&config.root_path, config.product_name.as_str())?
            .with_serializer(config.serializer);
        Ok(Self::with_connector(config, Arc::new(connector)))
    }

    pub fn with_connector(config: HistorianConfig, connector: Arc<dyn PersistenceConnector>) -> Self {
        let manager = Self::detached(config);
        manager.set_persistence_connector(connector);
        manager
    }

    /// Manager without persistence: caches live in memory only.
    pub fn detached(config: HistorianConfig) -> Self {
        Self {
            config: RwLock::new(config),
            players: Mutex::new(HashMap::new()),
            connector: RwLock::new(None),
            status_listener: RwLock::new(None),
            event_listener: RwLock::new(None),
        }
    }

    fn registry(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<HistorianPlayer>>>> {
        self.players
            .lock()
            .map_err(|_| Error::LockPoisoned("historian registry"))
    }

    fn snapshot(&self) -> Vec<Arc<HistorianPlayer>> {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn config(&self) -> HistorianConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn connector(&self) -> Option<Arc<dyn PersistenceConnector>> {
        self.connector
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn max_cache_count(&self) -> usize {
        self.config().max_cache_count
    }

    pub fn max_cache_size_bytes(&self) -> u64 {
        self.config().max_cache_size_bytes
    }

    pub fn root_path(&self) -> PathBuf {
        self.config().root_path
    }

    /// Directory holding historian cache files, when persistence is set up.
    pub fn cache_file_path(&self) -> Option<PathBuf> {
        self.connector()
            .map(|connector| connector.data_store_uri(PersistenceDataType::Historian))
    }

    /// Returns the player registered under `name`, creating (and optionally
    /// loading) it first. Creation and registration happen under one lock, so
    /// concurrent callers always share a single player.
    pub fn get_or_create_player(
        &self,
        name: &str,
        load_from_persistence: bool,
    ) -> Result<Arc<HistorianPlayer>> {
        let key = normalize_cache_name(name)?;
        let mut players = self.registry()?;
        if let Some(player) = players.get(&key) {
            return Ok(Arc::clone(player));
        }
        let config = self.config();
        if players.len() >= config.max_cache_count {
            warn!("historian registry full, refusing cache {key}");
            return Err(Error::RegistryFull(config.max_cache_count));
        }

        let player = Arc::new(HistorianPlayer::new(&key, config.player.clone())?);
        self.init_player(&player);
        if load_from_persistence {
            match player.load_cache() {
                Ok(true) => info!("historian {key}: loaded {} entries", player.cache_size()),
                Ok(false) => debug!("historian {key}: nothing stored yet"),
                Err(err) => warn!("historian {key}: load failed, starting empty: {err}"),
            }
        }
        players.insert(key.clone(), Arc::clone(&player));
        info!("historian {key}: registered ({} open)", players.len());
        Ok(player)
    }

    /// Registers a player under a generated cache name.
    pub fn create_player(&self) -> Result<Arc<HistorianPlayer>> {
        let product = self.config().product_name;
        self.get_or_create_player(&generate_cache_name(&product), false)
    }

    fn init_player(&self, player: &HistorianPlayer) {
        player.enable_cache_filling(true);
        player.set_event_listener(
            self.event_listener
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        );
        if let Some(connector) = self.connector() {
            player.set_connector(&connector);
        }
    }

    pub fn player(&self, name: &str) -> Option<Arc<HistorianPlayer>> {
        let key = normalize_cache_name(name).ok()?;
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Caches present in the store, whether or not they are open.
    pub fn loadable_cache_names(&self) -> Result<Vec<String>> {
        match self.connector() {
            Some(connector) => connector.list_cache_names(PersistenceDataType::Historian),
            None => Ok(Vec::new()),
        }
    }

    /// Resets (flushing first) and unregisters the player.
    pub fn remove_player(&self, name: &str) -> bool {
        let Ok(key) = normalize_cache_name(name) else {
            return false;
        };
        let removed = self
            .players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        match removed {
            Some(player) => {
                player.reset(false);
                info!("historian {key}: removed");
                true
            }
            None => false,
        }
    }

    pub fn is_cache_replaying(&self, name: &str) -> bool {
        self.player(name).is_some_and(|player| player.is_playing())
    }

    pub fn set_replay_direction(&self, name: &str, direction: PlaybackDirection) -> bool {
        match self.player(name) {
            Some(player) => {
                player.set_direction(direction);
                true
            }
            None => false,
        }
    }

    /// Sum of every open cache's approximate memory use.
    pub fn total_memory_usage(&self) -> u64 {
        self.snapshot()
            .iter()
            .map(|player| player.approx_memory_usage())
            .sum()
    }

    pub fn set_status_listener(&self, listener: Option<Arc<dyn StatusListener>>) {
        if let Some(connector) = self.connector() {
            connector.set_status_listener(listener.clone());
        }
        *self
            .status_listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = listener;
    }

    pub fn set_event_listener(&self, listener: Option<Arc<dyn DataEventListener>>) {
        for player in self.snapshot() {
            player.set_event_listener(listener.clone());
        }
        *self
            .event_listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = listener;
    }

    /// Moves storage to `path`. Open players keep their in-memory entries and
    /// write to the new location from now on; nothing is reloaded.
    pub fn set_root_file_path(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if let Err(err) = validate_root(path) {
            self.report(log::Level::Warn, &format!("root path rejected: {err}"));
            return false;
        }
        let config = self.config();
        if config.root_path.as_path() == path && self.connector().is_some() {
            return true;
        }
        let connector = match FilePersistenceConnector::new(path, config.product_name.as_str()) {
            Ok(connector) => connector.with_serializer(config.serializer),
            Err(err) => {
                self.report(log::Level::Warn, &format!("root path rejected: {err}"));
                return false;
            }
        };
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .root_path = path.to_path_buf();
        self.set_persistence_connector(Arc::new(connector));
        info!("historian root moved to {}", path.display());
        true
    }

    /// Disconnects the current connector, connects `connector` and points
    /// every open player at it.
    pub fn set_persistence_connector(&self, connector: Arc<dyn PersistenceConnector>) {
        connector.set_status_listener(
            self.status_listener
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        );
        let previous = self
            .connector
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&connector));
        if let Some(previous) = previous {
            previous.disconnect();
        }
        if !connector.connect() {
            warn!("persistence connector failed to connect");
        }
        for player in self.snapshot() {
            player.set_connector(&connector);
        }
    }

    pub fn load_actuator_data(
        &self,
        resource: &ResourceDescriptor,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<ActuatorData>> {
        match self.connector() {
            Some(connector) => connector.load_actuator_data(resource, start, end),
            None => Ok(Vec::new()),
        }
    }

    pub fn load_connection_state_data(
        &self,
        resource: &ResourceDescriptor,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<ConnectionStateData>> {
        match self.connector() {
            Some(connector) => connector.load_connection_state_data(resource, start, end),
            None => Ok(Vec::new()),
        }
    }

    pub fn load_sensor_data(
        &self,
        resource: &ResourceDescriptor,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<SensorData>> {
        match self.connector() {
            Some(connector) => connector.load_sensor_data(resource, start, end),
            None => Ok(Vec::new()),
        }
    }

    pub fn load_system_performance_data(
        &self,
        resource: &ResourceDescriptor,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<SystemPerformanceData>> {
        match self.connector() {
            Some(connector) => connector.load_system_performance_data(resource, start, end),
            None => Ok(Vec::new()),
        }
    }

    /// Stops every player (flushing its cache) and disconnects storage.
    pub fn shutdown(&self) {
        for player in self.snapshot() {
            player.stop();
        }
        if let Some(connector) = self.connector() {
            connector.disconnect();
        }
        info!("historian manager shut down");
    }

    fn report(&self, level: log::Level, message: &str) {
        log::log!(level, "{message}");
        let listener = self
            .status_listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener.on_log(level, message);
        }
    }
}

fn validate_root(path: &Path) -> Result<()> {
    let invalid = || Error::InvalidRootPath(path.to_path_buf());
    let text = path.to_string_lossy();
    if text.trim().is_empty() || matches!(text.as_ref(), "." | ".." | "...") {
        return Err(invalid());
    }
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(invalid());
    }
    if !path.is_dir() {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_validation() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(validate_root(dir.path()).is_ok());
        assert!(validate_root(Path::new("")).is_err());
        assert!(validate_root(Path::new(".")).is_err());
        assert!(validate_root(Path::new("..")).is_err());
        assert!(validate_root(Path::new("...")).is_err());
        assert!(validate_root(&dir.path().join("..").join("x")).is_err());
        assert!(validate_root(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn detached_manager_answers_empty() {
        let manager = HistorianManager::detached(HistorianConfig::default());
        assert!(manager.cache_file_path().is_none());
        assert!(manager.loadable_cache_names().expect("names").is_empty());
        let now = OffsetDateTime::now_utc();
        let sensors = manager
            .load_sensor_data(&ResourceDescriptor::new("dev"), now, now)
            .expect("range");
        assert!(sensors.is_empty());
    }

    #[test]
    fn registry_limit_is_enforced() {
        let config = HistorianConfig {
            max_cache_count: 2,
            ..HistorianConfig::default()
        };
        let manager = HistorianManager::detached(config);
        manager.get_or_create_player("a", false).expect("a");
        manager.get_or_create_player("b", false).expect("b");
        manager.get_or_create_player("a.json", false).expect("existing a");
        let err = manager.get_or_create_player("c", false).unwrap_err();
        assert!(matches!(err, Error::RegistryFull(2)));
    }
}
