use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, error, info, warn, Level};
use time::{Date, OffsetDateTime, UtcOffset};

use super::{DataLoader, DataStorer, LatestItemCache, PersistenceConnector, SerializerKind};
use crate::data::{
    ActuatorData, CacheEntry, ConnectionStateData, DataKind, Record, RequestResponseRecord,
    ResourceDescriptor, SensorData, SystemPerformanceData, TimeRange,
};
use crate::layout::{parse_record_file_name, PersistenceDataType, StorageLayout};
use crate::listener::{ConnectionState, LinkStatus, StatusListener};
use crate::{Error, Result};

const TEXT_EXT: &str = ".txt";

/// Stores everything as files under `{root}/{product}`.
pub struct FilePersistenceConnector {
    layout: StorageLayout,
    serializer: SerializerKind,
    state: Mutex<ConnectionState>,
    listener: RwLock<Option<Arc<dyn StatusListener>>>,
    write_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    latest: LatestItemCache,
}

impl FilePersistenceConnector {
    pub fn new(root: impl Into<PathBuf>, product: impl Into<String>) -> Result<Self> {
        let layout = StorageLayout::new(root, product)?;
        let target = layout.product_dir().display().to_string();
        Ok(Self {
            layout,
            serializer: SerializerKind::default(),
            state: Mutex::new(ConnectionState::new(target)),
            listener: RwLock::new(None),
            write_locks: Mutex::new(HashMap::new()),
            latest: LatestItemCache::new(),
        })
    }

    pub fn with_serializer(mut self, serializer: SerializerKind) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn serializer(&self) -> SerializerKind {
        self.serializer
    }

    fn report(&self, level: Level, message: &str) {
        log::log!(level, "{message}");
        if let Ok(listener) = self.listener.read() {
            if let Some(listener) = listener.as_ref() {
                listener.on_log(level, message);
            }
        }
    }

    fn publish_state(&self) {
        let snapshot = self.connection_state();
        if let Ok(listener) = self.listener.read() {
            if let Some(listener) = listener.as_ref() {
                listener.on_status_update(&snapshot);
            }
        }
    }

    fn count_in(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.msg_in_count += 1;
        }
    }

    fn count_out(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.msg_out_count += 1;
        }
    }

    fn path_lock(&self, path: &Path) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .write_locks
            .lock()
            .map_err(|_| Error::LockPoisoned("connector write locks"))?;
        Ok(Arc::clone(locks.entry(path.to_path_buf()).or_default()))
    }

    /// Writes through a temp file so readers never observe a partial file.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<usize> {
        let lock = self.path_lock(path)?;
        let _guard = lock
            .lock()
            .map_err(|_| Error::LockPoisoned("connector path lock"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(data.len())
    }

    fn read_optional(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn append_record<T: Record>(&self, resource: &ResourceDescriptor, record: &T) -> Result<()> {
        let day = record.timestamp().to_offset(UtcOffset::UTC).date();
        let path = self.layout.record_path(resource, T::KIND, day)?;
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let lock = self.path_lock(&path)?;
        let guard = lock
            .lock()
            .map_err(|_| Error::LockPoisoned("connector path lock"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&line)?;
        drop(guard);

        self.latest.update(resource, record);
        self.count_out();
        Ok(())
    }

    /// Day files holding `kind` records for `resource`, oldest first.
    fn record_files(
        &self,
        resource: &ResourceDescriptor,
        kind: DataKind,
    ) -> Result<Vec<(Date, PathBuf)>> {
        let dir = self.layout.record_dir(resource)?;
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut files = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(day) = parse_record_file_name(kind, &name.to_string_lossy()) {
                files.push((day, entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_records<T: Record>(&self, path: &Path) -> Result<Vec<T>> {
        let Some(bytes) = self.read_optional(path)? else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        for line in bytes.split(|byte| *byte == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            records.push(serde_json::from_slice(line)?);
        }
        Ok(records)
    }

    fn load_records<T: Record>(
        &self,
        resource: &ResourceDescriptor,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<T>> {
        let range = TimeRange::new(start, end)?;
        let mut records = Vec::new();
        for (day, path) in self.record_files(resource, T::KIND)? {
            if !range.touches_day(day) {
                continue;
            }
            records.extend(
                self.read_records::<T>(&path)?
                    .into_iter()
                    .filter(|record| range.contains(record.timestamp())),
            );
        }
        self.count_in();
        debug!(
            "loaded {} {} records for {} between {} and {}",
            records.len(),
            T::KIND,
            resource.key(),
            range.start(),
            range.end()
        );
        Ok(records)
    }

    fn latest_record<T: Record>(&self, resource: &ResourceDescriptor) -> Option<T> {
        if let Some(record) = self.latest.get::<T>(resource) {
            return Some(record);
        }
        match self.newest_on_disk::<T>(resource) {
            Ok(Some(record)) => {
                self.latest.update(resource, &record);
                Some(record)
            }
            Ok(None) => None,
            Err(err) => {
                self.report(
                    Level::Warn,
                    &format!("latest {} lookup failed for {}: {err}", T::KIND, resource.key()),
                );
                None
            }
        }
    }

    /// Record with the greatest timestamp in the newest day file.
    fn newest_on_disk<T: Record>(&self, resource: &ResourceDescriptor) -> Result<Option<T>> {
        let Some((_, path)) = self.record_files(resource, T::KIND)?.pop() else {
            return Ok(None);
        };
        Ok(self
            .read_records::<T>(&path)?
            .into_iter()
            .max_by_key(|record| record.timestamp()))
    }
}

impl DataLoader for FilePersistenceConnector {
    fn load_entries(&self, cache_name: &str) -> Result<Vec<CacheEntry>> {
        let path = self.resolve_storage_name(cache_name, PersistenceDataType::Historian)?;
        let Some(bytes) = self.read_optional(&path)? else {
            debug!("no stored cache at {}", path.display());
            return Ok(Vec::new());
        };
        let entries: Vec<CacheEntry> = self.serializer.decode(&bytes).map_err(|err| {
            self.report(
                Level::Error,
                &format!("unreadable cache file {}: {err}", path.display()),
            );
            err
        })?;
        self.count_in();
        info!("loaded {} entries from {}", entries.len(), path.display());
        Ok(entries)
    }

    fn load_text(&self, name: &str) -> Result<Option<String>> {
        let path = self
            .layout
            .item_path(name, PersistenceDataType::Text, TEXT_EXT)?;
        let Some(bytes) = self.read_optional(&path)? else {
            return Ok(None);
        };
        self.count_in();
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn load_request_response(&self, session_id: &str) -> Result<Option<RequestResponseRecord>> {
        let path = self.resolve_storage_name(session_id, PersistenceDataType::Prediction)?;
        let Some(bytes) = self.read_optional(&path)? else {
            return Ok(None);
        };
        self.count_in();
        Ok(Some(self.serializer.decode(&bytes)?))
    }

    fn load_actuator_data(
        &self,
        resource: &ResourceDescriptor,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<ActuatorData>> {
        self.load_records(resource, start, end)
    }

    fn load_connection_state_data(
        &self,
        resource: &ResourceDescriptor,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<ConnectionStateData>> {
        self.load_records(resource, start, end)
    }

    fn load_sensor_data(
        &self,
        resource: &ResourceDescriptor,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<SensorData>> {
        self.load_records(resource, start, end)
    }

    fn load_system_performance_data(
        &self,
        resource: &ResourceDescriptor,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<SystemPerformanceData>> {
        self.load_records(resource, start, end)
    }
}

impl DataStorer for FilePersistenceConnector {
    fn store_entries(&self, cache_name: &str, entries: &[CacheEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let path = self.resolve_storage_name(cache_name, PersistenceDataType::Historian)?;
        let data = self.serializer.encode(entries)?;
        let written = self.write_atomic(&path, &data).map_err(|err| {
            self.report(
                Level::Error,
                &format!("failed to store cache {}: {err}", path.display()),
            );
            err
        })?;
        self.count_out();
        debug!(
            "stored {} entries ({written} bytes) to {}",
            entries.len(),
            path.display()
        );
        Ok(written)
    }

    fn store_text(&self, name: &str, text: &str) -> Result<usize> {
        let path = self
            .layout
            .item_path(name, PersistenceDataType::Text, TEXT_EXT)?;
        let written = self.write_atomic(&path, text.as_bytes())?;
        self.count_out();
        Ok(written)
    }

    fn store_request_response(&self, record: &RequestResponseRecord) -> Result<usize> {
        let path = self.resolve_storage_name(&record.session_id, PersistenceDataType::Prediction)?;
        let data = self.serializer.encode(record)?;
        let written = self.write_atomic(&path, &data)?;
        self.count_out();
        Ok(written)
    }

    fn store_actuator_data(&self, resource: &ResourceDescriptor, data: &ActuatorData) -> Result<()> {
        self.append_record(resource, data)
    }

    fn store_connection_state_data(
        &self,
        resource: &ResourceDescriptor,
        data: &ConnectionStateData,
    ) -> Result<()> {
        self.append_record(resource, data)
    }

    fn store_sensor_data(&self, resource: &ResourceDescriptor, data: &SensorData) -> Result<()> {
        self.append_record(resource, data)
    }

    fn store_system_performance_data(
        &self,
        resource: &ResourceDescriptor,
        data: &SystemPerformanceData,
    ) -> Result<()> {
        self.append_record(resource, data)
    }
}

impl PersistenceConnector for FilePersistenceConnector {
    fn connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }
        let root = self.layout.root();
        if !root.is_dir() {
            self.report(
                Level::Error,
                &format!("storage root {} is not a directory", root.display()),
            );
            return false;
        }
        if let Err(err) = fs::create_dir_all(self.layout.product_dir()) {
            self.report(
                Level::Error,
                &format!(
                    "cannot create {}: {err}",
                    self.layout.product_dir().display()
                ),
            );
            return false;
        }
        if let Ok(mut state) = self.state.lock() {
            state.status = LinkStatus::Connected;
            state.message = format!("connected to {}", self.layout.product_dir().display());
        }
        info!("file persistence connected at {}", self.layout.product_dir().display());
        self.publish_state();
        true
    }

    fn disconnect(&self) -> bool {
        if !self.is_connected() {
            return true;
        }
        self.latest.clear();
        if let Ok(mut state) = self.state.lock() {
            state.status = LinkStatus::Disconnected;
            state.message = "disconnected".to_string();
        }
        info!("file persistence disconnected from {}", self.layout.product_dir().display());
        self.publish_state();
        true
    }

    fn is_connected(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.is_connected())
            .unwrap_or(false)
    }

    fn resolve_storage_name(&self, name: &str, data_type: PersistenceDataType) -> Result<PathBuf> {
        self.layout
            .item_path(name, data_type, self.serializer.extension())
    }

    fn data_store_uri(&self, data_type: PersistenceDataType) -> PathBuf {
        self.layout.type_dir(data_type)
    }

    fn list_cache_names(&self, data_type: PersistenceDataType) -> Result<Vec<String>> {
        let dir = self.layout.type_dir(data_type);
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let ext = self.serializer.extension();
        let mut names = Vec::new();
        for entry in read_dir {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if let Some(stem) = name.strip_suffix(ext) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn connection_state(&self) -> ConnectionState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(_) => {
                warn!("connection state lock poisoned");
                ConnectionState::new(self.layout.product_dir().display().to_string())
            }
        }
    }

    fn set_status_listener(&self, listener: Option<Arc<dyn StatusListener>>) {
        match self.listener.write() {
            Ok(mut slot) => *slot = listener,
            Err(_) => error!("status listener lock poisoned"),
        }
    }

    fn latest_actuator_data(&self, resource: &ResourceDescriptor) -> Option<ActuatorData> {
        self.latest_record(resource)
    }

    fn latest_connection_state_data(
        &self,
        resource: &ResourceDescriptor,
    ) -> Option<ConnectionStateData> {
        self.latest_record(resource)
    }

    fn latest_sensor_data(&self, resource: &ResourceDescriptor) -> Option<SensorData> {
        self.latest_record(resource)
    }

    fn latest_system_performance_data(
        &self,
        resource: &ResourceDescriptor,
    ) -> Option<SystemPerformanceData> {
        self.latest_record(resource)
    }

    fn into_loader(self: Arc<Self>) -> Arc<dyn DataLoader> {
        self
    }

    fn into_storer(self: Arc<Self>) -> Arc<dyn DataStorer> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MessageData;
    use time::macros::datetime;

    fn connector(root: &Path) -> FilePersistenceConnector {
        let connector = FilePersistenceConnector::new(root, "PDT").expect("connector");
        assert!(connector.connect());
        connector
    }

    #[test]
    fn connect_requires_existing_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = FilePersistenceConnector::new(dir.path().join("missing"), "PDT")
            .expect("connector");
        assert!(!missing.connect());
        assert!(!missing.is_connected());

        let present = connector(dir.path());
        assert!(present.connect());
        assert!(present.is_connected());
        assert!(present.disconnect());
        assert!(present.disconnect());
        assert!(!present.is_connected());
    }

    #[test]
    fn no_temp_file_left_after_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let connector = connector(dir.path());
        let entries = vec![CacheEntry::new(MessageData::new("m", "hi"))];
        let written = connector.store_entries("Cache", &entries).expect("store");
        assert!(written > 0);

        let cache_dir = connector.data_store_uri(PersistenceDataType::Historian);
        let names: Vec<_> = fs::read_dir(&cache_dir)
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("Cache.json")]);
    }

    #[test]
    fn empty_store_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let connector = connector(dir.path());
        assert_eq!(connector.store_entries("Empty", &[]).expect("store"), 0);
        assert!(!connector
            .resolve_storage_name("Empty", PersistenceDataType::Historian)
            .expect("path")
            .exists());
    }

    #[test]
    fn counters_track_traffic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let connector = connector(dir.path());
        let entries = vec![CacheEntry::new(MessageData::new("m", "hi"))];
        connector.store_entries("Cache", &entries).expect("store");
        connector.load_entries("Cache").expect("load");
        let state = connector.connection_state();
        assert_eq!(state.msg_out_count, 1);
        assert_eq!(state.msg_in_count, 1);
    }

    #[test]
    fn latest_falls_back_to_newest_day_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resource = ResourceDescriptor::new("dev");
        {
            let writer = connector(dir.path());
            for (value, ts) in [
                (1.0, datetime!(2026-05-01 10:00 UTC)),
                (2.0, datetime!(2026-05-02 10:00 UTC)),
                (3.0, datetime!(2026-05-02 11:00 UTC)),
            ] {
                writer
                    .store_sensor_data(&resource, &SensorData::new("t", value).at(ts))
                    .expect("append");
            }
        }
        let reader = connector(dir.path());
        let latest = reader.latest_sensor_data(&resource).expect("latest");
        assert_eq!(latest.value, 3.0);
    }

    #[test]
    fn latest_on_disk_is_by_timestamp_not_line_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resource = ResourceDescriptor::new("dev");
        {
            let writer = connector(dir.path());
            for (value, ts) in [
                (1.0, datetime!(2026-05-02 11:00 UTC)),
                (2.0, datetime!(2026-05-02 10:00 UTC)),
            ] {
                writer
                    .store_sensor_data(&resource, &SensorData::new("t", value).at(ts))
                    .expect("append");
            }
        }
        let reader = connector(dir.path());
        let latest = reader.latest_sensor_data(&resource).expect("latest");
        assert_eq!(latest.value, 1.0);
    }

    #[test]
    fn wide_window_reads_only_existing_day_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let connector = connector(dir.path());
        let resource = ResourceDescriptor::new("dev").at_location("lab");
        for (value, ts) in [
            (1.0, datetime!(2026-05-01 10:00 UTC)),
            (2.0, datetime!(2026-05-03 10:00 UTC)),
        ] {
            connector
                .store_sensor_data(&resource, &SensorData::new("t", value).at(ts))
                .expect("append");
        }
        let command = ActuatorData::new("a", 1, 7.0).at(datetime!(2026-05-02 10:00 UTC));
        connector
            .store_actuator_data(&resource, &command)
            .expect("append");

        let loaded = connector
            .load_sensor_data(
                &resource,
                OffsetDateTime::UNIX_EPOCH,
                datetime!(2100-01-01 00:00 UTC),
            )
            .expect("load");
        let values: Vec<_> = loaded.iter().map(|record| record.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);

        let unknown = ResourceDescriptor::new("nobody");
        let missing = connector
            .load_sensor_data(
                &unknown,
                OffsetDateTime::UNIX_EPOCH,
                datetime!(2100-01-01 00:00 UTC),
            )
            .expect("load");
        assert!(missing.is_empty());
    }
}
