//! Pluggable persistence for caches, text blobs and typed records.
//!
//! A backend implements [`DataLoader`] and [`DataStorer`]; a full backend adds
//! the [`PersistenceConnector`] lifecycle on top. Only `load_entries` and
//! `store_entries` are mandatory, the remaining operations default to an
//! empty result so partial backends (and test doubles) stay small.

mod codec;
mod file;
mod latest;

use std::path::PathBuf;
use std::sync::Arc;

use time::OffsetDateTime;

pub use codec::SerializerKind;
pub use file::FilePersistenceConnector;
pub use latest::LatestItemCache;

use crate::data::{
    ActuatorData, CacheEntry, ConnectionStateData, RequestResponseRecord, ResourceDescriptor,
    SensorData, SystemPerformanceData,
};
use crate::historian::HistorianCache;
use crate::layout::PersistenceDataType;
use crate::listener::{ConnectionState, StatusListener};
use crate::Result;

pub trait DataLoader: Send + Sync {
    /// Entries persisted under `cache_name`; empty when nothing was stored.
    fn load_entries(&self, cache_name: &str) -> Result<Vec<CacheEntry>>;

    fn load_text(&self, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn load_request_response(&self, _session_id: &str) -> Result<Option<RequestResponseRecord>> {
        Ok(None)
    }

    fn load_actuator_data(
        &self,
        _resource: &ResourceDescriptor,
        _start: OffsetDateTime,
        _end: OffsetDateTime,
    ) -> Result<Vec<ActuatorData>> {
        Ok(Vec::new())
    }

    fn load_connection_state_data(
        &self,
        _resource: &ResourceDescriptor,
        _start: OffsetDateTime,
        _end: OffsetDateTime,
    ) -> Result<Vec<ConnectionStateData>> {
        Ok(Vec::new())
    }

    fn load_sensor_data(
        &self,
        _resource: &ResourceDescriptor,
        _start: OffsetDateTime,
        _end: OffsetDateTime,
    ) -> Result<Vec<SensorData>> {
        Ok(Vec::new())
    }

    fn load_system_performance_data(
        &self,
        _resource: &ResourceDescriptor,
        _start: OffsetDateTime,
        _end: OffsetDateTime,
    ) -> Result<Vec<SystemPerformanceData>> {
        Ok(Vec::new())
    }
}

pub trait DataStorer: Send + Sync {
    /// Replaces whatever is stored under `cache_name`. Returns bytes written.
    fn store_entries(&self, cache_name: &str, entries: &[CacheEntry]) -> Result<usize>;

    fn store_historian_cache(&self, cache: &HistorianCache) -> Result<usize> {
        self.store_entries(cache.name(), cache.entries())
    }

    fn store_text(&self, _name: &str, _text: &str) -> Result<usize> {
        Ok(0)
    }

    fn store_request_response(&self, _record: &RequestResponseRecord) -> Result<usize> {
        Ok(0)
    }

    fn store_actuator_data(&self, _resource: &ResourceDescriptor, _data: &ActuatorData) -> Result<()> {
        Ok(())
    }

    fn store_connection_state_data(
        &self,
        _resource: &ResourceDescriptor,
        _data: &ConnectionStateData,
    ) -> Result<()> {
        Ok(())
    }

    fn store_sensor_data(&self, _resource: &ResourceDescriptor, _data: &SensorData) -> Result<()> {
        Ok(())
    }

    fn store_system_performance_data(
        &self,
        _resource: &ResourceDescriptor,
        _data: &SystemPerformanceData,
    ) -> Result<()> {
        Ok(())
    }
}

pub trait PersistenceConnector: DataLoader + DataStorer {
    /// Idempotent; `false` when the backing store is unreachable.
    fn connect(&self) -> bool;

    /// Idempotent.
    fn disconnect(&self) -> bool;

    fn is_connected(&self) -> bool;

    fn resolve_storage_name(&self, name: &str, data_type: PersistenceDataType) -> Result<PathBuf>;

    fn data_store_uri(&self, data_type: PersistenceDataType) -> PathBuf;

    /// Names of items stored for `data_type`, without extensions.
    fn list_cache_names(&self, data_type: PersistenceDataType) -> Result<Vec<String>>;

    fn connection_state(&self) -> ConnectionState;

    fn set_status_listener(&self, listener: Option<Arc<dyn StatusListener>>);

    fn latest_actuator_data(&self, _resource: &ResourceDescriptor) -> Option<ActuatorData> {
        None
    }

    fn latest_connection_state_data(
        &self,
        _resource: &ResourceDescriptor,
    ) -> Option<ConnectionStateData> {
        None
    }

    fn latest_sensor_data(&self, _resource: &ResourceDescriptor) -> Option<SensorData> {
        None
    }

    fn latest_system_performance_data(
        &self,
        _resource: &ResourceDescriptor,
    ) -> Option<SystemPerformanceData> {
        None
    }

    fn into_loader(self: Arc<Self>) -> Arc<dyn DataLoader>;

    fn into_storer(self: Arc<Self>) -> Arc<dyn DataStorer>;
}
