use std::sync::Arc;

use historian::data::{ActuatorData, MessageData, SensorData, SystemPerformanceData};
use historian::{
    CacheEntry, DataLoader, DataStorer, FilePersistenceConnector, HistorianCache,
    PersistenceConnector, PersistenceDataType, Record, SerializerKind,
};
use tempfile::tempdir;
use time::macros::datetime;
use time::Duration;

fn connector(root: &std::path::Path, serializer: SerializerKind) -> Arc<FilePersistenceConnector> {
    let connector = FilePersistenceConnector::new(root, "PDT")
        .expect("connector")
        .with_serializer(serializer);
    assert!(connector.connect());
    Arc::new(connector)
}

fn wired_cache(name: &str, connector: &Arc<FilePersistenceConnector>) -> HistorianCache {
    let mut cache = HistorianCache::new(name).expect("cache");
    let loader: Arc<dyn DataLoader> = connector.clone();
    let storer: Arc<dyn DataStorer> = connector.clone();
    cache.set_loader(Some(loader));
    cache.set_storer(Some(storer));
    cache
}

fn mixed_entries() -> Vec<CacheEntry> {
    let base = datetime!(2026-06-01 08:00 UTC);
    vec![
        CacheEntry::new(SensorData::new("temp", 20.5).on_device("dev-1").at(base)),
        CacheEntry::new(
            ActuatorData::new("valve", 2, 0.75).at(base + Duration::milliseconds(1_500)),
        ),
        CacheEntry::new(MessageData::new("note", "door opened").at(base + Duration::seconds(3))),
        CacheEntry::new(
            SystemPerformanceData::new("sys", 12.0, 40.0, 55.0).at(base + Duration::seconds(9)),
        ),
    ]
}

#[test]
fn store_then_load_preserves_entries_and_order() {
    let dir = tempdir().expect("tempdir");
    let connector = connector(dir.path(), SerializerKind::Json);
    let entries = mixed_entries();

    let mut writer = wired_cache("Plant", &connector);
    writer.add_many(entries.clone());
    assert!(writer.store().expect("store"));
    assert_eq!(writer.new_entry_count(), 0);

    let mut reader = wired_cache("Plant.json", &connector);
    assert!(reader.load(false).expect("load"));
    assert_eq!(reader.len(), entries.len());
    assert_eq!(reader.entries(), entries.as_slice());
    for (loaded, original) in reader.entries().iter().zip(&entries) {
        assert_eq!(loaded.timestamp(), original.timestamp());
        assert_eq!(loaded.kind(), original.kind());
    }
    assert_eq!(reader.approx_memory_usage(), writer.approx_memory_usage());
    assert_eq!(reader.new_entry_count(), 0);
}

#[test]
fn binary_serializer_round_trip() {
    let dir = tempdir().expect("tempdir");
    let connector = connector(dir.path(), SerializerKind::Binary);
    let entries = mixed_entries();

    let mut writer = wired_cache("Packed", &connector);
    writer.add_many(entries.clone());
    assert!(writer.store().expect("store"));

    let path = connector
        .resolve_storage_name("Packed", PersistenceDataType::Historian)
        .expect("path");
    assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("dat"));
    let raw = std::fs::read(&path).expect("read");
    assert!(serde_json::from_slice::<serde_json::Value>(&raw).is_err());

    let mut reader = wired_cache("Packed", &connector);
    assert!(reader.load(false).expect("load"));
    assert_eq!(reader.entries(), entries.as_slice());
}

#[test]
fn empty_cache_store_and_load() {
    let dir = tempdir().expect("tempdir");
    let connector = connector(dir.path(), SerializerKind::Json);
    let mut cache = wired_cache("Empty", &connector);

    assert!(cache.store().expect("store"));
    let path = connector
        .resolve_storage_name("Empty", PersistenceDataType::Historian)
        .expect("path");
    assert!(!path.exists());

    assert!(!cache.load(false).expect("load"));
    assert_eq!(cache.len(), 0);
}

#[test]
fn missing_file_loads_empty() {
    let dir = tempdir().expect("tempdir");
    let connector = connector(dir.path(), SerializerKind::Json);
    let mut cache = wired_cache("NeverStored", &connector);

    assert!(!cache.load(true).expect("load"));
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.approx_memory_usage(), 0);
}

#[test]
fn corrupt_file_is_an_error_and_leaves_cache_usable() {
    let dir = tempdir().expect("tempdir");
    let connector = connector(dir.path(), SerializerKind::Json);
    let path = connector
        .resolve_storage_name("Broken", PersistenceDataType::Historian)
        .expect("path");
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(&path, b"[{\"timestamp\":").expect("write");

    let mut cache = wired_cache("Broken", &connector);
    assert!(cache.load(false).is_err());
    assert_eq!(cache.len(), 0);

    cache.add_many(mixed_entries());
    assert!(cache.store().expect("store after failure"));
    assert!(cache.load(false).expect("reload"));
    assert_eq!(cache.len(), 4);
}

#[test]
fn replay_follows_ingest_order_not_timestamps() {
    let base = datetime!(2026-06-01 08:00 UTC);
    let mut cache = HistorianCache::new("Unordered").expect("cache");
    for offset in [30, 10, 20] {
        cache.add(CacheEntry::new(
            SensorData::new("temp", offset as f32).at(base + Duration::seconds(offset)),
        ));
    }
    let mut seen = Vec::new();
    while let Some(entry) = cache.next() {
        seen.push(entry.timestamp() - base);
    }
    assert_eq!(
        seen,
        vec![Duration::seconds(30), Duration::seconds(10), Duration::seconds(20)]
    );
}
