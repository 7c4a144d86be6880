use std::sync::{Arc, Barrier};
use std::thread;

use historian::data::{SensorData, SystemPerformanceData};
use historian::{
    DataStorer, HistorianConfig, HistorianManager, PlaybackDirection, Record,
    ResourceDescriptor,
};
use tempfile::tempdir;
use time::macros::datetime;
use time::Duration;

fn config(root: &std::path::Path) -> HistorianConfig {
    HistorianConfig {
        root_path: root.to_path_buf(),
        ..HistorianConfig::default()
    }
}

#[test]
fn concurrent_get_or_create_shares_one_player() {
    let dir = tempdir().expect("tempdir");
    let manager = Arc::new(HistorianManager::new(config(dir.path())).expect("manager"));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.get_or_create_player("Shared", false).expect("player")
            })
        })
        .collect();
    let players: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("join"))
        .collect();

    for player in &players[1..] {
        assert!(Arc::ptr_eq(&players[0], player));
    }
    assert_eq!(manager.cache_names(), vec!["Shared".to_string()]);
}

#[test]
fn players_persist_across_managers() {
    let dir = tempdir().expect("tempdir");
    let base = datetime!(2026-08-01 00:00 UTC);
    {
        let manager = HistorianManager::new(config(dir.path())).expect("manager");
        let player = manager.get_or_create_player("Line1", false).expect("player");
        assert!(player.is_cache_filling_enabled());
        for i in 0..4 {
            assert!(player.handle_sensor_data(
                &SensorData::new("temp", i as f32).at(base + Duration::seconds(i))
            ));
        }
        manager.shutdown();
    }

    let manager = HistorianManager::new(config(dir.path())).expect("manager");
    assert_eq!(
        manager.loadable_cache_names().expect("names"),
        vec!["Line1".to_string()]
    );
    let player = manager.get_or_create_player("Line1.json", true).expect("player");
    assert_eq!(player.cache_size(), 4);
    assert!(!player.needs_cache_load());
    assert_eq!(
        player.storage_file_name(),
        Some(dir.path().join("PDT").join("historianCache").join("Line1.json"))
    );
}

#[test]
fn total_memory_is_sum_of_players() {
    let dir = tempdir().expect("tempdir");
    let manager = HistorianManager::new(config(dir.path())).expect("manager");
    let a = manager.get_or_create_player("A", false).expect("a");
    let b = manager.create_player().expect("generated");
    assert!(b.name().starts_with("PDT_HistorianCache_"));

    a.handle_sensor_data(&SensorData::new("temp", 1.0));
    b.handle_sensor_data(&SensorData::new("temp", 2.0));
    b.handle_sensor_data(&SensorData::new("temp", 3.0));

    let expected = a.approx_memory_usage() + b.approx_memory_usage();
    assert!(expected > 0);
    assert_eq!(manager.total_memory_usage(), expected);

    assert!(manager.remove_player("A"));
    assert!(!manager.remove_player("A"));
    assert_eq!(manager.total_memory_usage(), b.approx_memory_usage());
}

#[test]
fn replay_direction_and_state_queries() {
    let dir = tempdir().expect("tempdir");
    let manager = HistorianManager::new(config(dir.path())).expect("manager");
    let player = manager.get_or_create_player("Dir", false).expect("player");
    player.handle_sensor_data(&SensorData::new("temp", 1.0));

    assert!(manager.set_replay_direction("Dir", PlaybackDirection::Reverse));
    assert_eq!(player.direction(), PlaybackDirection::Reverse);
    assert!(!manager.set_replay_direction("Missing", PlaybackDirection::Reverse));

    assert!(!manager.is_cache_replaying("Dir"));
    assert!(player.play());
    assert!(manager.is_cache_replaying("Dir"));
    assert!(player.stop());
    assert!(!manager.is_cache_replaying("Dir"));
}

#[test]
fn invalid_root_path_keeps_previous_config() {
    let dir = tempdir().expect("tempdir");
    let manager = HistorianManager::new(config(dir.path())).expect("manager");
    let before = manager.cache_file_path();

    for bad in [".", "..", "...", ""] {
        assert!(!manager.set_root_file_path(bad), "accepted {bad:?}");
    }
    assert!(!manager.set_root_file_path(dir.path().join("does-not-exist")));
    assert_eq!(manager.root_path(), dir.path());
    assert_eq!(manager.cache_file_path(), before);
}

#[test]
fn moving_root_redirects_open_players() {
    let first = tempdir().expect("first");
    let second = tempdir().expect("second");
    let manager = HistorianManager::new(config(first.path())).expect("manager");
    let player = manager.get_or_create_player("Moved", false).expect("player");
    player.handle_sensor_data(&SensorData::new("temp", 1.0));

    assert!(manager.set_root_file_path(second.path()));
    assert_eq!(manager.root_path(), second.path());
    assert_eq!(player.cache_size(), 1);
    assert!(player.store_cache().expect("store"));

    let moved = second.path().join("PDT").join("historianCache").join("Moved.json");
    assert!(moved.exists());
    assert_eq!(player.storage_file_name(), Some(moved));
    assert!(!first
        .path()
        .join("PDT")
        .join("historianCache")
        .join("Moved.json")
        .exists());
}

#[test]
fn loaded_cache_is_rewritten_at_new_root() {
    let first = tempdir().expect("first");
    let second = tempdir().expect("second");
    {
        let manager = HistorianManager::new(config(first.path())).expect("manager");
        let player = manager.get_or_create_player("Reloaded", false).expect("player");
        player.handle_sensor_data(&SensorData::new("temp", 1.0));
        assert!(player.store_cache().expect("store"));
        manager.shutdown();
    }

    let manager = HistorianManager::new(config(first.path())).expect("manager");
    let player = manager.get_or_create_player("Reloaded", true).expect("player");
    assert_eq!(player.cache_size(), 1);
    assert_eq!(player.new_entry_count(), 0);

    assert!(manager.set_root_file_path(second.path()));
    assert!(player.store_cache().expect("store at new root"));
    let moved = second
        .path()
        .join("PDT")
        .join("historianCache")
        .join("Reloaded.json");
    assert!(moved.exists());
}

#[test]
fn range_queries_pass_through_to_connector() {
    let dir = tempdir().expect("tempdir");
    let manager = HistorianManager::new(config(dir.path())).expect("manager");
    let connector = manager.connector().expect("connector");
    let resource = ResourceDescriptor::new("dev-7").at_location("hall");
    let base = datetime!(2026-08-10 23:59:58 UTC);
    for i in 0..4 {
        let sample = SystemPerformanceData::new("sys", i as f32, 0.0, 0.0)
            .at(base + Duration::seconds(i));
        connector
            .store_system_performance_data(&resource, &sample)
            .expect("append");
    }

    let window = manager
        .load_system_performance_data(
            &resource,
            base + Duration::seconds(1),
            base + Duration::seconds(3),
        )
        .expect("range");
    let cpu: Vec<f32> = window.iter().map(|s| s.cpu_util).collect();
    assert_eq!(cpu, vec![1.0, 2.0, 3.0]);

    assert!(manager
        .load_system_performance_data(&resource, base + Duration::seconds(3), base)
        .is_err());
    assert!(manager
        .load_sensor_data(&resource, base, base + Duration::seconds(3))
        .expect("empty range")
        .is_empty());
}
