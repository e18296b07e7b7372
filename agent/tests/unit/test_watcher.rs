//! Unit watcher tests

use std::sync::Arc;

use spirit_box::monitor::unit::{DesiredMode, NOT_FOUND};
use spirit_box::monitor::watcher::UnitWatcher;

use crate::fakes::FakeServiceManager;

fn watcher() -> (Arc<FakeServiceManager>, UnitWatcher) {
    let manager = Arc::new(FakeServiceManager::new());
    let watcher = UnitWatcher::new(manager.clone());
    (manager, watcher)
}

#[tokio::test]
async fn test_num_units_is_a_set_count() {
    let (_, watcher) = watcher();
    assert!(watcher.add_unit("nginx.service").await);
    assert!(watcher.add_unit("ssh.service").await);
    assert!(!watcher.add_unit("nginx.service").await);
    assert!(!watcher.add_unit_with_mode("ssh.service", DesiredMode::WatchOnly).await);
    assert!(!watcher.add_unit("  ").await);

    assert_eq!(watcher.num_units().await, 2);
}

#[tokio::test]
async fn test_empty_watch_set_is_ready() {
    let (_, watcher) = watcher();
    assert!(watcher.initialize_states().await);
    assert!(watcher.snapshot().await.units.is_empty());
}

#[tokio::test]
async fn test_aggregate_ignores_watch_only_units() {
    let (manager, watcher) = watcher();
    manager.set("a.service", "active", "running");
    manager.set("b.service", "active", "running");
    manager.set("c.service", "inactive", "dead");

    watcher.add_unit("a.service").await;
    watcher.add_unit("b.service").await;
    watcher.add_unit_with_mode("c.service", DesiredMode::WatchOnly).await;

    assert!(watcher.initialize_states().await);

    let snapshot = watcher.snapshot().await;
    assert!(snapshot.all_ready);
    assert!(snapshot.started_at.is_some());
    assert!(!snapshot.unit("c.service").unwrap().is_ready());
}

#[tokio::test]
async fn test_activating_unit_blocks_readiness() {
    let (manager, watcher) = watcher();
    manager.set("a.service", "active", "running");
    manager.set("b.service", "activating", "start");
    watcher.add_unit("a.service").await;
    watcher.add_unit("b.service").await;

    assert!(!watcher.initialize_states().await);

    manager.set("b.service", "active", "running");
    assert!(watcher.update_all().await);
}

#[tokio::test]
async fn test_update_all_is_idempotent() {
    let (manager, watcher) = watcher();
    manager.set("a.service", "active", "running");
    manager.set("b.service", "failed", "failed");
    watcher.add_unit("a.service").await;
    watcher.add_unit("b.service").await;
    watcher.initialize_states().await;

    let first = watcher.update_all().await;
    let first_units = watcher.snapshot().await.units.clone();
    let second = watcher.update_all().await;
    let second_units = watcher.snapshot().await.units.clone();

    assert_eq!(first, second);
    assert_eq!(first_units, second_units);
}

#[tokio::test]
async fn test_units_keep_insertion_order() {
    let (manager, watcher) = watcher();
    manager.set("z.service", "active", "running");
    manager.set("a.service", "active", "running");
    watcher.add_unit("z.service").await;
    watcher.add_unit("a.service").await;
    watcher.initialize_states().await;

    let names: Vec<String> = watcher
        .snapshot()
        .await
        .units
        .iter()
        .map(|u| u.name().to_string())
        .collect();
    assert_eq!(names, vec!["z.service", "a.service"]);
}

#[tokio::test]
async fn test_unknown_unit_is_not_found_without_failing_others() {
    let (manager, watcher) = watcher();
    manager.set("a.service", "active", "running");
    watcher.add_unit("a.service").await;
    watcher.add_unit("ghost.service").await;

    assert!(!watcher.initialize_states().await);

    let snapshot = watcher.snapshot().await;
    let ghost = snapshot.unit("ghost.service").unwrap();
    assert_eq!(ghost.load_state(), NOT_FOUND);
    assert!(!ghost.is_ready());
    assert!(ghost.properties().is_empty());

    let a = snapshot.unit("a.service").unwrap();
    assert!(a.is_ready());
    assert_eq!(a.description(), "a.service description");
}

#[tokio::test]
async fn test_unit_removed_mid_run_becomes_not_found() {
    let (manager, watcher) = watcher();
    manager.set("a.service", "active", "running");
    watcher.add_unit("a.service").await;
    assert!(watcher.initialize_states().await);

    manager.remove("a.service");
    assert!(!watcher.update_all().await);
    assert!(watcher.snapshot().await.unit("a.service").unwrap().is_not_found());
}

#[tokio::test]
async fn test_listing_failure_marks_every_unit_not_found() {
    let (manager, watcher) = watcher();
    manager.set("a.service", "active", "running");
    watcher.add_unit("a.service").await;
    manager.fail_listing(true);

    assert!(!watcher.initialize_states().await);
    assert!(watcher.snapshot().await.unit("a.service").unwrap().is_not_found());

    manager.fail_listing(false);
    assert!(watcher.update_all().await);
}

#[tokio::test]
async fn test_unlisted_unit_read_from_properties() {
    let (manager, watcher) = watcher();
    manager.set_unlisted("timer.service", "inactive", "dead");
    watcher.add_unit("timer.service").await;
    watcher.initialize_states().await;

    let snapshot = watcher.snapshot().await;
    let unit = snapshot.unit("timer.service").unwrap();
    assert_eq!(unit.load_state(), "loaded");
    assert_eq!(unit.active_state(), "inactive");
    assert_eq!(unit.description(), "timer.service properties");
}

#[tokio::test]
async fn test_unit_added_after_start_joins_next_pass() {
    let (manager, watcher) = watcher();
    manager.set("a.service", "active", "running");
    manager.set("b.service", "activating", "start");
    watcher.add_unit("a.service").await;
    assert!(watcher.initialize_states().await);

    assert!(watcher.add_unit("b.service").await);
    assert_eq!(watcher.num_units().await, 2);
    // Not queried yet
    assert_eq!(watcher.snapshot().await.units.len(), 1);

    assert!(!watcher.update_all().await);
    assert_eq!(watcher.snapshot().await.units.len(), 2);
}

#[tokio::test]
async fn test_one_listing_per_pass() {
    let (manager, watcher) = watcher();
    for name in ["a.service", "b.service", "c.service"] {
        manager.set(name, "active", "running");
        watcher.add_unit(name).await;
    }

    watcher.initialize_states().await;
    watcher.update_all().await;
    assert_eq!(manager.list_calls(), 2);
}

#[tokio::test]
async fn test_concurrent_passes_and_adds() {
    let (manager, watcher) = watcher();
    let watcher = Arc::new(watcher);
    manager.set("a.service", "active", "running");
    watcher.add_unit("a.service").await;
    watcher.initialize_states().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let watcher = watcher.clone();
        handles.push(tokio::spawn(async move {
            watcher.add_unit(&format!("extra-{}.service", i % 4)).await;
            watcher.update_all().await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    watcher.update_all().await;
    assert_eq!(watcher.num_units().await, 5);
    assert_eq!(watcher.snapshot().await.units.len(), 5);
}

#[tokio::test]
async fn test_unit_lookup_reads_latest_pass() {
    let (manager, watcher) = watcher();
    manager.set("a.service", "activating", "start");
    watcher.add_unit("a.service").await;

    assert!(watcher.unit("a.service").await.is_none());

    watcher.initialize_states().await;
    assert!(!watcher.unit("a.service").await.unwrap().is_ready());

    manager.set("a.service", "active", "running");
    watcher.update_all().await;
    assert!(watcher.unit("a.service").await.unwrap().is_ready());
    assert!(watcher.unit("b.service").await.is_none());
}

#[tokio::test]
async fn test_reinitialize_keeps_start_time() {
    let (manager, watcher) = watcher();
    manager.set("a.service", "active", "running");
    watcher.add_unit("a.service").await;

    assert_eq!(watcher.elapsed(), std::time::Duration::ZERO);
    watcher.initialize_states().await;
    let first = watcher.snapshot().await.started_at;

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    watcher.initialize_states().await;

    assert_eq!(watcher.snapshot().await.started_at, first);
    assert!(watcher.elapsed() >= std::time::Duration::from_millis(20));
}
