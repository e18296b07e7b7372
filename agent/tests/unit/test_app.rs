//! End-to-end run loop tests on fakes

use std::sync::Arc;
use std::time::Duration;

use spirit_box::app::options::AppOptions;
use spirit_box::app::run::run_with_state;
use spirit_box::app::shutdown::QuitSource;
use spirit_box::app::state::AppState;
use spirit_box::bootstrap::controller::{BootstrapController, Options as BootstrapOptions};
use spirit_box::bootstrap::firewall::RedirectRule;
use spirit_box::bootstrap::fsm::BootstrapState;
use spirit_box::errors::AgentError;
use spirit_box::filesys::dir::Dir;
use spirit_box::monitor::watcher::UnitWatcher;
use spirit_box::scripts::scheduler::ScriptScheduler;
use spirit_box::scripts::script::{Script, ScriptStatus};
use spirit_box::workers::monitor;

use crate::fakes::{write_script, FakeFirewall, FakeProber, FakeRunner, FakeServiceManager};

fn options() -> AppOptions {
    AppOptions {
        enable_server: false,
        enable_dashboard: false,
        monitor: monitor::Options {
            interval: Duration::from_millis(10),
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn state(
    manager: Arc<FakeServiceManager>,
    scripts: Vec<Script>,
    firewall: Arc<FakeFirewall>,
    prober: FakeProber,
) -> Arc<AppState> {
    let watcher = Arc::new(UnitWatcher::new(manager));
    watcher.add_unit("nginx.service").await;

    let scheduler = Arc::new(ScriptScheduler::new(Arc::new(FakeRunner::new()), scripts, None));
    let bootstrap = Arc::new(BootstrapController::new(
        BootstrapOptions {
            probe_interval: Duration::from_millis(10),
            ..Default::default()
        },
        firewall,
        Arc::new(prober),
    ));

    Arc::new(AppState::new(watcher, scheduler, Some(bootstrap)))
}

#[tokio::test]
async fn test_api_quit_tears_down_rules() {
    let manager = Arc::new(FakeServiceManager::new());
    manager.set("nginx.service", "activating", "start");
    let firewall = Arc::new(FakeFirewall::new());
    let state = state(manager.clone(), Vec::new(), firewall.clone(), FakeProber::silent()).await;

    let handle = {
        let state = state.clone();
        tokio::spawn(async move { run_with_state(&options(), state, std::future::pending()).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(firewall.rules().len(), 2);

    // The monitor keeps polling
    manager.set("nginx.service", "active", "running");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(state.watcher.snapshot().await.all_ready);

    state.quit.trigger(QuitSource::Api);
    handle.await.unwrap().unwrap();

    assert!(firewall.rules().is_empty());
    assert_eq!(state.quit.source(), Some(QuitSource::Api));
}

#[tokio::test]
async fn test_firewall_failure_is_fatal() {
    let manager = Arc::new(FakeServiceManager::new());
    let firewall = Arc::new(FakeFirewall::new());
    firewall.fail_add(RedirectRule::new(8081, 80));
    let state = state(manager, Vec::new(), firewall.clone(), FakeProber::silent()).await;

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        run_with_state(&options(), state.clone(), std::future::pending()),
    )
    .await
    .expect("run did not stop");

    assert!(matches!(result, Err(AgentError::Firewall(_))));
    assert_eq!(state.quit.source(), Some(QuitSource::Fatal));
    assert!(firewall.rules().is_empty());
}

#[tokio::test]
async fn test_signal_after_bring_up() {
    let manager = Arc::new(FakeServiceManager::new());
    manager.set("nginx.service", "active", "running");
    let dir = Dir::create_temp_dir("spirit-box-app").await.unwrap();
    write_script(&dir, "10-a.sh", "#!/bin/sh\n").await;
    write_script(&dir, "20-b.sh", "#!/bin/sh\n").await;
    let scripts = vec![
        Script::new(dir.path().join("10-a.sh"), 10),
        Script::new(dir.path().join("20-b.sh"), 20),
    ];
    let firewall = Arc::new(FakeFirewall::new());
    let state = state(manager, scripts, firewall.clone(), FakeProber::answering_after(1, 200)).await;

    let signal = tokio::time::sleep(Duration::from_millis(300));
    run_with_state(&options(), state.clone(), signal).await.unwrap();

    assert_eq!(state.quit.source(), Some(QuitSource::Signal));
    let run = state.scheduler.snapshot().await;
    assert!(run.finished);
    assert_eq!(run.count(ScriptStatus::Succeeded), 2);
    // No server, so the bootstrap settles once the primary answers
    assert_eq!(
        state.bootstrap.as_ref().unwrap().state(),
        BootstrapState::Settled
    );
    assert!(firewall.rules().is_empty());

    dir.delete().await.unwrap();
}
