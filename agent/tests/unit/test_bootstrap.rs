//! Network bootstrap tests

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_test::assert_ok;

use spirit_box::bootstrap::controller::{BootstrapController, BootstrapOutcome, Options};
use spirit_box::bootstrap::firewall::{FirewallError, RedirectRule};
use spirit_box::bootstrap::fsm::BootstrapState;
use spirit_box::errors::AgentError;

use crate::fakes::{FakeFirewall, FakeProber};

fn options() -> Options {
    Options {
        probe_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

fn never() -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(std::future::pending())
}

const PUBLIC_TO_PRIMARY: RedirectRule = RedirectRule {
    from_port: 80,
    to_port: 8080,
};
const TEMP_TO_PUBLIC: RedirectRule = RedirectRule {
    from_port: 8081,
    to_port: 80,
};

#[tokio::test]
async fn test_rules_follow_configured_ports() {
    let controller = BootstrapController::new(
        Options {
            public_port: 8000,
            primary_port: 9000,
            temp_port: 9001,
            ..options()
        },
        Arc::new(FakeFirewall::new()),
        Arc::new(FakeProber::silent()),
    );
    assert_eq!(
        controller.rules(),
        [RedirectRule::new(8000, 9000), RedirectRule::new(9001, 8000)]
    );
    assert_eq!(controller.state(), BootstrapState::Installing);
}

#[tokio::test]
async fn test_settles_after_primary_answers() {
    let firewall = Arc::new(FakeFirewall::new());
    let prober = Arc::new(FakeProber::answering_after(2, 404));
    let controller = Arc::new(BootstrapController::new(options(), firewall.clone(), prober.clone()));
    let mut states = controller.subscribe();

    let (ready_tx, ready_rx) = oneshot::channel();
    let handle = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run(ready_tx, never()).await })
    };

    // Acting as the server loop
    let ready = ready_rx.await.unwrap();
    assert_eq!(controller.state(), BootstrapState::Swapping);
    assert!(firewall.rules().is_empty());
    assert!(controller.installed_rules().await.is_empty());
    assert_eq!(prober.calls(), 3);
    ready.acknowledge();

    let outcome = assert_ok!(handle.await.unwrap());
    assert_eq!(outcome, BootstrapOutcome::Settled);
    assert_eq!(controller.state(), BootstrapState::Settled);
    assert_eq!(firewall.removals(), vec![PUBLIC_TO_PRIMARY, TEMP_TO_PUBLIC]);

    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), BootstrapState::Settled);
}

#[tokio::test]
async fn test_rules_installed_while_probing() {
    let firewall = Arc::new(FakeFirewall::new());
    let controller = Arc::new(BootstrapController::new(
        options(),
        firewall.clone(),
        Arc::new(FakeProber::silent()),
    ));

    let (ready_tx, _ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .run(
                    ready_tx,
                    Box::pin(async move {
                        let _ = stop_rx.await;
                    }),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(controller.state(), BootstrapState::Probing);
    assert_eq!(firewall.rules(), vec![PUBLIC_TO_PRIMARY, TEMP_TO_PUBLIC]);

    stop_tx.send(()).unwrap();
    let outcome = assert_ok!(handle.await.unwrap());
    assert_eq!(outcome, BootstrapOutcome::Cancelled);

    // Shutdown cleans up what cancellation left behind
    assert_eq!(controller.installed_rules().await.len(), 2);
    assert_ok!(controller.teardown().await);
    assert!(firewall.rules().is_empty());
    assert!(controller.installed_rules().await.is_empty());
}

#[tokio::test]
async fn test_install_failure_is_fatal() {
    let firewall = Arc::new(FakeFirewall::new());
    firewall.fail_add(TEMP_TO_PUBLIC);
    let prober = Arc::new(FakeProber::answering_after(0, 200));
    let controller = BootstrapController::new(options(), firewall.clone(), prober.clone());

    let (ready_tx, _ready_rx) = oneshot::channel();
    let err = controller.run(ready_tx, never()).await.unwrap_err();

    assert!(matches!(err, AgentError::Firewall(FirewallError::Add { rule, .. }) if rule == TEMP_TO_PUBLIC));
    assert_eq!(prober.calls(), 0);
    assert_eq!(controller.state(), BootstrapState::Installing);
    assert_eq!(controller.installed_rules().await, vec![PUBLIC_TO_PRIMARY]);

    assert_ok!(controller.teardown().await);
    assert!(firewall.rules().is_empty());
}

#[tokio::test]
async fn test_removal_failure_stops_before_second_rule() {
    let firewall = Arc::new(FakeFirewall::new());
    firewall.fail_remove(Some(PUBLIC_TO_PRIMARY));
    let controller = BootstrapController::new(
        options(),
        firewall.clone(),
        Arc::new(FakeProber::answering_after(0, 500)),
    );

    let (ready_tx, ready_rx) = oneshot::channel();
    let err = controller.run(ready_tx, never()).await.unwrap_err();

    assert!(matches!(err, AgentError::Firewall(FirewallError::Remove { .. })));
    assert_eq!(firewall.removals(), vec![PUBLIC_TO_PRIMARY]);
    assert_eq!(firewall.rules(), vec![PUBLIC_TO_PRIMARY, TEMP_TO_PUBLIC]);
    assert_eq!(controller.state(), BootstrapState::Probing);
    // The server is never told to restart
    assert!(ready_rx.await.is_err());
}

#[tokio::test]
async fn test_teardown_reports_removal_errors() {
    let firewall = Arc::new(FakeFirewall::new());
    let controller = Arc::new(BootstrapController::new(
        options(),
        firewall.clone(),
        Arc::new(FakeProber::silent()),
    ));

    let (ready_tx, _ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .run(ready_tx, Box::pin(async move {
                    let _ = stop_rx.await;
                }))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    stop_tx.send(()).unwrap();
    assert_ok!(handle.await.unwrap());

    firewall.fail_remove(Some(PUBLIC_TO_PRIMARY));
    assert!(controller.teardown().await.is_err());
    // The other rule is still removed
    assert_eq!(firewall.rules(), vec![PUBLIC_TO_PRIMARY]);
    assert_eq!(controller.installed_rules().await, vec![PUBLIC_TO_PRIMARY]);

    firewall.fail_remove(None);
    assert_ok!(controller.teardown().await);
    assert!(firewall.rules().is_empty());
}

#[tokio::test]
async fn test_settles_without_a_listener() {
    let firewall = Arc::new(FakeFirewall::new());
    let controller = BootstrapController::new(
        options(),
        firewall.clone(),
        Arc::new(FakeProber::answering_after(0, 200)),
    );

    let (ready_tx, ready_rx) = oneshot::channel();
    drop(ready_rx);

    let outcome = assert_ok!(controller.run(ready_tx, never()).await);
    assert_eq!(outcome, BootstrapOutcome::Settled);
    assert!(firewall.rules().is_empty());
}

#[tokio::test]
async fn test_dropped_ready_signal_still_settles() {
    let controller = Arc::new(BootstrapController::new(
        options(),
        Arc::new(FakeFirewall::new()),
        Arc::new(FakeProber::answering_after(0, 200)),
    ));

    let (ready_tx, ready_rx) = oneshot::channel();
    let handle = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run(ready_tx, never()).await })
    };
    drop(ready_rx.await.unwrap());

    let outcome = assert_ok!(handle.await.unwrap());
    assert_eq!(outcome, BootstrapOutcome::Settled);
}

#[tokio::test]
async fn test_preexisting_rules_are_left_alone() {
    let other = RedirectRule::new(443, 8443);
    let firewall = Arc::new(FakeFirewall::with_rules(&[other]));
    let controller = BootstrapController::new(
        options(),
        firewall.clone(),
        Arc::new(FakeProber::answering_after(1, 200)),
    );

    let (ready_tx, ready_rx) = oneshot::channel();
    drop(ready_rx);
    assert_ok!(controller.run(ready_tx, never()).await);

    assert_eq!(firewall.rules(), vec![other]);
}
