//! Monitor worker: periodic unit readiness passes

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, info};

use crate::monitor::watcher::UnitWatcher;

/// Monitor worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval between query passes
    pub interval: Duration,

    /// Upper bound on a single `systemctl` call
    pub query_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// Run the monitor worker
///
/// The watcher must already be initialized. Returns on shutdown.
pub async fn run<S, F>(
    options: &Options,
    watcher: &UnitWatcher,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Monitor worker starting...");
    let mut was_ready = watcher.snapshot().await.all_ready;

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Monitor worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        let ready = watcher.update_all().await;
        match (was_ready, ready) {
            (false, true) => info!(
                "All units are ready after {:.0}s",
                watcher.elapsed().as_secs_f64()
            ),
            (true, false) => info!("Units no longer ready"),
            _ => debug!("Unit pass complete, ready={}", ready),
        }
        was_ready = ready;
    }
}
