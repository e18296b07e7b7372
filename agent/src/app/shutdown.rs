//! Process-wide quit signal

use std::sync::OnceLock;

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Who asked the agent to quit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuitSource {
    /// The status API's quit endpoint
    Api,

    /// The dashboard exited
    Dashboard,

    /// SIGINT / SIGTERM
    Signal,

    /// A task hit an unrecoverable error
    Fatal,
}

/// Quit latch shared by every quit source
///
/// Only the first trigger counts; later ones are no-ops.
#[derive(Debug, Default)]
pub struct QuitSignal {
    fired: OnceLock<QuitSource>,
    notify: Notify,
}

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns true if this call was the first.
    pub fn trigger(&self, source: QuitSource) -> bool {
        if self.fired.set(source).is_ok() {
            info!("Quit requested by {:?}", source);
            self.notify.notify_waiters();
            true
        } else {
            debug!("Quit already requested, ignoring {:?}", source);
            false
        }
    }

    pub fn source(&self) -> Option<QuitSource> {
        self.fired.get().copied()
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.get().is_some()
    }

    /// Wait until the signal fires and return the winning source
    pub async fn wait(&self) -> QuitSource {
        loop {
            let notified = self.notify.notified();
            if let Some(source) = self.source() {
                return source;
            }
            notified.await;
        }
    }
}
