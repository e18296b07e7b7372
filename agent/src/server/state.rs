//! Server state

use std::sync::Arc;

use tokio::sync::watch;

use crate::app::shutdown::QuitSignal;
use crate::bootstrap::fsm::BootstrapState;
use crate::monitor::watcher::UnitWatcher;
use crate::scripts::scheduler::ScriptScheduler;

/// Server state shared across handlers
pub struct ServerState {
    pub watcher: Arc<UnitWatcher>,
    pub scheduler: Arc<ScriptScheduler>,
    pub quit: Arc<QuitSignal>,

    /// Bootstrap progress, absent when bootstrap is disabled
    pub bootstrap: Option<watch::Receiver<BootstrapState>>,
}

impl ServerState {
    pub fn new(
        watcher: Arc<UnitWatcher>,
        scheduler: Arc<ScriptScheduler>,
        quit: Arc<QuitSignal>,
        bootstrap: Option<watch::Receiver<BootstrapState>>,
    ) -> Self {
        Self {
            watcher,
            scheduler,
            quit,
            bootstrap,
        }
    }
}
