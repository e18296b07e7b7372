//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::app::shutdown::QuitSignal;
use crate::bootstrap::controller::BootstrapController;
use crate::bootstrap::firewall::IptablesFirewall;
use crate::bootstrap::probe::HttpProber;
use crate::errors::AgentError;
use crate::monitor::systemctl::SystemctlManager;
use crate::monitor::watcher::UnitWatcher;
use crate::scripts::runner::CommandRunner;
use crate::scripts::scheduler::ScriptScheduler;
use crate::server::state::ServerState;

/// Main application state
pub struct AppState {
    /// Unit readiness monitor
    pub watcher: Arc<UnitWatcher>,

    /// Bring-up script scheduler
    pub scheduler: Arc<ScriptScheduler>,

    /// Network bootstrap, absent when disabled
    pub bootstrap: Option<Arc<BootstrapController>>,

    /// Quit latch shared with the API and the dashboard
    pub quit: Arc<QuitSignal>,
}

impl AppState {
    /// Initialize application state on the real service manager, shell and firewall
    pub async fn init(options: &AppOptions) -> Result<Self, AgentError> {
        info!("Initializing application state...");

        let manager = Arc::new(SystemctlManager::new(options.monitor.query_timeout));
        let watcher = Arc::new(UnitWatcher::new(manager));
        for unit in &options.units {
            watcher.add_unit_with_mode(&unit.name, unit.mode).await;
        }

        let scheduler =
            Arc::new(ScriptScheduler::discover(&options.scripts, Arc::new(CommandRunner)).await);

        let bootstrap = options.enable_bootstrap.then(|| {
            Arc::new(BootstrapController::new(
                options.bootstrap.clone(),
                Arc::new(IptablesFirewall::new(options.interface.clone())),
                Arc::new(HttpProber::default()),
            ))
        });

        Ok(Self::new(watcher, scheduler, bootstrap))
    }

    pub fn new(
        watcher: Arc<UnitWatcher>,
        scheduler: Arc<ScriptScheduler>,
        bootstrap: Option<Arc<BootstrapController>>,
    ) -> Self {
        Self {
            watcher,
            scheduler,
            bootstrap,
            quit: Arc::new(QuitSignal::new()),
        }
    }

    /// State handed to the status API
    pub fn server_state(&self) -> ServerState {
        ServerState::new(
            self.watcher.clone(),
            self.scheduler.clone(),
            self.quit.clone(),
            self.bootstrap.as_ref().map(|b| b.subscribe()),
        )
    }
}
