//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::shutdown::QuitSource;
use crate::app::state::AppState;
use crate::bootstrap::controller::{BootstrapController, BootstrapOutcome, PrimaryReady};
use crate::dashboard::Dashboard;
use crate::errors::AgentError;
use crate::journal::EventJournal;
use crate::server::serve::serve;
use crate::workers::monitor;

/// Run the spirit-box agent
pub async fn run(
    options: AppOptions,
    journal: EventJournal,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    info!("Initializing spirit-box...");

    let state = Arc::new(AppState::init(&options).await?);
    let result = run_with_state(&options, state, shutdown_signal).await;

    if let Err(e) = dump_journal(&options, &journal).await {
        error!("Failed to write the event journal: {}", e);
    }
    result
}

/// Run every enabled task on an already built state until a quit source fires
pub async fn run_with_state(
    options: &AppOptions,
    state: Arc<AppState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(options, state.clone(), &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start spirit-box: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    tokio::select! {
        _ = shutdown_signal => {
            state.quit.trigger(QuitSource::Signal);
            info!("Shutdown signal received, shutting down...");
        }
        source = state.quit.wait() => {
            info!("Quit requested by {:?}, shutting down...", source);
        }
    }

    // Shutdown
    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

async fn dump_journal(options: &AppOptions, journal: &EventJournal) -> Result<(), AgentError> {
    // With the dashboard up, nothing was logged to the terminal during the run
    if options.enable_dashboard {
        for entry in journal.entries() {
            println!("{}", entry.log_line());
        }
    }

    let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let file = options.storage.journal_file(&stamp);
    journal.write_json(&file).await?;
    info!("Event journal written to {}", file.path().display());
    Ok(())
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    state: Arc<AppState>,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), AgentError> {
    // The server has to hold the receiving end before bootstrap starts
    let (ready_tx, ready_rx) = oneshot::channel::<PrimaryReady>();

    if options.enable_server {
        init_server(options, state.clone(), ready_rx, shutdown_manager, shutdown_tx.subscribe()).await?;
    } else {
        drop(ready_rx);
    }

    if let Some(controller) = state.bootstrap.clone() {
        init_bootstrap(controller, state.clone(), ready_tx, shutdown_manager, shutdown_tx.subscribe())?;
    }

    init_monitor_worker(
        options.monitor.clone(),
        state.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    init_scheduler(state.clone(), shutdown_manager, shutdown_tx.subscribe())?;

    if options.enable_dashboard {
        init_dashboard(options, state, shutdown_manager, shutdown_tx.subscribe())?;
    }

    Ok(())
}

async fn init_server(
    options: &AppOptions,
    state: Arc<AppState>,
    ready_rx: oneshot::Receiver<PrimaryReady>,
    shutdown_manager: &mut ShutdownManager,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing status API server...");

    let server_handle = serve(
        &options.server,
        Arc::new(state.server_state()),
        Some(ready_rx),
        shutdown_rx,
    )
    .await?;

    shutdown_manager.with_server_handle(server_handle)?;
    Ok(())
}

fn init_bootstrap(
    controller: Arc<BootstrapController>,
    state: Arc<AppState>,
    ready_tx: oneshot::Sender<PrimaryReady>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing network bootstrap...");

    let task_controller = controller.clone();
    let bootstrap_handle = tokio::spawn(async move {
        let result = task_controller
            .run(
                ready_tx,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;

        if let Err(e) = &result {
            error!("Network bootstrap failed: {}", e);
            state.quit.trigger(QuitSource::Fatal);
        }
        result
    });

    shutdown_manager.with_bootstrap(controller, bootstrap_handle)?;
    Ok(())
}

fn init_monitor_worker(
    options: monitor::Options,
    state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing monitor worker...");

    let watcher = state.watcher.clone();
    let monitor_handle = tokio::spawn(async move {
        let ready = watcher.initialize_states().await;
        info!(
            "Initial unit pass done: {} units, ready={}",
            watcher.num_units().await,
            ready
        );

        monitor::run(
            &options,
            watcher.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_monitor_worker_handle(monitor_handle)?;
    Ok(())
}

fn init_scheduler(
    state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing script scheduler...");

    let scheduler = state.scheduler.clone();
    let scheduler_handle = tokio::spawn(async move {
        tokio::select! {
            _ = scheduler.run_priority_groups() => {}
            _ = shutdown_rx.recv() => {
                warn!("Script run interrupted by shutdown");
            }
        }
    });

    shutdown_manager.with_scheduler_handle(scheduler_handle)?;
    Ok(())
}

fn init_dashboard(
    options: &AppOptions,
    state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing dashboard...");

    let dashboard = Dashboard::new(
        options.dashboard.clone(),
        state.watcher.clone(),
        state.scheduler.clone(),
        state.bootstrap.as_ref().map(|b| b.subscribe()),
        state.quit.clone(),
    );
    let dashboard_handle = tokio::spawn(async move {
        dashboard
            .run(Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }))
            .await;
    });

    shutdown_manager.with_dashboard_handle(dashboard_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct BootstrapShutdownParams {
    controller: Arc<BootstrapController>,
    handle: JoinHandle<Result<BootstrapOutcome, AgentError>>,
}

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    bootstrap: Option<BootstrapShutdownParams>,
    server_handle: Option<JoinHandle<Result<(), AgentError>>>,
    monitor_worker_handle: Option<JoinHandle<()>>,
    scheduler_handle: Option<JoinHandle<()>>,
    dashboard_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            bootstrap: None,
            server_handle: None,
            monitor_worker_handle: None,
            scheduler_handle: None,
            dashboard_handle: None,
        }
    }

    pub fn with_bootstrap(
        &mut self,
        controller: Arc<BootstrapController>,
        handle: JoinHandle<Result<BootstrapOutcome, AgentError>>,
    ) -> Result<(), AgentError> {
        if self.bootstrap.is_some() {
            return Err(AgentError::ShutdownError("bootstrap already set".to_string()));
        }
        self.bootstrap = Some(BootstrapShutdownParams { controller, handle });
        Ok(())
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), AgentError>>,
    ) -> Result<(), AgentError> {
        if self.server_handle.is_some() {
            return Err(AgentError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub fn with_monitor_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), AgentError> {
        if self.monitor_worker_handle.is_some() {
            return Err(AgentError::ShutdownError("monitor_handle already set".to_string()));
        }
        self.monitor_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_scheduler_handle(&mut self, handle: JoinHandle<()>) -> Result<(), AgentError> {
        if self.scheduler_handle.is_some() {
            return Err(AgentError::ShutdownError("scheduler_handle already set".to_string()));
        }
        self.scheduler_handle = Some(handle);
        Ok(())
    }

    pub fn with_dashboard_handle(&mut self, handle: JoinHandle<()>) -> Result<(), AgentError> {
        if self.dashboard_handle.is_some() {
            return Err(AgentError::ShutdownError("dashboard_handle already set".to_string()));
        }
        self.dashboard_handle = Some(handle);
        Ok(())
    }

    /// Stop every task, then remove redirect rules that are still installed
    ///
    /// Rules are removed even if joining the tasks timed out.
    pub async fn shutdown(&mut self) -> Result<(), AgentError> {
        let _ = self.shutdown_tx.send(());

        let joined = match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.join_tasks(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, abandoning remaining tasks...",
                    self.lifecycle_options.max_shutdown_delay
                );
                Err(AgentError::ShutdownError("timed out joining tasks".to_string()))
            }
        };

        let teardown = match self.bootstrap.take() {
            Some(bootstrap) => bootstrap.controller.teardown().await,
            None => Ok(()),
        };

        info!("Shutdown complete");
        joined.and(teardown)
    }

    async fn join_tasks(&mut self) -> Result<(), AgentError> {
        info!("Shutting down spirit-box...");

        // 1. Dashboard
        if let Some(handle) = self.dashboard_handle.take() {
            handle.await.map_err(|e| AgentError::ShutdownError(e.to_string()))?;
        }

        // 2. Script scheduler
        if let Some(handle) = self.scheduler_handle.take() {
            handle.await.map_err(|e| AgentError::ShutdownError(e.to_string()))?;
        }

        // 3. Monitor worker
        if let Some(handle) = self.monitor_worker_handle.take() {
            handle.await.map_err(|e| AgentError::ShutdownError(e.to_string()))?;
        }

        // 4. Network bootstrap, whose error is the reason for a fatal quit
        let mut bootstrap_result = Ok(());
        if let Some(bootstrap) = self.bootstrap.as_mut() {
            let outcome = (&mut bootstrap.handle)
                .await
                .map_err(|e| AgentError::ShutdownError(e.to_string()))?;
            bootstrap_result = outcome.map(|outcome| info!("Network bootstrap ended: {:?}", outcome));
        }

        // 5. Server
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| AgentError::ShutdownError(e.to_string()))??;
        }

        bootstrap_result
    }
}
