//! Terminal dashboard
//!
//! Shows the watched units, the script schedule and the bootstrap state.
//! Keys are handled one at a time in raw mode and the current screen is
//! redrawn after every key and on each tick.

pub mod app;
pub mod events;
pub mod screen;
pub mod ui;

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::app::shutdown::{QuitSignal, QuitSource};
use crate::bootstrap::fsm::BootstrapState;
use crate::dashboard::app::App;
use crate::dashboard::events::{Event, EventHandler};
use crate::device::collect_device_info;
use crate::monitor::watcher::UnitWatcher;
use crate::scripts::scheduler::ScriptScheduler;

/// Dashboard options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interface whose address is shown in the header
    pub interface: String,

    /// Redraw interval when no key arrives
    pub refresh_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            refresh_interval: Duration::from_secs(1),
        }
    }
}

pub struct Dashboard {
    options: Options,
    app: App,
    quit: Arc<QuitSignal>,
}

impl Dashboard {
    pub fn new(
        options: Options,
        watcher: Arc<UnitWatcher>,
        scheduler: Arc<ScriptScheduler>,
        bootstrap: Option<watch::Receiver<BootstrapState>>,
        quit: Arc<QuitSignal>,
    ) -> Self {
        let device = collect_device_info(&options.interface);
        Self {
            app: App::new(watcher, scheduler, bootstrap, device),
            options,
            quit,
        }
    }

    /// Take over the terminal until the user leaves or shutdown fires
    pub async fn run(self, shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>) {
        // Restore terminal on panic
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
            original_hook(panic_info);
        }));

        let mut terminal = match setup_terminal() {
            Ok(terminal) => terminal,
            Err(e) => {
                error!("Failed to set up the dashboard terminal: {}", e);
                self.quit.trigger(QuitSource::Dashboard);
                return;
            }
        };

        let events = EventHandler::new(self.options.refresh_interval);
        let quit = self.quit.clone();
        let result = self.run_with(&mut terminal, events, shutdown_signal).await;

        if let Err(e) = restore_terminal(&mut terminal) {
            error!("Failed to restore the terminal: {}", e);
        }
        if let Err(e) = result {
            error!("Dashboard failed: {}", e);
            quit.trigger(QuitSource::Dashboard);
        }
    }

    /// Draw and handle events until the user leaves, input ends or shutdown fires
    pub async fn run_with<B: Backend>(
        mut self,
        terminal: &mut Terminal<B>,
        mut events: EventHandler,
        mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
    ) -> io::Result<()> {
        info!("Dashboard starting on {}", self.app.device.label());

        let result = loop {
            self.app.refresh().await;
            if let Err(e) = terminal.draw(|f| ui::draw(f, &self.app)) {
                break Err(e);
            }

            tokio::select! {
                _ = &mut shutdown_signal => {
                    debug!("Dashboard shutting down...");
                    break Ok(());
                }
                event = events.next() => match event {
                    Some(Event::Key(key)) => {
                        if !self.app.handle_key(key).await {
                            self.quit.trigger(QuitSource::Dashboard);
                            break Ok(());
                        }
                    }
                    Some(Event::Tick) | Some(Event::Resize(_, _)) => {}
                    None => {
                        info!("Dashboard input closed");
                        self.quit.trigger(QuitSource::Dashboard);
                        break Ok(());
                    }
                },
            }
        };

        events.shutdown();
        result
    }
}

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

fn restore_terminal<B: Backend + io::Write>(terminal: &mut Terminal<B>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, crossterm::cursor::Show)?;
    Ok(())
}
