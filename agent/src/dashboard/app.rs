//! Dashboard state: navigation, unit entry and cached views for drawing

use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::bootstrap::fsm::BootstrapState;
use crate::dashboard::screen::{Command, Effect, Navigator, Screen};
use crate::device::DeviceInfo;
use crate::monitor::unit::WatcherSnapshot;
use crate::monitor::watcher::UnitWatcher;
use crate::scripts::scheduler::ScriptScheduler;
use crate::scripts::script::ScheduleRun;

pub struct App {
    watcher: Arc<UnitWatcher>,
    scheduler: Arc<ScriptScheduler>,
    bootstrap_rx: Option<watch::Receiver<BootstrapState>>,

    pub nav: Navigator,
    pub device: DeviceInfo,
    /// Unit name being typed after `/`, `None` when not entering one
    pub unit_entry: Option<String>,

    // Refreshed before every draw
    pub units: Arc<WatcherSnapshot>,
    pub elapsed: Duration,
    pub scripts: ScheduleRun,
    pub bootstrap: Option<BootstrapState>,
}

impl App {
    pub fn new(
        watcher: Arc<UnitWatcher>,
        scheduler: Arc<ScriptScheduler>,
        bootstrap_rx: Option<watch::Receiver<BootstrapState>>,
        device: DeviceInfo,
    ) -> Self {
        Self {
            watcher,
            scheduler,
            bootstrap_rx,
            nav: Navigator::new(),
            device,
            unit_entry: None,
            units: Arc::new(WatcherSnapshot::empty()),
            elapsed: Duration::ZERO,
            scripts: ScheduleRun::default(),
            bootstrap: None,
        }
    }

    /// Pull the latest snapshots from the watcher, scheduler and bootstrap
    pub async fn refresh(&mut self) {
        self.units = self.watcher.snapshot().await;
        self.elapsed = self.watcher.elapsed();
        self.scripts = self.scheduler.snapshot().await;
        self.bootstrap = self.bootstrap_rx.as_ref().map(|rx| *rx.borrow());
    }

    /// Handle a key press. Returns false when the dashboard should exit.
    pub async fn handle_key(&mut self, key: KeyEvent) -> bool {
        let Some(command) = self.command_for(key) else {
            return true;
        };

        let num_units = self.watcher.num_units().await;
        match self.nav.apply(command, num_units) {
            Effect::None => true,
            Effect::Quit => false,
            Effect::AddUnit(name) => {
                if self.watcher.add_unit(&name).await {
                    info!("Now watching {}", name);
                }
                true
            }
        }
    }

    fn command_for(&mut self, key: KeyEvent) -> Option<Command> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Command::Quit);
        }

        if let Some(entry) = self.unit_entry.as_mut() {
            match key.code {
                KeyCode::Enter => {
                    let name = entry.trim().to_string();
                    self.unit_entry = None;
                    return (!name.is_empty()).then_some(Command::AddUnit(name));
                }
                KeyCode::Esc | KeyCode::Char('/') => self.unit_entry = None,
                KeyCode::Backspace => {
                    entry.pop();
                }
                KeyCode::Char(c) => entry.push(c),
                _ => {}
            }
            return None;
        }

        match key.code {
            KeyCode::Char('j') | KeyCode::Down => Some(Command::Down),
            KeyCode::Char('k') | KeyCode::Up => Some(Command::Up),
            KeyCode::Enter => Some(Command::Select),
            KeyCode::Char('q') | KeyCode::Esc => Some(Command::Back),
            KeyCode::Char('/') if self.nav.screen() == Screen::Units => {
                self.unit_entry = Some(String::new());
                None
            }
            KeyCode::Char(c) => match c.to_digit(10) {
                Some(n) if n > 0 => Some(Command::Jump(n as usize)),
                _ => {
                    debug!("Ignoring key {:?}", key.code);
                    None
                }
            },
            _ => None,
        }
    }
}
