//! Unit watcher: tracks readiness of a set of service units

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::monitor::manager::{ServiceManager, UnitDescriptor};
use crate::monitor::unit::{all_ready, DesiredMode, Unit, WatcherSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
struct WatchEntry {
    name: String,
    mode: DesiredMode,
}

/// Tracks a watch set of units against the service manager
///
/// Query passes run one at a time and work on a copy of the watch set taken
/// when the pass starts. Each pass publishes a fresh immutable snapshot, so
/// readers never observe a half-updated unit list.
pub struct UnitWatcher {
    manager: Arc<dyn ServiceManager>,
    watch_set: Mutex<Vec<WatchEntry>>,
    pass_lock: Mutex<()>,
    snapshot: RwLock<Arc<WatcherSnapshot>>,
    /// Set by the first `initialize_states`, the origin of `elapsed`
    started: OnceLock<(Instant, DateTime<Utc>)>,
}

impl UnitWatcher {
    pub fn new(manager: Arc<dyn ServiceManager>) -> Self {
        Self {
            manager,
            watch_set: Mutex::new(Vec::new()),
            pass_lock: Mutex::new(()),
            snapshot: RwLock::new(Arc::new(WatcherSnapshot::empty())),
            started: OnceLock::new(),
        }
    }

    /// Add a unit that gates readiness. Returns false if it is already watched.
    pub async fn add_unit(&self, name: &str) -> bool {
        self.add_unit_with_mode(name, DesiredMode::Normal).await
    }

    /// Add a unit with an explicit mode. Returns false if it is already watched.
    pub async fn add_unit_with_mode(&self, name: &str, mode: DesiredMode) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }

        let mut watch_set = self.watch_set.lock().await;
        if watch_set.iter().any(|e| e.name == name) {
            debug!("Unit {} is already watched", name);
            return false;
        }

        info!("Watching unit {} ({:?})", name, mode);
        watch_set.push(WatchEntry {
            name: name.to_string(),
            mode,
        });
        true
    }

    /// Run the first query pass and start the elapsed clock
    pub async fn initialize_states(&self) -> bool {
        let _pass = self.pass_lock.lock().await;
        let units = self.query_pass().await;
        let ready = all_ready(&units);
        let (_, started_at) = *self.started.get_or_init(|| (Instant::now(), Utc::now()));

        info!("Initialized {} unit states", units.len());
        *self.snapshot.write().await = Arc::new(WatcherSnapshot {
            units,
            started_at: Some(started_at),
            all_ready: ready,
        });
        ready
    }

    /// Re-query every watched unit and return aggregate readiness
    pub async fn update_all(&self) -> bool {
        let _pass = self.pass_lock.lock().await;
        let units = self.query_pass().await;
        let ready = all_ready(&units);

        let mut slot = self.snapshot.write().await;
        let started_at = slot.started_at;
        *slot = Arc::new(WatcherSnapshot {
            units,
            started_at,
            all_ready: ready,
        });
        ready
    }

    /// Number of units in the watch set, including ones not yet queried
    pub async fn num_units(&self) -> usize {
        self.watch_set.lock().await.len()
    }

    /// Time since `initialize_states` completed
    pub fn elapsed(&self) -> Duration {
        self.started
            .get()
            .map(|(started, _)| started.elapsed())
            .unwrap_or_default()
    }

    /// Current snapshot of every unit
    pub async fn snapshot(&self) -> Arc<WatcherSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Look a unit up in the current snapshot
    pub async fn unit(&self, name: &str) -> Option<Unit> {
        self.snapshot.read().await.unit(name).cloned()
    }

    async fn query_pass(&self) -> Vec<Unit> {
        let entries = self.watch_set.lock().await.clone();
        let previous = self.snapshot.read().await.clone();

        let listing = match self.manager.list_units().await {
            Ok(listing) => Some(listing),
            Err(e) => {
                warn!("Unable to list units: {}", e);
                None
            }
        };

        let mut units = Vec::with_capacity(entries.len());
        for entry in &entries {
            let unit = match &listing {
                Some(listing) => self.query_unit(entry, listing).await,
                None => Unit::not_found(&entry.name, entry.mode),
            };

            if unit.is_not_found() {
                let was_found = previous
                    .unit(&entry.name)
                    .map(|u| !u.is_not_found())
                    .unwrap_or(true);
                if was_found && listing.is_some() {
                    warn!("Unit {} not found", entry.name);
                }
            }
            units.push(unit);
        }
        units
    }

    async fn query_unit(&self, entry: &WatchEntry, listing: &[UnitDescriptor]) -> Unit {
        let descriptor = listing.iter().find(|d| d.name == entry.name);

        let properties = match self.manager.get_unit_properties(&entry.name).await {
            Ok(properties) => properties,
            Err(e) => {
                debug!("Query for unit {} failed: {}", entry.name, e);
                return Unit::not_found(&entry.name, entry.mode);
            }
        };

        match descriptor {
            Some(d) => Unit::new(
                &entry.name,
                entry.mode,
                &d.load_state,
                &d.active_state,
                &d.sub_state,
                &d.description,
                properties,
            ),
            // Not loaded right now, so absent from the listing. The property
            // map carries the same states.
            None => {
                let field = |key: &str| {
                    properties
                        .get(key)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                };
                let (load, active, sub, description) = (
                    field("LoadState"),
                    field("ActiveState"),
                    field("SubState"),
                    field("Description"),
                );
                Unit::new(&entry.name, entry.mode, load, active, sub, description, properties)
            }
        }
    }
}
