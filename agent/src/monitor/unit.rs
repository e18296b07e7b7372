//! Watched unit model

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Load state reported for a unit the service manager could not answer for
pub const NOT_FOUND: &str = "not-found";

/// How a watched unit takes part in aggregate readiness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredMode {
    /// The unit must be ready before bring-up is complete
    #[default]
    Normal,

    /// Displayed and tracked, never gates aggregate readiness
    #[serde(alias = "watch")]
    WatchOnly,
}

/// One watched service unit
///
/// `ready` is derived from the active and sub states when the unit is built
/// and cannot be set on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    name: String,
    load_state: String,
    active_state: String,
    sub_state: String,
    desired_mode: DesiredMode,
    ready: bool,
    description: String,
    properties: HashMap<String, Value>,
}

impl Unit {
    pub fn new(
        name: impl Into<String>,
        desired_mode: DesiredMode,
        load_state: impl Into<String>,
        active_state: impl Into<String>,
        sub_state: impl Into<String>,
        description: impl Into<String>,
        properties: HashMap<String, Value>,
    ) -> Self {
        let active_state = active_state.into();
        let sub_state = sub_state.into();
        let ready = active_state == "active" && sub_state == "running";
        Self {
            name: name.into(),
            load_state: load_state.into(),
            active_state,
            sub_state,
            desired_mode,
            ready,
            description: description.into(),
            properties,
        }
    }

    /// A unit whose state has not been queried yet
    pub fn unknown(name: impl Into<String>, desired_mode: DesiredMode) -> Self {
        Self::new(name, desired_mode, "", "", "", "", HashMap::new())
    }

    /// A unit the service manager could not report on
    pub fn not_found(name: impl Into<String>, desired_mode: DesiredMode) -> Self {
        Self::new(name, desired_mode, NOT_FOUND, "inactive", "dead", "", HashMap::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn load_state(&self) -> &str {
        &self.load_state
    }

    pub fn active_state(&self) -> &str {
        &self.active_state
    }

    pub fn sub_state(&self) -> &str {
        &self.sub_state
    }

    pub fn desired_mode(&self) -> DesiredMode {
        self.desired_mode
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_not_found(&self) -> bool {
        self.load_state == NOT_FOUND
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    /// Whether this unit holds back aggregate readiness
    pub fn blocks_readiness(&self) -> bool {
        self.desired_mode == DesiredMode::Normal && !self.ready
    }
}

/// Point-in-time view of every watched unit
#[derive(Debug, Clone, Serialize)]
pub struct WatcherSnapshot {
    /// Units in watch-set insertion order
    pub units: Vec<Unit>,

    /// When the initial query pass completed
    pub started_at: Option<DateTime<Utc>>,

    /// Aggregate readiness computed by the pass that produced this snapshot
    pub all_ready: bool,
}

impl WatcherSnapshot {
    pub fn empty() -> Self {
        Self {
            units: Vec::new(),
            started_at: None,
            all_ready: false,
        }
    }

    pub fn unit(&self, name: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.name() == name)
    }
}

/// Aggregate readiness: every `Normal` unit is ready
pub fn all_ready(units: &[Unit]) -> bool {
    units.iter().all(|u| !u.blocks_readiness())
}
