//! Script and schedule models

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Script status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStatus {
    /// Not started, or skipped because it has no interpreter line
    #[default]
    Pending,

    /// Process spawned, not yet exited
    Running,

    /// Exited successfully
    Succeeded,

    /// Spawn failure, unreadable file or unsuccessful exit
    Failed,
}

impl ScriptStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, ScriptStatus::Succeeded | ScriptStatus::Failed)
    }
}

/// One bring-up script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub path: PathBuf,

    /// Interpreter line without the leading `#!`, set once the file is read
    pub interpreter: Option<String>,

    pub priority: i64,

    pub status: ScriptStatus,

    /// Captured standard output
    #[serde(default)]
    pub stdout: String,

    /// Captured error, if the script failed
    pub error: Option<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Script {
    pub fn new(path: impl Into<PathBuf>, priority: i64) -> Self {
        Self {
            path: path.into(),
            interpreter: None,
            priority,
            status: ScriptStatus::Pending,
            stdout: String::new(),
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// A script that failed before it could be run, e.g. a missing manifest entry
    pub fn failed(path: impl Into<PathBuf>, priority: i64, error: impl Into<String>) -> Self {
        Self {
            status: ScriptStatus::Failed,
            error: Some(error.into()),
            ..Self::new(path, priority)
        }
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Scripts sharing a priority value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityGroup {
    pub priority: i64,
    pub scripts: Vec<Script>,
}

impl PriorityGroup {
    pub fn is_finished(&self) -> bool {
        self.scripts
            .iter()
            .all(|s| s.status != ScriptStatus::Running)
    }

    pub fn count(&self, status: ScriptStatus) -> usize {
        self.scripts.iter().filter(|s| s.status == status).count()
    }
}

/// All priority groups of one scheduler run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRun {
    /// Groups in ascending priority order
    pub groups: Vec<PriorityGroup>,

    /// Index of the group currently executing
    pub current: Option<usize>,

    /// Set once every group has completed
    pub finished: bool,
}

impl ScheduleRun {
    /// Build groups from scripts, sorted by ascending priority
    ///
    /// Scripts keep their relative order inside a group.
    pub fn from_scripts(scripts: Vec<Script>) -> Self {
        let mut groups: Vec<PriorityGroup> = Vec::new();
        for script in scripts {
            match groups.iter_mut().find(|g| g.priority == script.priority) {
                Some(group) => group.scripts.push(script),
                None => groups.push(PriorityGroup {
                    priority: script.priority,
                    scripts: vec![script],
                }),
            }
        }
        groups.sort_by_key(|g| g.priority);

        Self {
            groups,
            current: None,
            finished: false,
        }
    }

    pub fn num_scripts(&self) -> usize {
        self.groups.iter().map(|g| g.scripts.len()).sum()
    }

    pub fn count(&self, status: ScriptStatus) -> usize {
        self.groups.iter().map(|g| g.count(status)).sum()
    }
}
