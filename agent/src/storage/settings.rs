//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::monitor::unit::DesiredMode;

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,

    /// Base directory for logs and the event journal
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Units watched from the start
    #[serde(default)]
    pub units: Vec<WatchedUnit>,

    /// Directory scanned for bring-up scripts
    #[serde(default = "default_script_dir")]
    pub script_dir: PathBuf,

    /// Manifest listing additional scripts
    #[serde(default = "default_manifest")]
    pub manifest: Option<PathBuf>,

    /// Extensions picked up by the directory scan
    #[serde(default = "default_script_extensions")]
    pub script_extensions: Vec<String>,

    /// Priority of scripts that carry none
    #[serde(default = "default_priority")]
    pub default_priority: i64,

    /// Cap on scripts running at once inside a group
    #[serde(default)]
    pub max_concurrent_scripts: Option<usize>,

    /// Port configuration
    #[serde(default)]
    pub ports: PortSettings,

    /// Network interface facing the outside
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Host the status API binds to
    #[serde(default = "default_server_host")]
    pub server_host: String,

    /// Install redirect rules and probe for the primary service
    #[serde(default = "default_true")]
    pub enable_bootstrap: bool,

    /// Serve the status API
    #[serde(default = "default_true")]
    pub enable_server: bool,

    /// Run the terminal dashboard
    #[serde(default = "default_true")]
    pub enable_dashboard: bool,

    /// Unit query interval in milliseconds
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_ms: u64,

    /// Readiness probe interval in milliseconds
    #[serde(default = "default_probe_interval")]
    pub probe_interval_ms: u64,

    /// Delay before the listener restarts after the primary ready signal
    #[serde(default = "default_restart_delay")]
    pub restart_delay_ms: u64,
}

/// A unit listed in the settings file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedUnit {
    pub name: String,

    #[serde(default)]
    pub mode: DesiredMode,
}

fn default_true() -> bool {
    true
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/etc/spirit-box")
}

fn default_script_dir() -> PathBuf {
    PathBuf::from("/usr/share/spirit-box")
}

fn default_manifest() -> Option<PathBuf> {
    Some(PathBuf::from("/usr/share/spirit-box/scripts"))
}

fn default_script_extensions() -> Vec<String> {
    vec!["sh".to_string()]
}

fn default_priority() -> i64 {
    100
}

fn default_interface() -> String {
    "eth0".to_string()
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_monitor_interval() -> u64 {
    500
}

fn default_probe_interval() -> u64 {
    1000
}

fn default_restart_delay() -> u64 {
    500
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            base_dir: default_base_dir(),
            units: Vec::new(),
            script_dir: default_script_dir(),
            manifest: default_manifest(),
            script_extensions: default_script_extensions(),
            default_priority: default_priority(),
            max_concurrent_scripts: None,
            ports: PortSettings::default(),
            interface: default_interface(),
            server_host: default_server_host(),
            enable_bootstrap: true,
            enable_server: true,
            enable_dashboard: true,
            monitor_interval_ms: default_monitor_interval(),
            probe_interval_ms: default_probe_interval(),
            restart_delay_ms: default_restart_delay(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file does not exist
    pub async fn load(file: &File) -> Result<Self, AgentError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        file.read_json::<Settings>()
            .await
            .map_err(|e| AgentError::ConfigError(format!("{}: {}", file.path().display(), e)))
    }
}

/// Port settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSettings {
    /// Port the appliance is reached on from outside
    #[serde(default = "default_public_port")]
    pub public: u16,

    /// Port the agent's status server listens on
    #[serde(default = "default_primary_port")]
    pub primary: u16,

    /// Port redirected to the public port while probing
    #[serde(default = "default_temp_port")]
    pub temp: u16,
}

fn default_public_port() -> u16 {
    80
}

fn default_primary_port() -> u16 {
    8080
}

fn default_temp_port() -> u16 {
    8081
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            public: default_public_port(),
            primary: default_primary_port(),
            temp: default_temp_port(),
        }
    }
}
