//! Application configuration options

use std::time::Duration;

use crate::bootstrap::controller;
use crate::dashboard;
use crate::monitor::unit::DesiredMode;
use crate::scripts::discovery::DiscoveryOptions;
use crate::scripts::scheduler;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{Settings, WatchedUnit};
use crate::workers::monitor;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageLayout,

    /// Units watched from the start
    pub units: Vec<WatchedUnit>,

    /// Network interface facing the outside
    pub interface: String,

    /// Install redirect rules and probe for the primary service
    pub enable_bootstrap: bool,

    /// Serve the status API
    pub enable_server: bool,

    /// Run the terminal dashboard
    pub enable_dashboard: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Monitor worker options
    pub monitor: monitor::Options,

    /// Script scheduler options
    pub scripts: scheduler::Options,

    /// Network bootstrap options
    pub bootstrap: controller::Options,

    /// Dashboard options
    pub dashboard: dashboard::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageLayout::default(),
            units: Vec::new(),
            interface: "eth0".to_string(),
            enable_bootstrap: true,
            enable_server: true,
            enable_dashboard: true,
            server: ServerOptions::default(),
            monitor: monitor::Options::default(),
            scripts: scheduler::Options::default(),
            bootstrap: controller::Options::default(),
            dashboard: dashboard::Options::default(),
        }
    }
}

impl AppOptions {
    /// Build options from a settings file
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        Self {
            storage: StorageLayout::new(&settings.base_dir),
            units: settings.units.clone(),
            interface: settings.interface.clone(),
            enable_bootstrap: settings.enable_bootstrap,
            enable_server: settings.enable_server,
            enable_dashboard: settings.enable_dashboard,
            server: ServerOptions {
                host: settings.server_host.clone(),
                port: settings.ports.primary,
                restart_delay: Duration::from_millis(settings.restart_delay_ms),
            },
            monitor: monitor::Options {
                interval: Duration::from_millis(settings.monitor_interval_ms),
                ..defaults.monitor
            },
            scripts: scheduler::Options {
                discovery: DiscoveryOptions {
                    script_dir: settings.script_dir.clone(),
                    manifest: settings.manifest.clone(),
                    extensions: settings.script_extensions.clone(),
                    default_priority: settings.default_priority,
                },
                max_concurrent: settings.max_concurrent_scripts,
            },
            bootstrap: controller::Options {
                public_port: settings.ports.public,
                primary_port: settings.ports.primary,
                temp_port: settings.ports.temp,
                probe_interval: Duration::from_millis(settings.probe_interval_ms),
                ..defaults.bootstrap
            },
            dashboard: dashboard::Options {
                interface: settings.interface.clone(),
                ..defaults.dashboard
            },
            ..defaults
        }
    }

    /// Add a unit to the initial watch list unless already present
    pub fn watch(&mut self, name: &str, mode: DesiredMode) {
        if !self.units.iter().any(|u| u.name == name) {
            self.units.push(WatchedUnit {
                name: name.to_string(),
                mode,
            });
        }
    }
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Status API server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Delay before the listener reacts to the primary ready signal
    pub restart_delay: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            restart_delay: Duration::from_millis(500),
        }
    }
}
