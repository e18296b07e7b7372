//! Error types for the spirit-box agent

use thiserror::Error;

use crate::bootstrap::firewall::FirewallError;
use crate::bootstrap::fsm::BootstrapState;

/// Main error type for the agent
///
/// Only errors that leave shared state inconsistent (the NAT redirect rules)
/// travel this far. Per-unit and per-script failures are recorded on the
/// entity they belong to and never become an `AgentError`.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Firewall error: {0}")]
    Firewall(#[from] FirewallError),

    #[error("Invalid bootstrap transition from {state:?}: {event}")]
    InvalidTransition { state: BootstrapState, event: String },

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}
