//! NAT redirect rules

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// A NAT redirect from one local port to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RedirectRule {
    pub from_port: u16,
    pub to_port: u16,
}

impl RedirectRule {
    pub fn new(from_port: u16, to_port: u16) -> Self {
        Self { from_port, to_port }
    }
}

impl fmt::Display for RedirectRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from_port, self.to_port)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FirewallError {
    #[error("failed to add redirect {rule}: {message}")]
    Add { rule: RedirectRule, message: String },

    #[error("failed to remove redirect {rule}: {message}")]
    Remove { rule: RedirectRule, message: String },
}

/// Installs and removes redirect rules
#[async_trait]
pub trait Firewall: Send + Sync {
    async fn add_redirect(&self, rule: RedirectRule) -> Result<(), FirewallError>;

    /// Remove a redirect. Removing it again after a failure must be safe.
    async fn remove_redirect(&self, rule: RedirectRule) -> Result<(), FirewallError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Append,
    Check,
    Delete,
}

impl Action {
    fn flag(&self) -> &'static str {
        match self {
            Action::Append => "-A",
            Action::Check => "-C",
            Action::Delete => "-D",
        }
    }
}

/// Exit status of `iptables -C` when no matching entry exists
const NO_MATCHING_RULE: i32 = 1;

#[derive(Debug)]
enum ExecError {
    Spawn(String),
    Status { code: Option<i32>, stderr: String },
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Spawn(message) => f.write_str(message),
            ExecError::Status { stderr, .. } => f.write_str(stderr),
        }
    }
}

/// iptables backed firewall
///
/// Each redirect is a pair of `nat` entries: PREROUTING on the external
/// interface for traffic from outside, OUTPUT for locally generated traffic.
#[derive(Debug, Clone)]
pub struct IptablesFirewall {
    program: String,
    interface: String,
}

impl IptablesFirewall {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            program: "iptables".to_string(),
            interface: interface.into(),
        }
    }

    fn prerouting_args(&self, action: Action, rule: RedirectRule) -> Vec<String> {
        format!(
            "-t nat {} PREROUTING -i {} -p tcp --dport {} -j REDIRECT --to {}",
            action.flag(),
            self.interface,
            rule.from_port,
            rule.to_port
        )
        .split_whitespace()
        .map(str::to_string)
        .collect()
    }

    fn output_args(&self, action: Action, rule: RedirectRule) -> Vec<String> {
        format!(
            "-t nat {} OUTPUT -p tcp --dport {} -j REDIRECT --to {}",
            action.flag(),
            rule.from_port,
            rule.to_port
        )
        .split_whitespace()
        .map(str::to_string)
        .collect()
    }

    async fn exec(&self, args: &[String]) -> Result<(), ExecError> {
        debug!("{} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| ExecError::Spawn(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(ExecError::Status {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Delete one entry of a redirect if it is still installed
    async fn delete_if_present(&self, args: impl Fn(Action) -> Vec<String>) -> Result<(), ExecError> {
        match self.exec(&args(Action::Check)).await {
            Ok(()) => self.exec(&args(Action::Delete)).await,
            Err(ExecError::Status {
                code: Some(NO_MATCHING_RULE),
                ..
            }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Firewall for IptablesFirewall {
    async fn add_redirect(&self, rule: RedirectRule) -> Result<(), FirewallError> {
        let add_err = |e: ExecError| FirewallError::Add {
            rule,
            message: e.to_string(),
        };

        self.exec(&self.prerouting_args(Action::Append, rule))
            .await
            .map_err(add_err)?;

        if let Err(e) = self.exec(&self.output_args(Action::Append, rule)).await {
            // Do not leave half a redirect behind
            if let Err(e) = self.exec(&self.prerouting_args(Action::Delete, rule)).await {
                warn!("Failed to roll back PREROUTING redirect {}: {}", rule, e);
            }
            return Err(add_err(e));
        }

        info!("Added redirect {}", rule);
        Ok(())
    }

    async fn remove_redirect(&self, rule: RedirectRule) -> Result<(), FirewallError> {
        // Entries already gone count as removed, so a retry after a partial
        // failure deletes whatever is left
        let prerouting = self
            .delete_if_present(|action| self.prerouting_args(action, rule))
            .await;
        let output = self
            .delete_if_present(|action| self.output_args(action, rule))
            .await;

        if let Err(e) = prerouting.and(output) {
            return Err(FirewallError::Remove {
                rule,
                message: e.to_string(),
            });
        }

        info!("Removed redirect {}", rule);
        Ok(())
    }
}
