//! systemd access through the `systemctl` binary

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::monitor::manager::{ServiceManager, ServiceManagerError, UnitDescriptor};
use crate::monitor::unit::NOT_FOUND;

/// Service manager backed by `systemctl`
#[derive(Debug, Clone)]
pub struct SystemctlManager {
    program: String,
    timeout: Duration,
}

impl SystemctlManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "systemctl".to_string(),
            timeout,
        }
    }

    async fn exec(&self, args: &[&str]) -> Result<std::process::Output, ServiceManagerError> {
        debug!("{} {}", self.program, args.join(" "));
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| {
            ServiceManagerError::Unavailable(format!(
                "{} timed out after {:?}",
                self.program, self.timeout
            ))
        })?
        .map_err(|e| ServiceManagerError::Unavailable(format!("failed to run {}: {}", self.program, e)))?;
        Ok(output)
    }
}

impl Default for SystemctlManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl ServiceManager for SystemctlManager {
    async fn list_units(&self) -> Result<Vec<UnitDescriptor>, ServiceManagerError> {
        let output = self
            .exec(&["list-units", "--all", "--plain", "--no-legend", "--full", "--no-pager"])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ServiceManagerError::Unavailable(stderr.trim().to_string()));
        }

        Ok(parse_unit_list(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn get_unit_properties(
        &self,
        name: &str,
    ) -> Result<HashMap<String, Value>, ServiceManagerError> {
        let output = self.exec(&["show", name, "--no-pager"]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ServiceManagerError::UnitNotFound(format!(
                "{}: {}",
                name,
                stderr.trim()
            )));
        }

        let properties = parse_properties(&String::from_utf8_lossy(&output.stdout));
        match properties.get("LoadState").and_then(|v| v.as_str()) {
            Some(NOT_FOUND) => Err(ServiceManagerError::UnitNotFound(name.to_string())),
            _ => Ok(properties),
        }
    }
}

/// Parse `systemctl list-units --plain --no-legend` output
///
/// Columns are UNIT LOAD ACTIVE SUB DESCRIPTION, the description running to
/// the end of the line.
pub fn parse_unit_list(output: &str) -> Vec<UnitDescriptor> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim_start().trim_start_matches('●').trim_start();
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let load_state = fields.next()?;
            let active_state = fields.next()?;
            let sub_state = fields.next()?;
            let description = fields.collect::<Vec<_>>().join(" ");
            Some(UnitDescriptor {
                name: name.to_string(),
                description,
                load_state: load_state.to_string(),
                active_state: active_state.to_string(),
                sub_state: sub_state.to_string(),
            })
        })
        .collect()
}

/// Parse `systemctl show` `KEY=VALUE` output
pub fn parse_properties(output: &str) -> HashMap<String, Value> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect()
}
