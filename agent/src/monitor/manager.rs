//! Service-manager capability consumed by the unit watcher

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// One row of the service manager's unit listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDescriptor {
    pub name: String,
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
}

/// Query failure, split by blast radius
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceManagerError {
    /// The manager answered, but knows nothing about this unit
    #[error("unit not found: {0}")]
    UnitNotFound(String),

    /// The manager itself could not be reached or answered garbage
    #[error("service manager unavailable: {0}")]
    Unavailable(String),
}

/// Queries the OS service manager
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// List every unit the manager currently knows about
    async fn list_units(&self) -> Result<Vec<UnitDescriptor>, ServiceManagerError>;

    /// Fetch the full property map of a single unit
    async fn get_unit_properties(
        &self,
        name: &str,
    ) -> Result<HashMap<String, Value>, ServiceManagerError>;
}
