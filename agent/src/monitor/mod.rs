//! Unit readiness monitoring

pub mod manager;
pub mod systemctl;
pub mod unit;
pub mod watcher;
