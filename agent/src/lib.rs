//! spirit-box library
//!
//! Bring-up agent for embedded appliances: watches service units until they
//! are ready, runs bring-up scripts in priority groups and hands port 80 over
//! to the primary service once it answers.

pub mod app;
pub mod bootstrap;
pub mod dashboard;
pub mod device;
pub mod errors;
pub mod filesys;
pub mod journal;
pub mod logs;
pub mod monitor;
pub mod scripts;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
