//! Priority-grouped bring-up scripts

pub mod discovery;
pub mod runner;
pub mod scheduler;
pub mod script;
