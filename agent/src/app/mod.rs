//! Application wiring

pub mod options;
pub mod run;
pub mod shutdown;
pub mod state;
