//! Background workers

pub mod monitor;
