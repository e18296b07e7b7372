//! Network bootstrap: temporary port redirects until the primary service answers

pub mod controller;
pub mod firewall;
pub mod fsm;
pub mod probe;
