//! Finite state machine for network bootstrap

use serde::{Deserialize, Serialize};

/// Bootstrap state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapState {
    /// Installing the temporary redirect rules
    Installing,

    /// Waiting for the primary service to answer through the redirect
    Probing,

    /// Rules removed, waiting for the primary listener to restart
    Swapping,

    /// Bring-up networking finished, terminal
    Settled,
}

/// Bootstrap event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapEvent {
    /// Both redirect rules are in place
    RulesInstalled,

    /// A probe got a response and the rules were removed
    PrimaryAnswered,

    /// The primary listener was restarted
    ListenerRestarted,
}

/// Bootstrap FSM
#[derive(Debug, Clone)]
pub struct BootstrapFsm {
    state: BootstrapState,
}

impl BootstrapFsm {
    /// Create a new FSM in the installing state
    pub fn new() -> Self {
        Self {
            state: BootstrapState::Installing,
        }
    }

    /// Get current state
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    pub fn is_settled(&self) -> bool {
        self.state == BootstrapState::Settled
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: BootstrapEvent) -> Result<BootstrapState, String> {
        let new_state = match (self.state, event) {
            (BootstrapState::Installing, BootstrapEvent::RulesInstalled) => BootstrapState::Probing,
            (BootstrapState::Probing, BootstrapEvent::PrimaryAnswered) => BootstrapState::Swapping,
            (BootstrapState::Swapping, BootstrapEvent::ListenerRestarted) => BootstrapState::Settled,

            // Invalid transitions, Settled included
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for BootstrapFsm {
    fn default() -> Self {
        Self::new()
    }
}
