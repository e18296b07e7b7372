//! Network bootstrap controller
//!
//! Until the primary service is known to answer, port 80 is redirected to the
//! agent's own server and a temporary port is redirected to port 80. Once a
//! request through the temporary port gets any response, the primary service
//! owns port 80: both redirects are removed and the agent's server is told to
//! restart its listener.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::bootstrap::firewall::{Firewall, RedirectRule};
use crate::bootstrap::fsm::{BootstrapEvent, BootstrapFsm, BootstrapState};
use crate::bootstrap::probe::Prober;
use crate::errors::AgentError;

/// Bootstrap options
#[derive(Debug, Clone)]
pub struct Options {
    /// Port the appliance is reached on from outside
    pub public_port: u16,

    /// Port the agent's own server listens on
    pub primary_port: u16,

    /// Port redirected to `public_port` while probing
    pub temp_port: u16,

    /// Host the readiness probe is sent to
    pub probe_host: String,

    /// Delay between readiness probes
    pub probe_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            public_port: 80,
            primary_port: 8080,
            temp_port: 8081,
            probe_host: "localhost".to_string(),
            probe_interval: Duration::from_secs(1),
        }
    }
}

/// One-shot notice to the server loop that the primary service is up
///
/// The server acknowledges once its listener has been restarted.
#[derive(Debug)]
pub struct PrimaryReady {
    restarted: oneshot::Sender<()>,
}

impl PrimaryReady {
    pub fn new(restarted: oneshot::Sender<()>) -> Self {
        Self { restarted }
    }

    /// Report that the listener was restarted
    pub fn acknowledge(self) {
        let _ = self.restarted.send(());
    }
}

/// How a bootstrap run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Settled,
    Cancelled,
}

/// Drives the redirect rules through bring-up
///
/// This is the only writer of the redirect rule set.
pub struct BootstrapController {
    options: Options,
    firewall: Arc<dyn Firewall>,
    prober: Arc<dyn Prober>,
    fsm: Mutex<BootstrapFsm>,
    installed: Mutex<Vec<RedirectRule>>,
    state_tx: watch::Sender<BootstrapState>,
}

impl BootstrapController {
    pub fn new(options: Options, firewall: Arc<dyn Firewall>, prober: Arc<dyn Prober>) -> Self {
        let (state_tx, _) = watch::channel(BootstrapState::Installing);
        Self {
            options,
            firewall,
            prober,
            fsm: Mutex::new(BootstrapFsm::new()),
            installed: Mutex::new(Vec::new()),
            state_tx,
        }
    }

    /// The two redirects, in installation order
    pub fn rules(&self) -> [RedirectRule; 2] {
        [
            RedirectRule::new(self.options.public_port, self.options.primary_port),
            RedirectRule::new(self.options.temp_port, self.options.public_port),
        ]
    }

    pub fn state(&self) -> BootstrapState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BootstrapState> {
        self.state_tx.subscribe()
    }

    /// Rules currently installed by this controller
    pub async fn installed_rules(&self) -> Vec<RedirectRule> {
        self.installed.lock().await.clone()
    }

    /// Run the bootstrap sequence to the settled state
    ///
    /// Returns `Cancelled` if `shutdown_signal` fires first; rules still
    /// installed at that point are left for [`Self::teardown`]. Firewall
    /// failures are fatal.
    pub async fn run(
        &self,
        ready_tx: oneshot::Sender<PrimaryReady>,
        mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
    ) -> Result<BootstrapOutcome, AgentError> {
        info!("Network bootstrap starting...");

        self.install().await?;
        self.transition(BootstrapEvent::RulesInstalled).await?;

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Network bootstrap cancelled while probing");
                return Ok(BootstrapOutcome::Cancelled);
            }
            _ = self.await_primary() => {}
        }

        self.remove_installed().await?;
        self.transition(BootstrapEvent::PrimaryAnswered).await?;

        let (restarted_tx, restarted_rx) = oneshot::channel();
        if ready_tx.send(PrimaryReady::new(restarted_tx)).is_err() {
            info!("No listener to restart, bootstrap settled");
            self.transition(BootstrapEvent::ListenerRestarted).await?;
            return Ok(BootstrapOutcome::Settled);
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Network bootstrap cancelled while waiting for listener restart");
                return Ok(BootstrapOutcome::Cancelled);
            }
            restarted = restarted_rx => {
                if restarted.is_err() {
                    warn!("Listener dropped the primary ready signal without restarting");
                }
            }
        }

        self.transition(BootstrapEvent::ListenerRestarted).await?;
        info!("Network bootstrap settled");
        Ok(BootstrapOutcome::Settled)
    }

    /// Remove every rule still installed, e.g. on shutdown
    pub async fn teardown(&self) -> Result<(), AgentError> {
        let mut installed = self.installed.lock().await;
        if installed.is_empty() {
            return Ok(());
        }

        info!("Removing {} leftover redirect rules", installed.len());
        let mut first_error = None;
        for rule in std::mem::take(&mut *installed) {
            if let Err(e) = self.firewall.remove_redirect(rule).await {
                error!("{}", e);
                installed.push(rule);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Install both rules in order, stopping at the first failure
    async fn install(&self) -> Result<(), AgentError> {
        for rule in self.rules() {
            self.firewall.add_redirect(rule).await?;
            self.installed.lock().await.push(rule);
        }
        Ok(())
    }

    /// Remove both rules in order; a failure stops before the next removal
    async fn remove_installed(&self) -> Result<(), AgentError> {
        let mut installed = self.installed.lock().await;
        while let Some(rule) = installed.first().copied() {
            self.firewall.remove_redirect(rule).await?;
            installed.remove(0);
        }
        Ok(())
    }

    async fn await_primary(&self) {
        let url = format!("http://{}:{}", self.options.probe_host, self.options.temp_port);
        info!("Probing {} for the primary service", url);

        loop {
            match self.prober.probe(&url).await {
                Ok(status) => {
                    info!("Primary service answered with status {}", status);
                    return;
                }
                Err(e) => debug!("{}", e),
            }
            tokio::time::sleep(self.options.probe_interval).await;
        }
    }

    async fn transition(&self, event: BootstrapEvent) -> Result<BootstrapState, AgentError> {
        let mut fsm = self.fsm.lock().await;
        let state = fsm.state();
        let new_state = fsm
            .process(event)
            .map_err(|event| AgentError::InvalidTransition { state, event })?;
        self.state_tx.send_replace(new_state);
        debug!("Bootstrap state: {:?}", new_state);
        Ok(new_state)
    }
}
