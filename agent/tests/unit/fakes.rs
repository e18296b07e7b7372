//! In-memory stand-ins for the service manager, shell, firewall and prober

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use spirit_box::bootstrap::firewall::{Firewall, FirewallError, RedirectRule};
use spirit_box::bootstrap::probe::{ProbeError, Prober};
use spirit_box::filesys::dir::Dir;
use spirit_box::monitor::manager::{ServiceManager, ServiceManagerError, UnitDescriptor};
use spirit_box::scripts::runner::{ProcessOutput, ProcessRunner, ScriptError};

// ================================ SERVICE MANAGER ================================ //

#[derive(Debug, Clone)]
struct FakeUnit {
    active: String,
    sub: String,
    loaded: bool,
}

/// Service manager whose unit states are set by the test
#[derive(Default)]
pub struct FakeServiceManager {
    units: Mutex<HashMap<String, FakeUnit>>,
    listing_fails: Mutex<bool>,
    list_calls: AtomicUsize,
}

impl FakeServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a loaded unit's states
    pub fn set(&self, name: &str, active: &str, sub: &str) {
        self.units.lock().unwrap().insert(
            name.to_string(),
            FakeUnit {
                active: active.to_string(),
                sub: sub.to_string(),
                loaded: true,
            },
        );
    }

    /// A unit the manager knows about but that is missing from the listing
    pub fn set_unlisted(&self, name: &str, active: &str, sub: &str) {
        self.units.lock().unwrap().insert(
            name.to_string(),
            FakeUnit {
                active: active.to_string(),
                sub: sub.to_string(),
                loaded: false,
            },
        );
    }

    pub fn remove(&self, name: &str) {
        self.units.lock().unwrap().remove(name);
    }

    pub fn fail_listing(&self, fail: bool) {
        *self.listing_fails.lock().unwrap() = fail;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceManager for FakeServiceManager {
    async fn list_units(&self) -> Result<Vec<UnitDescriptor>, ServiceManagerError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if *self.listing_fails.lock().unwrap() {
            return Err(ServiceManagerError::Unavailable("bus closed".to_string()));
        }

        let units = self.units.lock().unwrap();
        let mut listing: Vec<UnitDescriptor> = units
            .iter()
            .filter(|(_, u)| u.loaded)
            .map(|(name, u)| UnitDescriptor {
                name: name.clone(),
                description: format!("{} description", name),
                load_state: "loaded".to_string(),
                active_state: u.active.clone(),
                sub_state: u.sub.clone(),
            })
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    async fn get_unit_properties(
        &self,
        name: &str,
    ) -> Result<HashMap<String, Value>, ServiceManagerError> {
        let units = self.units.lock().unwrap();
        let unit = units
            .get(name)
            .ok_or_else(|| ServiceManagerError::UnitNotFound(name.to_string()))?;

        let mut properties = HashMap::new();
        properties.insert("Id".to_string(), Value::from(name));
        properties.insert("LoadState".to_string(), Value::from("loaded"));
        properties.insert("ActiveState".to_string(), Value::from(unit.active.as_str()));
        properties.insert("SubState".to_string(), Value::from(unit.sub.as_str()));
        properties.insert("Description".to_string(), Value::from(format!("{} properties", name)));
        Ok(properties)
    }
}

// ================================ PROCESS RUNNER ================================= //

/// One recorded script execution
#[derive(Debug, Clone)]
pub struct Execution {
    pub script: String,
    pub program: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Process runner that sleeps instead of spawning
///
/// Scripts whose file name is registered with `fail` exit with status 1.
#[derive(Default)]
pub struct FakeRunner {
    delays: Mutex<HashMap<String, Duration>>,
    failures: Mutex<Vec<String>>,
    executions: Mutex<Vec<Execution>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(&self, script: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(script.to_string(), delay);
    }

    pub fn fail(&self, script: &str) {
        self.failures.lock().unwrap().push(script.to_string());
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.executions.lock().unwrap().clone()
    }

    pub fn execution(&self, script: &str) -> Option<Execution> {
        self.executions().into_iter().find(|e| e.script == script)
    }

    /// Highest number of scripts seen running at once
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn spawn(
        &self,
        program: &str,
        _args: &[String],
        script: &Path,
    ) -> Result<ProcessOutput, ScriptError> {
        let name = script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(&name)
            .copied()
            .unwrap_or(Duration::from_millis(10));
        let fails = self.failures.lock().unwrap().contains(&name);

        let started_at = Utc::now();
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        let finished_at = Utc::now();

        self.executions.lock().unwrap().push(Execution {
            script: name.clone(),
            program: program.to_string(),
            started_at,
            finished_at,
        });

        Ok(ProcessOutput {
            stdout: format!("ran {}\n", name),
            stderr: if fails { format!("{} broke", name) } else { String::new() },
            success: !fails,
            code: Some(if fails { 1 } else { 0 }),
        })
    }
}

/// Write a script file into `dir`
pub async fn write_script(dir: &Dir, name: &str, contents: &str) {
    dir.file(name).write_string(contents).await.unwrap();
}

// =================================== FIREWALL ==================================== //

/// Firewall keeping its rule table in memory
#[derive(Default)]
pub struct FakeFirewall {
    rules: Mutex<Vec<RedirectRule>>,
    fail_add: Mutex<Option<RedirectRule>>,
    fail_remove: Mutex<Option<RedirectRule>>,
    removals: Mutex<Vec<RedirectRule>>,
}

impl FakeFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: &[RedirectRule]) -> Self {
        let firewall = Self::default();
        firewall.rules.lock().unwrap().extend_from_slice(rules);
        firewall
    }

    pub fn fail_add(&self, rule: RedirectRule) {
        *self.fail_add.lock().unwrap() = Some(rule);
    }

    pub fn fail_remove(&self, rule: Option<RedirectRule>) {
        *self.fail_remove.lock().unwrap() = rule;
    }

    pub fn rules(&self) -> Vec<RedirectRule> {
        self.rules.lock().unwrap().clone()
    }

    /// Every removal attempt, failed ones included
    pub fn removals(&self) -> Vec<RedirectRule> {
        self.removals.lock().unwrap().clone()
    }
}

#[async_trait]
impl Firewall for FakeFirewall {
    async fn add_redirect(&self, rule: RedirectRule) -> Result<(), FirewallError> {
        if *self.fail_add.lock().unwrap() == Some(rule) {
            return Err(FirewallError::Add {
                rule,
                message: "permission denied".to_string(),
            });
        }
        self.rules.lock().unwrap().push(rule);
        Ok(())
    }

    async fn remove_redirect(&self, rule: RedirectRule) -> Result<(), FirewallError> {
        self.removals.lock().unwrap().push(rule);
        if *self.fail_remove.lock().unwrap() == Some(rule) {
            return Err(FirewallError::Remove {
                rule,
                message: "permission denied".to_string(),
            });
        }

        let mut rules = self.rules.lock().unwrap();
        match rules.iter().position(|r| *r == rule) {
            Some(index) => {
                rules.remove(index);
                Ok(())
            }
            None => Err(FirewallError::Remove {
                rule,
                message: "no such rule".to_string(),
            }),
        }
    }
}

// ==================================== PROBER ===================================== //

/// Prober that fails a set number of times, then answers with `status`
pub struct FakeProber {
    failures_left: AtomicUsize,
    status: u16,
    calls: AtomicUsize,
}

impl FakeProber {
    pub fn answering_after(failures: usize, status: u16) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            status,
            calls: AtomicUsize::new(0),
        }
    }

    /// Never answers
    pub fn silent() -> Self {
        Self::answering_after(usize::MAX, 200)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, url: &str) -> Result<u16, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            if left != usize::MAX {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(ProbeError {
                url: url.to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(self.status)
    }
}
