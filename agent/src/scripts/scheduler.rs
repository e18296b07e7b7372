//! Priority-grouped script scheduler
//!
//! Groups run in ascending priority order. Every script of a group is
//! launched at once and the next group only starts after the whole group has
//! finished. A failed script is recorded and never stops the run.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::scripts::discovery::{discover, DiscoveryOptions};
use crate::scripts::runner::{read_interpreter, Interpreter, ProcessOutput, ProcessRunner, ScriptError};
use crate::scripts::script::{Script, ScheduleRun, ScriptStatus};

/// Scheduler options
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Where scripts are discovered
    pub discovery: DiscoveryOptions,

    /// Upper bound on scripts running at once inside a group, unbounded if `None`
    pub max_concurrent: Option<usize>,
}

struct Job {
    index: usize,
    path: PathBuf,
    interpreter: Interpreter,
}

struct Outcome {
    index: usize,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    result: Result<ProcessOutput, ScriptError>,
}

/// Runs bring-up scripts group by group
pub struct ScriptScheduler {
    runner: Arc<dyn ProcessRunner>,
    max_concurrent: Option<usize>,
    run: RwLock<ScheduleRun>,
    started: AtomicBool,
}

impl ScriptScheduler {
    pub fn new(runner: Arc<dyn ProcessRunner>, scripts: Vec<Script>, max_concurrent: Option<usize>) -> Self {
        Self {
            runner,
            max_concurrent,
            run: RwLock::new(ScheduleRun::from_scripts(scripts)),
            started: AtomicBool::new(false),
        }
    }

    /// Discover scripts and build a scheduler for them
    pub async fn discover(options: &Options, runner: Arc<dyn ProcessRunner>) -> Self {
        let scripts = discover(&options.discovery).await;
        info!("Discovered {} scripts", scripts.len());
        Self::new(runner, scripts, options.max_concurrent)
    }

    /// Copy of the current schedule
    pub async fn snapshot(&self) -> ScheduleRun {
        self.run.read().await.clone()
    }

    /// Execute every priority group in order
    ///
    /// Only the first call runs the schedule; later calls return immediately.
    pub async fn run_priority_groups(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Priority groups already started, ignoring");
            return;
        }

        let num_groups = self.run.read().await.groups.len();
        for group_index in 0..num_groups {
            self.run_group(group_index).await;
        }

        let mut run = self.run.write().await;
        run.current = None;
        run.finished = true;
        info!(
            "Scripts finished: {} succeeded, {} failed",
            run.count(ScriptStatus::Succeeded),
            run.count(ScriptStatus::Failed)
        );
    }

    async fn run_group(&self, group_index: usize) {
        let jobs = self.prepare_group(group_index).await;

        let limit = self.max_concurrent.unwrap_or(jobs.len()).max(1);
        let runner = self.runner.clone();
        let mut outcomes = stream::iter(jobs)
            .map(|job| {
                let runner = runner.clone();
                async move { execute(runner.as_ref(), job).await }
            })
            .buffer_unordered(limit);

        while let Some(outcome) = outcomes.next().await {
            self.record(group_index, outcome).await;
        }
    }

    /// Read interpreter lines and mark runnable scripts as running
    async fn prepare_group(&self, group_index: usize) -> Vec<Job> {
        let paths: Vec<(usize, PathBuf, ScriptStatus)> = {
            let mut run = self.run.write().await;
            run.current = Some(group_index);
            let group = &run.groups[group_index];
            info!(
                "Starting priority group {} ({} scripts)",
                group.priority,
                group.scripts.len()
            );
            group
                .scripts
                .iter()
                .enumerate()
                .map(|(i, s)| (i, s.path.clone(), s.status))
                .collect()
        };

        let mut jobs = Vec::new();
        for (index, path, status) in paths {
            // Scripts that failed discovery are already settled
            if status != ScriptStatus::Pending {
                continue;
            }

            match read_interpreter(&path).await {
                Ok(Some(interpreter)) => jobs.push(Job {
                    index,
                    path,
                    interpreter,
                }),
                Ok(None) => {
                    debug!("Skipping {}: no interpreter line", path.display());
                }
                Err(e) => {
                    warn!("Script {} failed: {}", path.display(), e);
                    let mut run = self.run.write().await;
                    let script = &mut run.groups[group_index].scripts[index];
                    script.status = ScriptStatus::Failed;
                    script.error = Some(e.to_string());
                }
            }
        }

        let mut run = self.run.write().await;
        for job in &jobs {
            let script = &mut run.groups[group_index].scripts[job.index];
            script.interpreter = Some(job.interpreter.command_line());
            script.status = ScriptStatus::Running;
        }
        jobs
    }

    async fn record(&self, group_index: usize, outcome: Outcome) {
        let mut run = self.run.write().await;
        let script = &mut run.groups[group_index].scripts[outcome.index];
        script.started_at = Some(outcome.started_at);
        script.finished_at = Some(outcome.finished_at);

        match outcome.result {
            Ok(output) if output.success => {
                info!("Ran {}", script.path.display());
                script.status = ScriptStatus::Succeeded;
                script.stdout = output.stdout;
            }
            Ok(output) => {
                let err = ScriptError::Exit {
                    code: output.code,
                    stderr: output.stderr.trim().to_string(),
                };
                warn!("Script {} failed: {}", script.path.display(), err);
                script.status = ScriptStatus::Failed;
                script.stdout = output.stdout;
                script.error = Some(err.to_string());
            }
            Err(e) => {
                warn!("Script {} failed: {}", script.path.display(), e);
                script.status = ScriptStatus::Failed;
                script.error = Some(e.to_string());
            }
        }
    }
}

async fn execute(runner: &dyn ProcessRunner, job: Job) -> Outcome {
    debug!("Running {} {}", job.interpreter.command_line(), job.path.display());
    let started_at = Utc::now();
    let result = runner
        .spawn(&job.interpreter.program, &job.interpreter.args, &job.path)
        .await;
    Outcome {
        index: job.index,
        started_at,
        finished_at: Utc::now(),
        result,
    }
}
