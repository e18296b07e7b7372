//! Script process execution

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::filesys::file::File;

/// Why a script could not be run to a successful exit
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("empty interpreter line in {0}")]
    EmptyInterpreter(String),

    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("exited with {}: {}", describe_exit(.code), .stderr)]
    Exit { code: Option<i32>, stderr: String },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "signal".to_string(),
    }
}

/// Interpreter taken from a script's `#!` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: String,
    pub args: Vec<String>,
}

impl Interpreter {
    /// Parse the text after `#!`, e.g. `/usr/bin/env bash`
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Read the first line of a file and return its interpreter
///
/// Files without a leading `#!` are not scripts and yield `None`.
pub async fn read_interpreter(path: &Path) -> Result<Option<Interpreter>, ScriptError> {
    let read_err = |e: std::io::Error| ScriptError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let first = match File::new(path).read_first_line().await {
        Ok(Some(line)) => line,
        Ok(None) => return Ok(None),
        // Binary content, certainly not an interpreter line
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => return Ok(None),
        Err(e) => return Err(read_err(e)),
    };

    let Some(rest) = first.strip_prefix("#!") else {
        return Ok(None);
    };

    Interpreter::parse(rest)
        .map(Some)
        .ok_or_else(|| ScriptError::EmptyInterpreter(path.display().to_string()))
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

/// Spawns an interpreter on a script and waits for it
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn spawn(
        &self,
        program: &str,
        args: &[String],
        script: &Path,
    ) -> Result<ProcessOutput, ScriptError>;
}

/// Process runner on top of `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct CommandRunner;

#[async_trait]
impl ProcessRunner for CommandRunner {
    async fn spawn(
        &self,
        program: &str,
        args: &[String],
        script: &Path,
    ) -> Result<ProcessOutput, ScriptError> {
        let output = Command::new(program)
            .args(args)
            .arg(script)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ScriptError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })?;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}
