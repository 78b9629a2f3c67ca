//! External tool invocation.
//!
//! Every external program the stager touches (boot image unpacker, `setfacl`,
//! `unzip`, `dpkg-query`, the artifact fetch tool) goes through
//! [`ProcessRunner`], so the staging logic can be exercised against a fake
//! runner that records invocations and injects failures.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Failure of an external tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("'{program}' exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },
}

/// A single external command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub envs: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Program name used in diagnostics.
    pub fn display_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// Capability to run external programs to completion.
pub trait ProcessRunner {
    /// Run `cmd`, block until it exits and return its stdout. A non-zero
    /// exit is an error.
    fn output(&self, cmd: &ToolCommand) -> Result<String, ToolError>;

    /// Run `cmd` for its side effects only.
    fn run(&self, cmd: &ToolCommand) -> Result<(), ToolError> {
        self.output(cmd).map(|_| ())
    }
}

/// Runs commands on the host with [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn output(&self, cmd: &ToolCommand) -> Result<String, ToolError> {
        debug!(program = %cmd.display_name(), args = ?cmd.args, "running external tool");

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        for (key, value) in &cmd.envs {
            command.env(key, value);
        }
        if let Some(dir) = &cmd.current_dir {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|source| ToolError::Spawn {
            program: cmd.display_name(),
            source,
        })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ToolError::Exit {
            program: cmd.display_name(),
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }
}
