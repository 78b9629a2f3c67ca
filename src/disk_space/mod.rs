//! Staging directory resolution with free-space checks.
//!
//! The advisor is a small state machine:
//!
//! ```text
//! Checking(path) ──exists, enough space──▶ Resolved(path)
//!     │   │
//!     │   └─missing, create declined─────▶ Aborted
//!     │
//!     └─not enough space──▶ AwaitingInput ──'q' / no answer──▶ Aborted
//!                               │
//!                               └─new path──▶ Checking(new path)
//! ```
//!
//! There is no iteration bound. Only a sufficient directory or an explicit
//! abort terminates resolution.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, StageError};
use crate::operator::Operator;

/// Bytes in one GiB.
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Default minimum free space for a staging directory.
pub const DEFAULT_MIN_FREE_BYTES: u64 = 10 * GIB;

/// Operator answer that aborts the alternate-path prompt.
pub const ABORT_ANSWER: &str = "q";

/// Reports free space for a directory.
pub trait SpaceProbe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// Space probe backed by `statvfs` via [`fs2`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Fs2Probe;

impl SpaceProbe for Fs2Probe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }
}

/// Resolution state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveState {
    /// `path` is about to be checked for existence and free space.
    Checking(PathBuf),
    /// `path` was measured with too little space; waiting for an alternate.
    AwaitingInput { path: PathBuf, available: u64 },
    Resolved(PathBuf),
    Aborted(String),
}

impl ResolveState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved(_) | Self::Aborted(_))
    }
}

/// Resolves a usable staging directory, asking the operator when needed.
pub struct DiskSpaceAdvisor<'a> {
    operator: &'a dyn Operator,
    probe: &'a dyn SpaceProbe,
    min_free_bytes: u64,
}

impl<'a> DiskSpaceAdvisor<'a> {
    pub fn new(operator: &'a dyn Operator, probe: &'a dyn SpaceProbe, min_free_bytes: u64) -> Self {
        Self {
            operator,
            probe,
            min_free_bytes,
        }
    }

    /// Resolve `requested` to a directory with at least the configured free
    /// space, or fail with [`StageError::UserAbort`].
    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let mut state = ResolveState::Checking(expand_tilde(requested));
        while !state.is_terminal() {
            state = self.step(state)?;
        }

        match state {
            ResolveState::Resolved(path) => {
                info!(dir = %path.display(), "staging directory resolved");
                Ok(path)
            }
            ResolveState::Aborted(reason) => Err(StageError::abort(reason)),
            _ => unreachable!("loop exits only on a terminal state"),
        }
    }

    /// Perform one transition.
    pub fn step(&self, state: ResolveState) -> Result<ResolveState> {
        match state {
            ResolveState::Checking(path) => self.check(path),
            ResolveState::AwaitingInput { path, available } => {
                Ok(self.await_alternate(&path, available))
            }
            terminal => Ok(terminal),
        }
    }

    fn check(&self, path: PathBuf) -> Result<ResolveState> {
        if !path.exists() {
            let question = format!(
                "Directory '{}' does not exist. Create it? (y/n): ",
                path.display()
            );
            if !self.operator.confirm(&question) {
                return Ok(ResolveState::Aborted(format!(
                    "directory '{}' does not exist and was not created",
                    path.display()
                )));
            }
            fs::create_dir_all(&path)
                .map_err(|e| StageError::io("creating staging directory", &path, e))?;
            debug!(dir = %path.display(), "created staging directory");
        }

        let available = self
            .probe
            .available_bytes(&path)
            .map_err(|e| StageError::io("querying free space of", &path, e))?;

        if available >= self.min_free_bytes {
            return Ok(ResolveState::Resolved(path));
        }

        warn!(
            dir = %path.display(),
            available,
            required = self.min_free_bytes,
            "insufficient free space"
        );
        Ok(ResolveState::AwaitingInput { path, available })
    }

    fn await_alternate(&self, path: &Path, available: u64) -> ResolveState {
        let question = format!(
            "Directory '{}' does not have enough free space ({} available, {} required).\n\
             Enter an alternate path or '{}' to exit: ",
            path.display(),
            format_gib(available),
            format_gib(self.min_free_bytes),
            ABORT_ANSWER
        );

        match self.operator.ask(&question) {
            None => ResolveState::Aborted(format!(
                "insufficient free space in '{}' and no operator input available",
                path.display()
            )),
            Some(answer) if answer == ABORT_ANSWER => ResolveState::Aborted(format!(
                "operator exited at insufficient free space in '{}'",
                path.display()
            )),
            Some(answer) if answer.is_empty() => ResolveState::AwaitingInput {
                path: path.to_path_buf(),
                available,
            },
            Some(answer) => ResolveState::Checking(expand_tilde(&answer)),
        }
    }
}

/// Expand a leading `~` to the current user's home directory.
pub fn expand_tilde(raw: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (raw, home) {
        ("~", Some(home)) => home,
        (rest, Some(home)) if rest.starts_with("~/") => home.join(&rest[2..]),
        (other, _) => PathBuf::from(other),
    }
}

fn format_gib(bytes: u64) -> String {
    format!("{:.1} GiB", bytes as f64 / GIB as f64)
}
