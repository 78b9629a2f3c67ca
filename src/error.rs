//! Failure kinds surfaced by the staging pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::archive::ExtractError;
use crate::build_client::FetchError;
use crate::process::ToolError;

pub type Result<T> = std::result::Result<T, StageError>;

#[derive(Debug, Error)]
pub enum StageError {
    /// A prerequisite host package is not installed.
    #[error("host package '{package}' is not installed; run host setup first")]
    SetupIncomplete { package: String },

    /// The operator declined or aborted, or no operator answer was available.
    #[error("aborted: {reason}")]
    UserAbort { reason: String },

    #[error("download of '{file}' for {build_target}/{build_id} failed: {source}")]
    RemoteFetch {
        build_target: String,
        build_id: String,
        file: String,
        #[source]
        source: FetchError,
    },

    #[error("extracting '{}' failed: {source}", archive.display())]
    Extract {
        archive: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error("boot image not found at '{}'", path.display())]
    MissingBootImage { path: PathBuf },

    #[error("{step} failed for '{}': {source}", path.display())]
    PostProcess {
        step: &'static str,
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("{context} '{}': {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StageError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn abort(reason: impl Into<String>) -> Self {
        Self::UserAbort {
            reason: reason.into(),
        }
    }

    /// Stable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetupIncomplete { .. } => "setup_incomplete",
            Self::UserAbort { .. } => "user_abort",
            Self::RemoteFetch { .. } => "remote_fetch",
            Self::Extract { .. } => "extract",
            Self::MissingBootImage { .. } => "missing_boot_image",
            Self::PostProcess { .. } => "post_process",
            Self::Io { .. } => "io",
        }
    }

    /// Process exit status for this failure kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UserAbort { .. } => 2,
            Self::SetupIncomplete { .. } => 3,
            Self::RemoteFetch { .. } => 4,
            Self::Extract { .. } => 5,
            Self::MissingBootImage { .. } => 6,
            Self::PostProcess { .. } => 7,
            Self::Io { .. } => 1,
        }
    }
}
