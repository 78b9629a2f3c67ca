//! Test doubles for the stager's collaborators.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::archive::{Decompressor, ExtractError};
use crate::build_client::{BuildClient, FetchError};
use crate::disk_space::SpaceProbe;
use crate::operator::Operator;
use crate::process::{ProcessRunner, ToolCommand, ToolError};

/// Operator that replays canned answers and records the questions asked.
pub(crate) struct ScriptedOperator {
    answers: RefCell<VecDeque<String>>,
    questions: RefCell<Vec<String>>,
}

impl ScriptedOperator {
    pub(crate) fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: RefCell::new(answers.into_iter().map(Into::into).collect()),
            questions: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }
}

impl Operator for ScriptedOperator {
    fn ask(&self, question: &str) -> Option<String> {
        self.questions.borrow_mut().push(question.to_string());
        self.answers.borrow_mut().pop_front()
    }
}

/// Space probe returning a fixed sequence of measurements.
pub(crate) struct ScriptedProbe {
    values: RefCell<VecDeque<u64>>,
    measured: RefCell<Vec<PathBuf>>,
}

impl ScriptedProbe {
    pub(crate) fn new(values: impl IntoIterator<Item = u64>) -> Self {
        Self {
            values: RefCell::new(values.into_iter().collect()),
            measured: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn measured(&self) -> Vec<PathBuf> {
        self.measured.borrow().clone()
    }
}

impl SpaceProbe for ScriptedProbe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        self.measured.borrow_mut().push(path.to_path_buf());
        self.values
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no scripted measurement left"))
    }
}

/// Runner that records commands and fails any whose program name matches.
#[derive(Default)]
pub(crate) struct RecordingRunner {
    calls: RefCell<Vec<ToolCommand>>,
    fail_program: Option<String>,
    stdout: String,
}

impl RecordingRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(program: &str) -> Self {
        Self {
            fail_program: Some(program.to_string()),
            ..Self::default()
        }
    }

    /// Every successful command prints `stdout`.
    pub(crate) fn with_stdout(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<ToolCommand> {
        self.calls.borrow().clone()
    }

    pub(crate) fn programs(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|c| {
                c.program
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            })
            .collect()
    }
}

impl ProcessRunner for RecordingRunner {
    fn output(&self, cmd: &ToolCommand) -> Result<String, ToolError> {
        self.calls.borrow_mut().push(cmd.clone());
        let name = cmd
            .program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.fail_program.as_deref() == Some(name.as_str()) {
            return Err(ToolError::Exit {
                program: cmd.display_name(),
                status: "exit status: 1".to_string(),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(self.stdout.clone())
    }
}

/// One recorded download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DownloadCall {
    pub(crate) build_target: String,
    pub(crate) build_id: String,
    pub(crate) remote_name: String,
    pub(crate) local_path: PathBuf,
}

/// Build client that writes placeholder bytes and records each request.
#[derive(Default)]
pub(crate) struct RecordingClient {
    calls: RefCell<Vec<DownloadCall>>,
    fail_name: Option<String>,
}

impl RecordingClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(remote_name: &str) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            fail_name: Some(remote_name.to_string()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<DownloadCall> {
        self.calls.borrow().clone()
    }
}

impl BuildClient for RecordingClient {
    fn download(
        &self,
        build_target: &str,
        build_id: &str,
        remote_name: &str,
        local_path: &Path,
    ) -> Result<(), FetchError> {
        self.calls.borrow_mut().push(DownloadCall {
            build_target: build_target.to_string(),
            build_id: build_id.to_string(),
            remote_name: remote_name.to_string(),
            local_path: local_path.to_path_buf(),
        });
        if self.fail_name.as_deref() == Some(remote_name) {
            return Err(FetchError::NotFound {
                name: remote_name.to_string(),
                location: "fake build service".to_string(),
            });
        }
        fs::write(local_path, remote_name.as_bytes()).map_err(|source| FetchError::Io {
            path: local_path.to_path_buf(),
            source,
        })
    }
}

/// Decompressor that records archives and optionally drops a `boot.img`.
#[derive(Default)]
pub(crate) struct RecordingDecompressor {
    archives: RefCell<Vec<PathBuf>>,
    write_boot_image: bool,
}

impl RecordingDecompressor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every decompression also materializes `boot.img` next to the archive.
    pub(crate) fn with_boot_image() -> Self {
        Self {
            archives: RefCell::new(Vec::new()),
            write_boot_image: true,
        }
    }

    pub(crate) fn archives(&self) -> Vec<PathBuf> {
        self.archives.borrow().clone()
    }
}

impl Decompressor for RecordingDecompressor {
    fn decompress(&self, archive: &Path) -> Result<(), ExtractError> {
        self.archives.borrow_mut().push(archive.to_path_buf());
        if self.write_boot_image {
            let dir = archive.parent().unwrap_or(Path::new("."));
            fs::write(dir.join("boot.img"), b"ANDROID!").map_err(|source| ExtractError::Io {
                path: dir.join("boot.img"),
                source,
            })?;
        }
        Ok(())
    }
}
