//! Remote build artifact retrieval.
//!
//! The build service itself is opaque: a [`BuildClient`] downloads one named
//! file of one build to a local path. Credentials come from an explicitly
//! supplied [`CredentialProvider`] and are fetched once per client.

use std::cell::OnceCell;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::process::{ProcessRunner, ToolCommand, ToolError};

/// Environment variable carrying the access token to the fetch tool.
pub const FETCH_TOKEN_ENV: &str = "ARTIFACT_FETCH_TOKEN";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("credentials unavailable: {0}")]
    Credentials(String),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("artifact '{name}' not found in {location}")]
    NotFound { name: String, location: String },
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Identifies one remote build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifactRef {
    pub build_target: String,
    pub build_id: String,
}

impl BuildArtifactRef {
    pub fn new(build_target: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self {
            build_target: build_target.into(),
            build_id: build_id.into(),
        }
    }
}

/// Downloads named files of a remote build.
pub trait BuildClient {
    fn download(
        &self,
        build_target: &str,
        build_id: &str,
        remote_name: &str,
        local_path: &Path,
    ) -> Result<(), FetchError>;
}

/// Access credentials for the build service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: Option<String>,
}

pub trait CredentialProvider {
    fn credentials(&self) -> Result<Credentials, FetchError>;
}

/// Reads an access token from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvCredentials {
    fn credentials(&self) -> Result<Credentials, FetchError> {
        match env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(Credentials {
                token: Some(token.trim().to_string()),
            }),
            Ok(_) => Err(FetchError::Credentials(format!("{} is empty", self.var))),
            Err(_) => Err(FetchError::Credentials(format!("{} is not set", self.var))),
        }
    }
}

/// No credentials, for public builds and local mirrors.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousCredentials;

impl CredentialProvider for AnonymousCredentials {
    fn credentials(&self) -> Result<Credentials, FetchError> {
        Ok(Credentials::default())
    }
}

/// Downloads through an external fetch tool.
///
/// Invocation: `<tool> --target <t> --build_id <id> --artifact <name> --output <path>`
/// with the token, if any, exported as [`FETCH_TOKEN_ENV`].
pub struct FetchToolClient<'a> {
    tool: PathBuf,
    runner: &'a dyn ProcessRunner,
    provider: Box<dyn CredentialProvider + 'a>,
    credentials: OnceCell<Credentials>,
}

impl<'a> FetchToolClient<'a> {
    pub fn new(
        tool: impl Into<PathBuf>,
        runner: &'a dyn ProcessRunner,
        provider: Box<dyn CredentialProvider + 'a>,
    ) -> Self {
        Self {
            tool: tool.into(),
            runner,
            provider,
            credentials: OnceCell::new(),
        }
    }

    fn credentials(&self) -> Result<&Credentials, FetchError> {
        if let Some(creds) = self.credentials.get() {
            return Ok(creds);
        }
        let creds = self.provider.credentials()?;
        Ok(self.credentials.get_or_init(|| creds))
    }
}

impl BuildClient for FetchToolClient<'_> {
    fn download(
        &self,
        build_target: &str,
        build_id: &str,
        remote_name: &str,
        local_path: &Path,
    ) -> Result<(), FetchError> {
        let creds = self.credentials()?;

        let mut cmd = ToolCommand::new(&self.tool)
            .arg("--target")
            .arg(build_target)
            .arg("--build_id")
            .arg(build_id)
            .arg("--artifact")
            .arg(remote_name)
            .arg("--output")
            .arg(local_path);
        if let Some(token) = &creds.token {
            cmd = cmd.env(FETCH_TOKEN_ENV, token.clone());
        }

        debug!(build_target, build_id, remote_name, "fetching artifact");
        self.runner.run(&cmd)?;

        if !local_path.is_file() {
            return Err(FetchError::NotFound {
                name: remote_name.to_string(),
                location: format!("output of '{}'", self.tool.display()),
            });
        }
        Ok(())
    }
}

/// Copies artifacts from a local mirror laid out as
/// `<root>/<build_target>/<build_id>/<file>`.
#[derive(Debug, Clone)]
pub struct MirrorClient {
    root: PathBuf,
}

impl MirrorClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BuildClient for MirrorClient {
    fn download(
        &self,
        build_target: &str,
        build_id: &str,
        remote_name: &str,
        local_path: &Path,
    ) -> Result<(), FetchError> {
        let source = self.root.join(build_target).join(build_id).join(remote_name);
        if !source.is_file() {
            return Err(FetchError::NotFound {
                name: remote_name.to_string(),
                location: format!("mirror '{}'", self.root.display()),
            });
        }
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).map_err(|source| FetchError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::copy(&source, local_path).map_err(|source| FetchError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}
