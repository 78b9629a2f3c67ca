//! Staging of prebuilt remote device builds for local emulator instances.
//!
//! Given a build target and build id, the stager picks a local directory with
//! enough free space, downloads the device image archive and the host tool
//! package, extracts both, unpacks the boot image and opens the tree up to
//! the launcher's group.
//!
//! - **Disk space** - [`disk_space::DiskSpaceAdvisor`] resolves the base directory,
//!   prompting the operator when it is missing or too small
//! - **Fetch** - [`fetch::ArtifactFetcher`] downloads the required files through a
//!   [`build_client::BuildClient`] and decompresses them in place
//! - **Post-processing** - [`post_process::ArtifactPostProcessor`] unpacks `boot.img`
//!   and normalizes permissions
//! - **Pipeline** - [`pipeline::StagingPipeline`] ties them together and reuses an
//!   existing per-build directory
//!
//! # Architecture
//!
//! ```text
//! StagingPipeline
//!     │
//!     ├── DiskSpaceAdvisor ──── Operator, SpaceProbe
//!     ├── ArtifactFetcher ───── BuildClient (CredentialProvider), Decompressor
//!     └── ArtifactPostProcessor ── ProcessRunner
//! ```
//!
//! Every collaborator is passed in explicitly; nothing is read from global
//! state apart from the process environment by the CLI.
//!
//! # Example
//!
//! ```rust,ignore
//! use artifact_stager::prelude::*;
//!
//! let runner = SystemRunner;
//! let operator = TerminalOperator::new();
//! let client = MirrorClient::new("/srv/build-mirror");
//! let decompressor = ArchiveDecompressor::new(&runner);
//!
//! let pipeline = StagingPipeline::new(
//!     DiskSpaceAdvisor::new(&operator, &Fs2Probe, DEFAULT_MIN_FREE_BYTES),
//!     ArtifactFetcher::new(&client, &decompressor),
//!     ArtifactPostProcessor::new(&runner, PostProcessTools::default()),
//! );
//! let dir = pipeline.stage(&StageRequest {
//!     build: BuildArtifactRef::new("aosp_cf_x86_phone-userdebug", "1234"),
//!     requested_dir: "/tmp/acloud_image_artifacts".into(),
//!     setup_ok: true,
//!     required_package: "cuttlefish-common".into(),
//! })?;
//! ```

pub mod archive;
pub mod build_client;
pub mod config;
pub mod disk_space;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod manifest;
pub mod operator;
pub mod pipeline;
pub mod post_process;
pub mod preflight;
pub mod process;

#[cfg(test)]
pub(crate) mod fakes;

pub use build_client::BuildArtifactRef;
pub use error::{Result, StageError};
pub use pipeline::{StageOutcome, StageRequest, StagingPipeline};

/// Everything needed to assemble a pipeline.
pub mod prelude {
    pub use crate::archive::{ArchiveDecompressor, Decompressor};
    pub use crate::build_client::{
        AnonymousCredentials, BuildArtifactRef, BuildClient, CredentialProvider, EnvCredentials,
        FetchToolClient, MirrorClient,
    };
    pub use crate::disk_space::{DiskSpaceAdvisor, Fs2Probe, SpaceProbe, DEFAULT_MIN_FREE_BYTES};
    pub use crate::error::StageError;
    pub use crate::fetch::ArtifactFetcher;
    pub use crate::operator::{Operator, TerminalOperator};
    pub use crate::pipeline::{StageOutcome, StageRequest, StagingPipeline};
    pub use crate::post_process::{ArtifactPostProcessor, PostProcessTools};
    pub use crate::process::{ProcessRunner, SystemRunner};
}
