//! End-to-end staging of one remote build.
//!
//! ```text
//! stage(build, requested_dir)
//!     │
//!     ├── setup check            (SetupIncomplete, no I/O)
//!     ├── DiskSpaceAdvisor       (base dir, may prompt)
//!     ├── <base>/<build_id> exists?  ── yes ──┐
//!     ├── ArtifactFetcher        (download + decompress)
//!     ├── ArtifactPostProcessor ◀─────────────┘
//!     └── stage manifest         (fresh fetches only)
//! ```
//!
//! An existing per-build directory is trusted as a complete earlier staging.
//! A fresh staging that fails removes the per-build directory it created, so
//! only completed stagings are left behind for reuse. The stage manifest is a
//! record for operators; directories staged without one are still reused.
//! Callers must serialize concurrent stagings of the same build id.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::build_client::BuildArtifactRef;
use crate::disk_space::DiskSpaceAdvisor;
use crate::error::{Result, StageError};
use crate::fetch::ArtifactFetcher;
use crate::manifest::{read_manifest, write_manifest, StageManifest};
use crate::post_process::ArtifactPostProcessor;

/// Parameters of one staging request.
#[derive(Debug, Clone)]
pub struct StageRequest {
    pub build: BuildArtifactRef,
    pub requested_dir: String,
    /// Outcome of the host setup check.
    pub setup_ok: bool,
    /// Package reported in [`StageError::SetupIncomplete`].
    pub required_package: String,
}

/// How the returned directory came to be staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Fetched,
    Reused,
}

pub struct StagingPipeline<'a> {
    advisor: DiskSpaceAdvisor<'a>,
    fetcher: ArtifactFetcher<'a>,
    post_processor: ArtifactPostProcessor<'a>,
}

impl<'a> StagingPipeline<'a> {
    pub fn new(
        advisor: DiskSpaceAdvisor<'a>,
        fetcher: ArtifactFetcher<'a>,
        post_processor: ArtifactPostProcessor<'a>,
    ) -> Self {
        Self {
            advisor,
            fetcher,
            post_processor,
        }
    }

    /// Stage `request.build` and return the per-build artifact directory.
    pub fn stage(&self, request: &StageRequest) -> Result<PathBuf> {
        self.stage_with_outcome(request).map(|(path, _)| path)
    }

    pub fn stage_with_outcome(&self, request: &StageRequest) -> Result<(PathBuf, StageOutcome)> {
        if !request.setup_ok {
            return Err(StageError::SetupIncomplete {
                package: request.required_package.clone(),
            });
        }

        let base_dir = self.advisor.resolve(&request.requested_dir)?;
        let extract_path = base_dir.join(&request.build.build_id);

        let outcome = if extract_path.exists() {
            info!(
                dir = %extract_path.display(),
                build_id = %request.build.build_id,
                "artifacts already staged, skipping download"
            );
            match read_manifest(&extract_path) {
                Ok(Some(_)) => {}
                Ok(None) => warn!(
                    dir = %extract_path.display(),
                    "staged directory has no manifest; assuming it is complete"
                ),
                Err(err) => warn!(error = %format!("{err:#}"), "unreadable stage manifest"),
            }
            self.post_processor.finalize(&extract_path)?;
            StageOutcome::Reused
        } else {
            let fetched = self
                .fetcher
                .fetch_and_extract(&request.build, &extract_path)
                .and_then(|fetched| {
                    self.post_processor.finalize(&extract_path)?;
                    Ok(fetched)
                })
                .map_err(|err| {
                    discard_partial_stage(&extract_path);
                    err
                })?;

            if let Err(err) = StageManifest::collect(&request.build, &extract_path, &fetched)
                .and_then(|manifest| write_manifest(&extract_path, &manifest))
            {
                warn!(error = %format!("{err:#}"), "failed to record stage manifest");
            }
            StageOutcome::Fetched
        };

        info!(dir = %extract_path.display(), ?outcome, "staging complete");
        Ok((extract_path, outcome))
    }
}

fn discard_partial_stage(dir: &Path) {
    if !dir.exists() {
        return;
    }
    match fs::remove_dir_all(dir) {
        Ok(()) => warn!(dir = %dir.display(), "removed incomplete staging"),
        Err(err) => warn!(
            dir = %dir.display(),
            error = %err,
            "failed to remove incomplete staging; delete it before retrying"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_space::GIB;
    use crate::fakes::{
        RecordingClient, RecordingDecompressor, RecordingRunner, ScriptedOperator, ScriptedProbe,
    };
    use crate::manifest::manifest_path;
    use crate::post_process::{PostProcessTools, BOOT_IMAGE};
    use tempfile::TempDir;

    struct Harness {
        operator: ScriptedOperator,
        probe: ScriptedProbe,
        client: RecordingClient,
        decompressor: RecordingDecompressor,
        runner: RecordingRunner,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                operator: ScriptedOperator::new(Vec::<&str>::new()),
                probe: ScriptedProbe::new([11 * GIB]),
                client: RecordingClient::new(),
                decompressor: RecordingDecompressor::with_boot_image(),
                runner: RecordingRunner::new(),
            }
        }

        fn pipeline(&self) -> StagingPipeline<'_> {
            StagingPipeline::new(
                DiskSpaceAdvisor::new(&self.operator, &self.probe, 10 * GIB),
                ArtifactFetcher::new(&self.client, &self.decompressor),
                ArtifactPostProcessor::new(&self.runner, PostProcessTools::default()),
            )
        }
    }

    fn request(dir: &std::path::Path, setup_ok: bool) -> StageRequest {
        StageRequest {
            build: BuildArtifactRef::new("aosp_cf_x86_phone-userdebug", "1234"),
            requested_dir: dir.display().to_string(),
            setup_ok,
            required_package: "cuttlefish-common".into(),
        }
    }

    #[test]
    fn test_setup_incomplete_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("never_created");
        let h = Harness::new();

        let err = h.pipeline().stage(&request(&missing, false)).unwrap_err();
        assert!(matches!(err, StageError::SetupIncomplete { .. }));
        assert!(!missing.exists());
        assert!(h.operator.questions().is_empty());
        assert!(h.probe.measured().is_empty());
        assert!(h.client.calls().is_empty());
        assert!(h.runner.calls().is_empty());
    }

    #[test]
    fn test_fresh_stage_fetches_then_post_processes() {
        let temp = TempDir::new().unwrap();
        let h = Harness::new();

        let (path, outcome) = h
            .pipeline()
            .stage_with_outcome(&request(temp.path(), true))
            .unwrap();

        assert_eq!(path, temp.path().join("1234"));
        assert_eq!(outcome, StageOutcome::Fetched);
        assert_eq!(h.client.calls().len(), 2);
        assert_eq!(h.decompressor.archives().len(), 2);
        assert_eq!(h.runner.programs(), vec!["unpack_bootimg", "setfacl"]);
        assert_eq!(
            h.runner.calls()[0].args[1],
            path.join(BOOT_IMAGE).into_os_string()
        );
        assert!(manifest_path(&path).is_file());
    }

    #[test]
    fn test_existing_build_dir_skips_fetch() {
        let temp = TempDir::new().unwrap();
        let staged = temp.path().join("1234");
        fs::create_dir_all(&staged).unwrap();
        fs::write(staged.join(BOOT_IMAGE), b"ANDROID!").unwrap();
        let h = Harness::new();

        let (path, outcome) = h
            .pipeline()
            .stage_with_outcome(&request(temp.path(), true))
            .unwrap();

        assert_eq!(path, staged);
        assert_eq!(outcome, StageOutcome::Reused);
        assert!(h.client.calls().is_empty());
        assert!(h.decompressor.archives().is_empty());
        assert_eq!(h.runner.programs(), vec!["unpack_bootimg", "setfacl"]);
    }

    #[test]
    fn test_missing_boot_image_after_fetch() {
        let temp = TempDir::new().unwrap();
        let mut h = Harness::new();
        h.decompressor = RecordingDecompressor::new();

        let err = h.pipeline().stage(&request(temp.path(), true)).unwrap_err();
        assert!(matches!(err, StageError::MissingBootImage { .. }));
        assert!(h.runner.calls().is_empty());
        assert!(!temp.path().join("1234").exists());
    }

    #[test]
    fn test_retry_after_download_failure_fetches_again() {
        let temp = TempDir::new().unwrap();
        let mut h = Harness::new();
        h.client = RecordingClient::failing("aosp_cf_x86_phone-img-1234.zip");

        let err = h.pipeline().stage(&request(temp.path(), true)).unwrap_err();
        assert_eq!(err.kind(), "remote_fetch");
        assert!(!temp.path().join("1234").exists());

        h.client = RecordingClient::new();
        h.probe = ScriptedProbe::new([11 * GIB]);
        let (path, outcome) = h
            .pipeline()
            .stage_with_outcome(&request(temp.path(), true))
            .unwrap();
        assert_eq!(outcome, StageOutcome::Fetched);
        assert_eq!(h.client.calls().len(), 2);
        assert!(manifest_path(&path).is_file());
    }

    #[test]
    fn test_post_process_failure_after_fetch_discards_dir() {
        let temp = TempDir::new().unwrap();
        let mut h = Harness::new();
        h.runner = RecordingRunner::failing("setfacl");

        let err = h.pipeline().stage(&request(temp.path(), true)).unwrap_err();
        assert_eq!(err.kind(), "post_process");
        assert!(!temp.path().join("1234").exists());
    }

    #[test]
    fn test_reused_dir_is_kept_when_finalize_fails() {
        let temp = TempDir::new().unwrap();
        let staged = temp.path().join("1234");
        fs::create_dir_all(&staged).unwrap();
        let h = Harness::new();

        let err = h.pipeline().stage(&request(temp.path(), true)).unwrap_err();
        assert!(matches!(err, StageError::MissingBootImage { .. }));
        assert!(staged.is_dir());
    }

    #[test]
    fn test_download_failure_propagates() {
        let temp = TempDir::new().unwrap();
        let mut h = Harness::new();
        h.client = RecordingClient::failing("aosp_cf_x86_phone-img-1234.zip");

        let err = h.pipeline().stage(&request(temp.path(), true)).unwrap_err();
        assert_eq!(err.kind(), "remote_fetch");
        assert!(h.decompressor.archives().is_empty());
        assert!(h.runner.calls().is_empty());
    }

    #[test]
    fn test_operator_abort_propagates() {
        let temp = TempDir::new().unwrap();
        let mut h = Harness::new();
        h.probe = ScriptedProbe::new([GIB]);
        h.operator = ScriptedOperator::new(["q"]);

        let err = h.pipeline().stage(&request(temp.path(), true)).unwrap_err();
        assert!(matches!(err, StageError::UserAbort { .. }));
        assert!(h.client.calls().is_empty());
    }
}
