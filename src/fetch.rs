//! Download and decompression of the files a local device instance needs.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::archive::Decompressor;
use crate::build_client::{BuildArtifactRef, BuildClient};
use crate::error::{Result, StageError};

/// Host tool package name. Identical for every build.
pub const HOST_PACKAGE_NAME: &str = "cvd-host_package.tar.gz";

/// Build variants stripped from a build target to form the product name.
const BUILD_VARIANTS: &[&str] = &["user", "userdebug", "eng"];

/// One file of a remote build the stager must fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredFile {
    pub remote_name: String,
    pub is_compressed: bool,
}

/// The fixed file list for a local instance: device image archive and host
/// tool package.
pub fn required_files(build: &BuildArtifactRef) -> Vec<RequiredFile> {
    vec![
        RequiredFile {
            remote_name: format!(
                "{}-img-{}.zip",
                product_name(&build.build_target),
                build.build_id
            ),
            is_compressed: true,
        },
        RequiredFile {
            remote_name: HOST_PACKAGE_NAME.to_string(),
            is_compressed: true,
        },
    ]
}

/// `aosp_cf_x86_phone-userdebug` -> `aosp_cf_x86_phone`.
pub fn product_name(build_target: &str) -> &str {
    match build_target.rsplit_once('-') {
        Some((product, variant)) if BUILD_VARIANTS.contains(&variant) => product,
        _ => build_target,
    }
}

/// A downloaded archive in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub remote_name: String,
    pub local_path: PathBuf,
}

pub struct ArtifactFetcher<'a> {
    client: &'a dyn BuildClient,
    decompressor: &'a dyn Decompressor,
}

impl<'a> ArtifactFetcher<'a> {
    pub fn new(client: &'a dyn BuildClient, decompressor: &'a dyn Decompressor) -> Self {
        Self {
            client,
            decompressor,
        }
    }

    /// Download every required file into `dest_dir`, then decompress them in
    /// place. Nothing is decompressed unless every download succeeded.
    pub fn fetch_and_extract(
        &self,
        build: &BuildArtifactRef,
        dest_dir: &Path,
    ) -> Result<Vec<FetchedFile>> {
        fs::create_dir_all(dest_dir)
            .map_err(|e| StageError::io("creating artifact directory", dest_dir, e))?;

        let mut fetched = Vec::new();
        for file in required_files(build) {
            let local_path = dest_dir.join(&file.remote_name);
            info!(
                build_target = %build.build_target,
                build_id = %build.build_id,
                file = %file.remote_name,
                "downloading"
            );
            self.client
                .download(
                    &build.build_target,
                    &build.build_id,
                    &file.remote_name,
                    &local_path,
                )
                .map_err(|source| StageError::RemoteFetch {
                    build_target: build.build_target.clone(),
                    build_id: build.build_id.clone(),
                    file: file.remote_name.clone(),
                    source,
                })?;
            fetched.push((file, local_path));
        }

        for (file, local_path) in &fetched {
            if !file.is_compressed {
                continue;
            }
            info!(archive = %local_path.display(), "decompressing");
            self.decompressor
                .decompress(local_path)
                .map_err(|source| StageError::Extract {
                    archive: local_path.clone(),
                    source,
                })?;
        }

        Ok(fetched
            .into_iter()
            .map(|(file, local_path)| FetchedFile {
                remote_name: file.remote_name,
                local_path,
            })
            .collect())
    }
}
