//! Record of a completed staging, written into the staged directory.
//!
//! The manifest is informational: it lists archive digests and the file count
//! for whoever inspects the tree later. Reuse does not depend on it, because
//! failed stagings remove their directory and directories staged by other
//! tools carry no manifest.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use walkdir::WalkDir;

use crate::build_client::BuildArtifactRef;
use crate::fetch::FetchedFile;

pub const MANIFEST_FILENAME: &str = ".stage-manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub name: String,
    pub sha256: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageManifest {
    pub build_target: String,
    pub build_id: String,
    pub staged_at_utc: String,
    pub archives: Vec<ArchiveRecord>,
    pub file_count: u64,
}

impl StageManifest {
    /// Describe the staged tree at `dir` after `fetched` were extracted into it.
    pub fn collect(build: &BuildArtifactRef, dir: &Path, fetched: &[FetchedFile]) -> Result<Self> {
        let mut archives = Vec::with_capacity(fetched.len());
        for file in fetched {
            let (sha256, size_bytes) = sha256_file(&file.local_path)?;
            archives.push(ArchiveRecord {
                name: file.remote_name.clone(),
                sha256,
                size_bytes,
            });
        }

        Ok(Self {
            build_target: build.build_target.clone(),
            build_id: build.build_id.clone(),
            staged_at_utc: now_utc_compact(),
            archives,
            file_count: count_files(dir),
        })
    }
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILENAME)
}

pub fn write_manifest(dir: &Path, manifest: &StageManifest) -> Result<()> {
    let path = manifest_path(dir);
    write_json_atomic(&path, manifest)
        .with_context(|| format!("writing stage manifest '{}'", path.display()))
}

/// Load the manifest of a staged directory, `None` if it has none.
pub fn read_manifest(dir: &Path) -> Result<Option<StageManifest>> {
    let path = manifest_path(dir);
    if !path.is_file() {
        return Ok(None);
    }
    let bytes =
        fs::read(&path).with_context(|| format!("reading stage manifest '{}'", path.display()))?;
    let parsed = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing stage manifest '{}'", path.display()))?;
    Ok(Some(parsed))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path without parent '{}'", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating parent directory '{}'", parent.display()))?;
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    let payload = serde_json::to_vec_pretty(value).context("serializing stage manifest")?;
    fs::write(&tmp, payload).with_context(|| format!("writing temp file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "renaming temp file '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 1024 * 1024];
    let mut size = 0u64;
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

fn count_files(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() != MANIFEST_FILENAME)
        .count() as u64
}

fn now_utc_compact() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
