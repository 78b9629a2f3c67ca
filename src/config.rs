//! Stager configuration file.
//!
//! Every key is optional:
//!
//! ```toml
//! [staging]
//! download_dir = "/tmp/acloud_image_artifacts"
//! min_free_gib = 10
//!
//! [setup]
//! required_package = "cuttlefish-common"
//!
//! [fetch]
//! tool = "fetch_artifact"
//! mirror_dir = "/srv/build-mirror"
//! token_env = "ARTIFACT_STAGER_TOKEN"
//!
//! [post_process]
//! unpack_tool = "bin/unpack_bootimg"
//! acl_tool = "setfacl"
//! acl_group = "libvirt-qemu"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::disk_space::GIB;
use crate::post_process::PostProcessTools;

pub const DEFAULT_DOWNLOAD_DIR: &str = "/tmp/acloud_image_artifacts";
pub const DEFAULT_MIN_FREE_GIB: u64 = 10;
pub const DEFAULT_REQUIRED_PACKAGE: &str = "cuttlefish-common";
pub const DEFAULT_FETCH_TOOL: &str = "fetch_artifact";
pub const DEFAULT_TOKEN_ENV: &str = "ARTIFACT_STAGER_TOKEN";
const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIRNAME: &str = "artifact-stager";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagerConfig {
    pub download_dir: String,
    pub min_free_gib: u64,
    pub required_package: String,
    pub fetch_tool: PathBuf,
    pub mirror_dir: Option<PathBuf>,
    pub token_env: String,
    pub post_process: PostProcessTools,
}

impl Default for StagerConfig {
    fn default() -> Self {
        Self {
            download_dir: DEFAULT_DOWNLOAD_DIR.to_string(),
            min_free_gib: DEFAULT_MIN_FREE_GIB,
            required_package: DEFAULT_REQUIRED_PACKAGE.to_string(),
            fetch_tool: PathBuf::from(DEFAULT_FETCH_TOOL),
            mirror_dir: None,
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            post_process: PostProcessTools::default(),
        }
    }
}

impl StagerConfig {
    pub fn min_free_bytes(&self) -> u64 {
        self.min_free_gib.saturating_mul(GIB)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    staging: Option<StagingToml>,
    setup: Option<SetupToml>,
    fetch: Option<FetchToml>,
    post_process: Option<PostProcessToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StagingToml {
    download_dir: Option<String>,
    min_free_gib: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetupToml {
    required_package: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FetchToml {
    tool: Option<String>,
    mirror_dir: Option<String>,
    token_env: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PostProcessToml {
    unpack_tool: Option<String>,
    acl_tool: Option<String>,
    acl_group: Option<String>,
}

/// Default config file location, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIRNAME).join(CONFIG_FILENAME))
}

/// Load configuration from `explicit`, else the default location if it
/// exists, else built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<StagerConfig> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }
    match default_config_path() {
        Some(path) if path.is_file() => load_config_file(&path),
        _ => Ok(StagerConfig::default()),
    }
}

pub fn load_config_file(path: &Path) -> Result<StagerConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading stager config '{}'", path.display()))?;
    parse_config(&raw, path)
}

fn parse_config(raw: &str, path: &Path) -> Result<StagerConfig> {
    let parsed: ConfigToml = toml::from_str(raw)
        .with_context(|| format!("parsing stager config '{}'", path.display()))?;
    let mut config = StagerConfig::default();

    if let Some(staging) = parsed.staging {
        if let Some(dir) = staging.download_dir {
            config.download_dir = non_empty(dir, "staging.download_dir", path)?;
        }
        if let Some(gib) = staging.min_free_gib {
            if gib == 0 {
                bail!(
                    "invalid stager config '{}': staging.min_free_gib must be at least 1",
                    path.display()
                );
            }
            config.min_free_gib = gib;
        }
    }

    if let Some(setup) = parsed.setup {
        if let Some(package) = setup.required_package {
            config.required_package = non_empty(package, "setup.required_package", path)?;
        }
    }

    if let Some(fetch) = parsed.fetch {
        if let Some(tool) = fetch.tool {
            config.fetch_tool = PathBuf::from(non_empty(tool, "fetch.tool", path)?);
        }
        if let Some(mirror) = fetch.mirror_dir {
            config.mirror_dir = Some(PathBuf::from(non_empty(mirror, "fetch.mirror_dir", path)?));
        }
        if let Some(var) = fetch.token_env {
            config.token_env = non_empty(var, "fetch.token_env", path)?;
        }
    }

    if let Some(post) = parsed.post_process {
        if let Some(tool) = post.unpack_tool {
            config.post_process.unpack_tool =
                PathBuf::from(non_empty(tool, "post_process.unpack_tool", path)?);
        }
        if let Some(tool) = post.acl_tool {
            config.post_process.acl_tool =
                PathBuf::from(non_empty(tool, "post_process.acl_tool", path)?);
        }
        if let Some(group) = post.acl_group {
            config.post_process.acl_group = non_empty(group, "post_process.acl_group", path)?;
        }
    }

    Ok(config)
}

fn non_empty(value: String, field: &str, path: &Path) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!(
            "invalid stager config '{}': {} must not be empty",
            path.display(),
            field
        );
    }
    Ok(trimmed.to_string())
}
