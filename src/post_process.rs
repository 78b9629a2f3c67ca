//! Boot image unpacking and permission normalization of a staged tree.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, StageError};
use crate::process::{ProcessRunner, ToolCommand};

/// Boot image expected directly under the staged directory.
pub const BOOT_IMAGE: &str = "boot.img";

/// External tools used by [`ArtifactPostProcessor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostProcessTools {
    /// Boot image unpacker. Relative multi-component paths are resolved
    /// against the staged directory (the host package ships it).
    pub unpack_tool: PathBuf,
    pub acl_tool: PathBuf,
    /// Group granted access to the staged tree.
    pub acl_group: String,
}

impl Default for PostProcessTools {
    fn default() -> Self {
        Self {
            unpack_tool: PathBuf::from("bin/unpack_bootimg"),
            acl_tool: PathBuf::from("setfacl"),
            acl_group: "libvirt-qemu".to_string(),
        }
    }
}

impl PostProcessTools {
    fn unpack_tool_for(&self, dest_dir: &Path) -> PathBuf {
        if self.unpack_tool.is_relative() && self.unpack_tool.components().count() > 1 {
            dest_dir.join(&self.unpack_tool)
        } else {
            self.unpack_tool.clone()
        }
    }
}

pub struct ArtifactPostProcessor<'a> {
    runner: &'a dyn ProcessRunner,
    tools: PostProcessTools,
}

impl<'a> ArtifactPostProcessor<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, tools: PostProcessTools) -> Self {
        Self { runner, tools }
    }

    /// Unpack `boot.img`, then fix up permissions over the whole tree.
    pub fn finalize(&self, dest_dir: &Path) -> Result<()> {
        self.unpack_boot_image(dest_dir)?;
        self.fix_permissions(dest_dir)
    }

    fn unpack_boot_image(&self, dest_dir: &Path) -> Result<()> {
        let boot_img = dest_dir.join(BOOT_IMAGE);
        if !boot_img.is_file() {
            return Err(StageError::MissingBootImage { path: boot_img });
        }

        info!(boot_img = %boot_img.display(), "unpacking boot image");
        let cmd = ToolCommand::new(self.tools.unpack_tool_for(dest_dir))
            .arg("--boot_img")
            .arg(&boot_img)
            .arg("--out")
            .arg(dest_dir);
        self.runner
            .run(&cmd)
            .map_err(|source| StageError::PostProcess {
                step: "boot image unpack",
                path: boot_img,
                source,
            })
    }

    fn fix_permissions(&self, dest_dir: &Path) -> Result<()> {
        info!(dir = %dest_dir.display(), group = %self.tools.acl_group, "normalizing permissions");
        let cmd = ToolCommand::new(&self.tools.acl_tool)
            .arg("-R")
            .arg("-m")
            .arg(format!("g:{}:rwX", self.tools.acl_group))
            .arg(dest_dir);
        self.runner
            .run(&cmd)
            .map_err(|source| StageError::PostProcess {
                step: "permission fix-up",
                path: dest_dir.to_path_buf(),
                source,
            })
    }
}
