//! In-place archive extraction.
//!
//! Archives are unpacked into their containing directory, overwriting
//! existing files. Tarballs are handled natively; zip archives go through
//! `unzip`.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::debug;

use crate::process::{ProcessRunner, ToolCommand, ToolError};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported archive format '{}'", path.display())]
    UnsupportedFormat { path: PathBuf },
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Archive encodings recognised by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarZst,
}

impl ArchiveFormat {
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.zst") {
            Some(Self::TarZst)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// Extracts an archive into the directory that contains it.
pub trait Decompressor {
    fn decompress(&self, archive: &Path) -> Result<(), ExtractError>;
}

pub struct ArchiveDecompressor<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> ArchiveDecompressor<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }
}

impl Decompressor for ArchiveDecompressor<'_> {
    fn decompress(&self, archive: &Path) -> Result<(), ExtractError> {
        let format = ArchiveFormat::detect(archive).ok_or_else(|| {
            ExtractError::UnsupportedFormat {
                path: archive.to_path_buf(),
            }
        })?;
        let dest = archive.parent().unwrap_or_else(|| Path::new("."));
        debug!(archive = %archive.display(), ?format, "decompressing");

        match format {
            ArchiveFormat::Zip => {
                let cmd = ToolCommand::new("unzip")
                    .arg("-o")
                    .arg("-q")
                    .arg(archive)
                    .arg("-d")
                    .arg(dest);
                self.runner.run(&cmd)?;
                Ok(())
            }
            ArchiveFormat::Tar => unpack_tar(archive, open(archive)?, dest),
            ArchiveFormat::TarGz => unpack_tar(archive, GzDecoder::new(open(archive)?), dest),
            ArchiveFormat::TarZst => {
                let decoder = zstd::stream::Decoder::new(open(archive)?).map_err(|source| {
                    ExtractError::Io {
                        path: archive.to_path_buf(),
                        source,
                    }
                })?;
                unpack_tar(archive, decoder, dest)
            }
        }
    }
}

fn open(path: &Path) -> Result<File, ExtractError> {
    File::open(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn unpack_tar<R: Read>(archive: &Path, reader: R, dest: &Path) -> Result<(), ExtractError> {
    let mut tar = tar::Archive::new(reader);
    tar.set_overwrite(true);
    tar.set_preserve_permissions(true);
    tar.unpack(dest).map_err(|source| ExtractError::Io {
        path: archive.to_path_buf(),
        source,
    })
}
