//! Extracts a gzip-compressed tar stream into a destination directory,
//! preserving file modes. Used to overlay a downloaded package onto a
//! version directory cloned from the previous install.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to open archive {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("short write for {path}: wrote {written} of {declared} declared bytes")]
    ShortWrite {
        path: PathBuf,
        written: u64,
        declared: u64,
    },
    #[error("I/O error extracting {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Decompress `archive_path` and write its entries under `destination_dir`.
/// Existing files at the destination are overwritten, which is how an
/// update package applies on top of a clone of the prior version.
pub fn extract_gzip_tar(archive_path: &Path, destination_dir: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path).map_err(|source| ExtractError::Open {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);

    let entries = archive.entries().map_err(|source| ExtractError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;

    for entry_result in entries {
        let mut entry = match entry_result {
            Ok(entry) => entry,
            Err(e) => {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    break;
                }
                warn!(error = %e, "skipping unreadable tar entry header");
                continue;
            }
        };

        let entry_path = match entry.path() {
            Ok(p) => p.into_owned(),
            Err(e) => {
                warn!(error = %e, "skipping tar entry with unreadable path");
                continue;
            }
        };
        let dest_path = destination_dir.join(&entry_path);
        let mode = entry.header().mode().unwrap_or(0o644);

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&dest_path).map_err(|source| ExtractError::Create {
                    path: dest_path.clone(),
                    source,
                })?;
                set_mode(&dest_path, mode);
            }
            EntryType::Regular => {
                if let Some(parent) = dest_path.parent() {
                    fs::create_dir_all(parent).map_err(|source| ExtractError::Create {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                let declared_size = entry.header().size().unwrap_or(0);
                let mut out = File::create(&dest_path).map_err(|source| ExtractError::Create {
                    path: dest_path.clone(),
                    source,
                })?;
                let written =
                    io::copy(&mut entry, &mut out).map_err(|source| ExtractError::Io {
                        path: dest_path.clone(),
                        source,
                    })?;
                if written != declared_size {
                    return Err(ExtractError::ShortWrite {
                        path: dest_path,
                        written,
                        declared: declared_size,
                    });
                }
                set_mode(&dest_path, mode);
            }
            other => {
                warn!(entry_type = ?other, path = %entry_path.display(), "skipping unsupported tar entry type");
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}
