//! Manages the `versions_root/<version>/` directory layout: resolving
//! "latest", cloning a version tree for staging, and scratch-space
//! bookkeeping under `versions_root/tmp`.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

pub const SCRATCH_DIR_NAME: &str = "tmp";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read versions root {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to clone version tree from {src} to {dst}: {source}")]
    Clone {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to prepare scratch directory {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn is_participating_entry(name: &str) -> bool {
    name != SCRATCH_DIR_NAME && !name.starts_with('.')
}

/// List entries of `versions_root`, sort ascending by name, and return the
/// last non-`tmp`, non-hidden entry. `None` if there are no version
/// directories yet (first install).
pub fn latest_version(versions_root: &Path) -> Result<Option<String>, StoreError> {
    let mut names = Vec::new();
    let read_dir = match fs::read_dir(versions_root) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::ReadDir {
                path: versions_root.to_path_buf(),
                source,
            })
        }
    };
    for entry in read_dir {
        let entry = entry.map_err(|source| StoreError::ReadDir {
            path: versions_root.to_path_buf(),
            source,
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_participating_entry(name) {
                names.push(name.to_owned());
            }
        }
    }
    names.sort();
    Ok(names.pop())
}

/// Path of a (possibly not-yet-existing) version directory.
pub fn version_path(versions_root: &Path, version: &str) -> PathBuf {
    versions_root.join(version)
}

/// Recursively copy `src_version`'s tree into `dst_version`. If the source
/// version does not exist (first install), `dst_version` is created empty.
///
/// Not atomic: callers must `discard(dst_version)` on any downstream
/// failure before returning.
pub fn clone_version(
    versions_root: &Path,
    src_version: Option<&str>,
    dst_version: &str,
) -> Result<PathBuf, StoreError> {
    let dst = version_path(versions_root, dst_version);
    let src = src_version.map(|v| version_path(versions_root, v));

    let result = match &src {
        Some(src_path) if src_path.is_dir() => copy_dir_recursive(src_path, &dst),
        _ => fs::create_dir_all(&dst),
    };

    result.map_err(|source| StoreError::Clone {
        src: src.unwrap_or_else(|| PathBuf::from("<none>")),
        dst: dst.clone(),
        source,
    })?;
    Ok(dst)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dst_path = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &dst_path)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &dst_path)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = entry.metadata()?.permissions();
                fs::set_permissions(&dst_path, fs::Permissions::from_mode(perms.mode()))?;
            }
        }
    }
    Ok(())
}

/// Return `versions_root/tmp`, recreated empty so the caller gets a clean
/// scratch area for one engine tick.
pub fn stage_temp(versions_root: &Path) -> Result<PathBuf, StoreError> {
    let tmp = versions_root.join(SCRATCH_DIR_NAME);
    if tmp.exists() {
        fs::remove_dir_all(&tmp).map_err(|source| StoreError::Scratch {
            path: tmp.clone(),
            source,
        })?;
    }
    fs::create_dir_all(&tmp).map_err(|source| StoreError::Scratch {
        path: tmp.clone(),
        source,
    })?;
    Ok(tmp)
}

/// Recursively remove `path`. Logs on failure but never errors — there is
/// nothing better to do with a failed cleanup of scratch or staging state.
pub fn discard(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to discard directory");
        }
    }
}
