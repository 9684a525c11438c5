//! Moves a downloaded result to its final home without ever losing the original.

use crate::constants::{BACKUP_EXTENSION, MAX_COLLISION_ATTEMPTS};
use crate::error::{CompressionError, Result};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Where optimized images end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementPolicy {
    /// Replace the source file, keeping a `.bak` sibling until the swap succeeds.
    OverrideInPlace,
    /// Move into this directory, picking `name (n).ext` when the name is taken.
    Directory(PathBuf),
}

impl PlacementPolicy {
    pub fn from_settings(override_original: bool, directory: Option<PathBuf>) -> Self {
        if override_original {
            PlacementPolicy::OverrideInPlace
        } else {
            PlacementPolicy::Directory(directory.unwrap_or_default())
        }
    }

    /// Checks what can be checked before any upload is spent.
    pub fn validate(&self) -> Result<()> {
        match self {
            PlacementPolicy::Directory(dir) if dir.as_os_str().is_empty() => {
                Err(CompressionError::DestinationNotConfigured)
            }
            _ => Ok(()),
        }
    }
}

/// Moves `temp` into place for the image at `source` and returns the final path.
pub fn place(temp: &Path, source: &Path, policy: &PlacementPolicy) -> Result<PathBuf> {
    place_with(temp, source, policy, move_file)
}

pub(crate) fn place_with<M>(temp: &Path, source: &Path, policy: &PlacementPolicy, mover: M) -> Result<PathBuf>
where
    M: FnMut(&Path, &Path) -> io::Result<()>,
{
    if !temp.is_file() {
        return Err(CompressionError::TempFileMissing(temp.to_path_buf()));
    }

    match policy {
        PlacementPolicy::OverrideInPlace => override_in_place(temp, source, mover),
        PlacementPolicy::Directory(dir) => place_in_directory(temp, source, dir, mover),
    }
}

/// `<file name>.bak` next to `source`.
pub fn backup_path(source: &Path) -> PathBuf {
    let mut name = source
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".");
    name.push(BACKUP_EXTENSION);
    source.with_file_name(name)
}

/// Collision candidate `n` for `source` inside `dir`; `n == 0` is the plain name.
pub fn candidate_path(dir: &Path, source: &Path, n: u32) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = if n == 0 {
        stem
    } else {
        format!("{} ({})", stem, n)
    };
    if let Some(ext) = source.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    dir.join(name)
}

fn override_in_place<M>(temp: &Path, source: &Path, mut mover: M) -> Result<PathBuf>
where
    M: FnMut(&Path, &Path) -> io::Result<()>,
{
    let backup = backup_path(source);
    // rename would silently replace an existing file in the backup slot.
    if fs::symlink_metadata(&backup).is_ok() {
        return Err(CompressionError::Backup {
            path: source.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", backup.display()),
            ),
        });
    }
    fs::rename(source, &backup).map_err(|e| CompressionError::Backup {
        path: source.to_path_buf(),
        source: e,
    })?;

    match mover(temp, source) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(&backup) {
                tracing::warn!(backup = %backup.display(), error = %e, "could not remove backup");
            }
            tracing::debug!(path = %source.display(), "replaced original");
            Ok(source.to_path_buf())
        }
        Err(err) => {
            tracing::warn!(path = %source.display(), error = %err, "replace failed, restoring backup");
            if backup.exists() {
                // A partial move may have left something at the source path.
                if let Err(restore_err) = fs::rename(&backup, source) {
                    return Err(CompressionError::RollbackFailed {
                        original: source.to_path_buf(),
                        backup,
                        source: restore_err,
                    });
                }
            }
            Err(CompressionError::Placement {
                path: source.to_path_buf(),
                source: err,
            })
        }
    }
}

fn place_in_directory<M>(temp: &Path, source: &Path, dir: &Path, mut mover: M) -> Result<PathBuf>
where
    M: FnMut(&Path, &Path) -> io::Result<()>,
{
    if dir.as_os_str().is_empty() {
        return Err(CompressionError::DestinationNotConfigured);
    }
    if !dir.is_dir() {
        // create_dir_all tolerates a concurrent job creating it first
        fs::create_dir_all(dir).map_err(|e| CompressionError::DirectoryCreationFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }

    for n in 0..=MAX_COLLISION_ATTEMPTS {
        let target = candidate_path(dir, source, n);
        if target.exists() {
            continue;
        }
        // Claim the slot first so a sibling job cannot pick the same name.
        match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(CompressionError::Placement {
                    path: target,
                    source: e,
                })
            }
        }

        return match mover(temp, &target) {
            Ok(()) => {
                tracing::debug!(path = %target.display(), "placed optimized image");
                Ok(target)
            }
            Err(e) => {
                let _ = fs::remove_file(&target);
                Err(CompressionError::Placement {
                    path: target,
                    source: e,
                })
            }
        };
    }

    Err(CompressionError::CollisionLimitExceeded {
        directory: dir.to_path_buf(),
        attempts: MAX_COLLISION_ATTEMPTS,
    })
}

/// Rename, or copy and delete when the rename crosses filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(rename_err) => {
            fs::copy(from, to).map_err(|_| rename_err)?;
            fs::remove_file(from)
        }
    }
}
