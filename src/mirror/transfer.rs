// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File system primitives for swapping.
//!
//! Files and directories are treated alike: a directory always moves or
//! copies as one whole subtree. Moves try a plain rename first and fall back
//! to copy-then-remove when source and destination sit on different file
//! systems, which is common for mirrors on network mounts.

use crate::mirror::{MirrorError, Result};

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};
use tracing::debug;
use walkdir::WalkDir;

/// Check if anything exists at path, dangling symlinks included.
pub fn exists(path: impl AsRef<Path>) -> bool {
    fs::symlink_metadata(path.as_ref()).is_ok()
}

/// Move file or directory, replacing anything at destination.
///
/// # Errors
///
/// - Return [`MirrorError::Filesystem`] if any step fails.
pub fn move_path(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    debug!("move {:?} -> {:?}", src.display(), dst.display());
    prepare_destination(dst)?;

    if let Err(err) = fs::rename(src, dst) {
        debug!("rename failed ({err}), falling back to copy");
        copy_tree(src, dst)?;
        remove_path(src)?;
    }

    Ok(())
}

/// Copy file or directory, replacing anything at destination.
///
/// # Errors
///
/// - Return [`MirrorError::Filesystem`] if any step fails.
pub fn copy_path(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    debug!("copy {:?} -> {:?}", src.display(), dst.display());
    prepare_destination(dst)?;
    copy_tree(src, dst)
}

/// Remove file or directory. Missing paths are not an error.
///
/// # Errors
///
/// - Return [`MirrorError::Filesystem`] if removal fails.
pub fn remove_path(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(fs_error(err, path)),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|err| fs_error(err, path))
}

fn prepare_destination(dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|err| fs_error(err, parent))?;
    }

    remove_path(dst)
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(src).to_path_buf();
            fs_error(err.into(), path)
        })?;

        // INVARIANT: Walk always yields paths under its root.
        let relative = entry.path().strip_prefix(src).unwrap_or(Path::new(""));
        let target = if relative.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(relative)
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|err| fs_error(err, &target))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|err| fs_error(err, &target))?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = fs::read_link(src).map_err(|err| fs_error(err, src))?;
    std::os::unix::fs::symlink(link, dst).map_err(|err| fs_error(err, dst))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)
        .map(|_| ())
        .map_err(|err| fs_error(err, dst))
}

fn fs_error(source: io::Error, path: impl Into<PathBuf>) -> MirrorError {
    MirrorError::Filesystem {
        source,
        path: path.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, read_to_string, write};
    use tempfile::tempdir;

    #[test]
    fn move_directory_replaces_destination() -> anyhow::Result<()> {
        let root = tempdir()?;
        let src = root.path().join("src/tree");
        let dst = root.path().join("deep/dst/tree");
        create_dir_all(src.join("nested"))?;
        write(src.join("nested/file.txt"), "payload")?;
        create_dir_all(&dst)?;
        write(dst.join("stale.txt"), "stale")?;

        move_path(&src, &dst)?;

        assert!(!exists(&src));
        assert_eq!(read_to_string(dst.join("nested/file.txt"))?, "payload");
        assert!(!exists(dst.join("stale.txt")));

        Ok(())
    }

    #[test]
    fn copy_file_keeps_source() -> anyhow::Result<()> {
        let root = tempdir()?;
        let src = root.path().join("a.txt");
        let dst = root.path().join("copies/a.txt");
        write(&src, "alpha")?;

        copy_path(&src, &dst)?;

        assert_eq!(read_to_string(&src)?, "alpha");
        assert_eq!(read_to_string(&dst)?, "alpha");

        Ok(())
    }

    #[test]
    fn remove_missing_path_is_fine() -> anyhow::Result<()> {
        let root = tempdir()?;
        remove_path(root.path().join("nothing"))?;
        Ok(())
    }
}
