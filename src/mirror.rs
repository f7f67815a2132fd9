// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Mirror swapping.
//!
//! A __project__ is a working tree whose managed paths can be exchanged with
//! private copies kept in a separate __mirror__ directory. Swapping in puts
//! mirror content at the original location; swapping out harvests whatever
//! now lives at the original location back into the mirror and restores the
//! original content.
//!
//! # On-Disk Layout
//!
//! All bookkeeping lives in the mirror directory, next to the mirror content
//! of each managed path, mirroring the path's own directory structure:
//!
//! - `<path>`: mirror content.
//! - `<path>.rplc.original`: backup of original content while swapped in.
//! - `<path>.<hostname>.rplc_active`: __sentinel__ that marks the path as
//!   swapped in by `<hostname>`, holding a snapshot of the mirror content
//!   taken at swap-in time.
//!
//! Sentinel existence is the only record of swap state. Because each host only
//! ever creates or removes sentinels bearing its own name, several machines
//! can share one mirror directory (e.g. over a network mount). This is a
//! convention, not a lock: two hosts racing to swap in the same path will
//! usually, but not always, notice each other.
//!
//! # See Also
//!
//! 1. [`sentinel`]
//! 2. [`swap`]

pub mod sentinel;
pub mod swap;
pub mod transfer;

use crate::pathspec::{ManagedPath, PathSpecError};

use std::{
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Component, Path, PathBuf},
};

/// Suffix of backup of original content.
pub const BACKUP_SUFFIX: &str = ".rplc.original";

/// Suffix of sentinel files.
pub const SENTINEL_SUFFIX: &str = ".rplc_active";

/// One managed tree and its mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    project_dir: PathBuf,
    mirror_dir: PathBuf,
    config_file: PathBuf,
}

impl Project {
    /// Construct new project.
    ///
    /// Relative paths are made absolute against the current directory, and
    /// `.` or `..` components are collapsed, without touching the file system.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::OverlappingTrees`] if project and mirror
    ///   directories are the same or nested in one another.
    /// - Return [`MirrorError::Filesystem`] if current directory cannot be
    ///   determined.
    pub fn new(
        project_dir: impl AsRef<Path>,
        mirror_dir: impl AsRef<Path>,
        config_file: impl AsRef<Path>,
    ) -> Result<Self> {
        let project_dir = absolute(project_dir.as_ref())?;
        let mirror_dir = absolute(mirror_dir.as_ref())?;
        let config_file = absolute(config_file.as_ref())?;

        if project_dir.starts_with(&mirror_dir) || mirror_dir.starts_with(&project_dir) {
            return Err(MirrorError::OverlappingTrees {
                project_dir,
                mirror_dir,
            });
        }

        Ok(Self {
            project_dir,
            mirror_dir,
            config_file,
        })
    }

    /// Working root of the project.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Storage root of mirror content.
    pub fn mirror_dir(&self) -> &Path {
        &self.mirror_dir
    }

    /// Document that lists managed paths.
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Location of managed path inside mirror directory, relative to it.
    ///
    /// Absolute managed paths inside the project are keyed relative to the
    /// project. Absolute managed paths elsewhere are keyed by their full path
    /// with the root stripped.
    pub fn mirror_key(&self, path: &ManagedPath) -> PathBuf {
        let path = path.as_path();
        let relative = path.strip_prefix(&self.project_dir).unwrap_or(path);

        relative
            .components()
            .filter(|component| matches!(component, Component::Normal(_)))
            .collect()
    }

    /// Make sure managed path can be swapped without touching either tree as a
    /// whole.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::UnmanageablePath`] if the path has an empty
    ///   mirror key, equals or contains the project or mirror directory, or
    ///   lies inside the mirror directory.
    pub fn check_managed(&self, path: &ManagedPath) -> Result<()> {
        let reason = if self.mirror_key(path).as_os_str().is_empty() {
            "it names no file or directory"
        } else {
            let original = self.original_location(path);
            if self.project_dir.starts_with(&original) {
                "it covers the whole project directory"
            } else if self.mirror_dir.starts_with(&original) {
                "it covers the whole mirror directory"
            } else if original.starts_with(&self.mirror_dir) {
                "it lies inside the mirror directory"
            } else {
                return Ok(());
            }
        };

        Err(MirrorError::UnmanageablePath {
            path: path.to_string(),
            reason,
        })
    }

    /// Location where the project expects the managed path.
    pub fn original_location(&self, path: &ManagedPath) -> PathBuf {
        if path.is_absolute() {
            path.as_path().to_path_buf()
        } else {
            self.project_dir.join(path.as_path())
        }
    }

    /// Location of mirror content.
    pub fn mirror_location(&self, path: &ManagedPath) -> PathBuf {
        self.mirror_dir.join(self.mirror_key(path))
    }

    /// Location of backup of original content.
    pub fn backup_location(&self, path: &ManagedPath) -> PathBuf {
        with_suffix(self.mirror_location(path), BACKUP_SUFFIX)
    }

    /// Location of sentinel of target host.
    pub fn sentinel_location(&self, path: &ManagedPath, hostname: &str) -> PathBuf {
        with_suffix(
            self.mirror_location(path),
            format!(".{hostname}{SENTINEL_SUFFIX}"),
        )
    }
}

impl Display for Project {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{} (mirror {})",
            self.project_dir.display(),
            self.mirror_dir.display()
        )
    }
}

/// Swap state of a managed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SwapState {
    /// Original content is in place.
    NotSwapped,

    /// Mirror content is in place, swapped in by this host.
    SwappedHere(String),

    /// Mirror content is claimed by another host.
    SwappedElsewhere(String),
}

impl SwapState {
    /// Whether any host has the path swapped in.
    pub fn is_swapped_in(&self) -> bool {
        !matches!(self, Self::NotSwapped)
    }

    /// Host that has the path swapped in.
    pub fn hostname(&self) -> Option<&str> {
        match self {
            Self::NotSwapped => None,
            Self::SwappedHere(host) | Self::SwappedElsewhere(host) => Some(host),
        }
    }
}

impl Display for SwapState {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::NotSwapped => fmt.write_str("swapped out"),
            Self::SwappedHere(host) => write!(fmt, "swapped in ({host})"),
            Self::SwappedElsewhere(host) => write!(fmt, "swapped in on other host ({host})"),
        }
    }
}

pub(crate) fn with_suffix(path: impl Into<PathBuf>, suffix: impl AsRef<str>) -> PathBuf {
    let mut name: OsString = path.into().into_os_string();
    name.push(suffix.as_ref());
    PathBuf::from(name)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    let path = std::path::absolute(path).map_err(|err| MirrorError::Filesystem {
        source: err,
        path: path.to_path_buf(),
    })?;

    // INVARIANT: Collapse `.` and `..` lexically, symlinks stay unresolved.
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Mirror swapping error types.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Path is claimed by another host.
    #[error("{path:?} is swapped in on host {hostname:?}")]
    CrossHostConflict { path: String, hostname: String },

    /// Sentinel or backup bookkeeping contradicts requested transition.
    #[error("state conflict for {path:?}: {detail}")]
    StateConflict { path: String, detail: String },

    /// Operation not allowed in current swap state.
    #[error("cannot {operation} {path:?} while {state}")]
    InvalidState {
        path: String,
        operation: &'static str,
        state: SwapState,
    },

    /// Managed path cannot be swapped safely.
    #[error("cannot manage {path:?}: {reason}")]
    UnmanageablePath { path: String, reason: &'static str },

    /// No mirror content to swap in.
    #[error("mirror content for {path:?} not found at {:?}", location.display())]
    MirrorNotFound { path: String, location: PathBuf },

    /// Project and mirror directory overlap.
    #[error(
        "project directory {:?} and mirror directory {:?} overlap",
        project_dir.display(),
        mirror_dir.display()
    )]
    OverlappingTrees {
        project_dir: PathBuf,
        mirror_dir: PathBuf,
    },

    /// Underlying file system operation fails.
    #[error("file system operation failed on {:?}", path.display())]
    Filesystem {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Sentinel lookup pattern is invalid.
    #[error(transparent)]
    Glob(#[from] glob::PatternError),

    /// Managed path listing cannot be loaded.
    #[error(transparent)]
    PathSpec(#[from] PathSpecError),
}

/// Friendly result alias :3
pub type Result<T, E = MirrorError> = std::result::Result<T, E>;
