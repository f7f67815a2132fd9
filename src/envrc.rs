// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Swap marker inside a project's `.envrc`.
//!
//! Projects that use direnv get `export RPLC_SWAPPED=1` appended to their
//! `.envrc` while anything is swapped in, so shells and prompts can tell. The
//! file is only edited when it already exists.

use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Name of direnv file at top-level of project.
pub const ENVRC_FILE: &str = ".envrc";

/// Line marking that the project has swapped in content.
pub const SWAPPED_MARKER: &str = "export RPLC_SWAPPED=1";

/// Add or remove swap marker in project's `.envrc`.
///
/// Returns whether the file changed. Missing `.envrc` files are left missing.
///
/// # Errors
///
/// - Return [`EnvrcError::Read`] if `.envrc` cannot be read.
/// - Return [`EnvrcError::Write`] if `.envrc` cannot be written.
pub fn mark_swapped(project_dir: impl AsRef<Path>, swapped: bool) -> Result<bool> {
    let path = project_dir.as_ref().join(ENVRC_FILE);
    if !path.is_file() {
        debug!("no {ENVRC_FILE} in {:?}", project_dir.as_ref().display());
        return Ok(false);
    }

    let content = read_to_string(&path).map_err(|err| EnvrcError::Read {
        source: err,
        path: path.clone(),
    })?;

    let updated = apply_marker(&content, swapped);
    if updated == content {
        return Ok(false);
    }

    write(&path, updated).map_err(|err| EnvrcError::Write {
        source: err,
        path: path.clone(),
    })?;
    debug!("set {SWAPPED_MARKER:?} to {swapped} in {:?}", path.display());

    Ok(true)
}

/// Apply swap marker to `.envrc` content.
pub fn apply_marker(content: &str, swapped: bool) -> String {
    let mut lines = content
        .lines()
        .filter(|line| !line.starts_with(SWAPPED_MARKER))
        .collect::<Vec<_>>();

    if swapped {
        lines.push(SWAPPED_MARKER);
    }

    if lines.is_empty() {
        return String::new();
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Error types for `.envrc` editing.
#[derive(Debug, thiserror::Error)]
pub enum EnvrcError {
    /// File cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = EnvrcError> = std::result::Result<T, E>;
