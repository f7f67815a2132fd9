// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Swap transitions.
//!
//! Each transition is a short, ordered sequence of moves and copies guarded by
//! a state check up front. Nothing is rolled back when a step fails. Instead
//! every step checks what exists before acting, so running the same command
//! again after fixing the cause (disk full, permissions) converges on the
//! intended end state.
//!
//! # Swap In
//!
//! 1. Move original content to `<path>.rplc.original` (skipped when there is
//!    no original content yet).
//! 2. Copy mirror content into this host's sentinel.
//! 3. Move mirror content to the original location.
//!
//! # Swap Out
//!
//! 1. Move original-location content back into the mirror, keeping any edits.
//! 2. Move `<path>.rplc.original` back to the original location, or make sure
//!    the original location is empty if there was nothing to back up.
//! 3. Remove this host's sentinel.
//!
//! A swap out that died before step 3 leaves mirror content in place and no
//! backup behind. Running it again only removes the sentinel.

use crate::{
    environment::Environment,
    mirror::{sentinel::SentinelStore, transfer, MirrorError, Project, Result, SwapState},
    pathspec::{self, ManagedPath},
};

use std::fs::{read_to_string, write};
use tracing::{debug, info, instrument, warn};

/// Outcome of a swap transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// Transition performed.
    Swapped,

    /// Path was already in requested state, nothing changed.
    AlreadyInPlace,
}

/// Perform swap transitions for managed paths.
#[derive(Debug, Clone)]
pub struct SwapEngine<'env, E>
where
    E: Environment,
{
    store: SentinelStore<'env, E>,
}

impl<'env, E> SwapEngine<'env, E>
where
    E: Environment,
{
    /// Construct new swap engine.
    pub fn new(store: SentinelStore<'env, E>) -> Self {
        Self { store }
    }

    /// Sentinel store used for state checks.
    pub fn store(&self) -> &SentinelStore<'env, E> {
        &self.store
    }

    /// Determine swap state of managed path.
    ///
    /// # Errors
    ///
    /// - Return any error of [`SentinelStore::query_state`].
    pub fn query_state(&self, project: &Project, path: &ManagedPath) -> Result<SwapState> {
        self.store.query_state(project, path)
    }

    /// Replace original content with mirror content.
    ///
    /// Idempotent: a path already swapped in by this host is left alone.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::CrossHostConflict`] if another host has the
    ///   path swapped in.
    /// - Return [`MirrorError::MirrorNotFound`] if there is no mirror content.
    /// - Return [`MirrorError::StateConflict`] if a leftover backup sits next
    ///   to existing original content.
    /// - Return [`MirrorError::UnmanageablePath`] if the path covers the
    ///   project or mirror directory.
    /// - Return [`MirrorError::Filesystem`] if any file operation fails.
    #[instrument(skip(self, project), level = "debug")]
    pub fn swap_in(&self, project: &Project, path: &ManagedPath) -> Result<SwapOutcome> {
        project.check_managed(path)?;
        let original = project.original_location(path);
        let mirror = project.mirror_location(path);
        let backup = project.backup_location(path);

        match self.store.query_state(project, path)? {
            SwapState::SwappedHere(_) => {
                // INVARIANT: Finish a swap-in that died between sentinel
                // creation and the final move.
                if !transfer::exists(&original) && transfer::exists(&mirror) {
                    warn!("resume interrupted swap in of {path}");
                    transfer::move_path(&mirror, &original)?;
                    return Ok(SwapOutcome::Swapped);
                }

                debug!("{path} already swapped in");
                return Ok(SwapOutcome::AlreadyInPlace);
            }
            SwapState::SwappedElsewhere(hostname) => {
                return Err(MirrorError::CrossHostConflict {
                    path: path.to_string(),
                    hostname,
                });
            }
            SwapState::NotSwapped => {}
        }

        if !transfer::exists(&mirror) {
            return Err(MirrorError::MirrorNotFound {
                path: path.to_string(),
                location: mirror,
            });
        }

        if transfer::exists(&original) {
            if transfer::exists(&backup) {
                return Err(MirrorError::StateConflict {
                    path: path.to_string(),
                    detail: format!(
                        "leftover backup {:?} would be overwritten",
                        backup.display()
                    ),
                });
            }

            transfer::move_path(&original, &backup)?;
        } else {
            debug!("{path} has no original content to back up");
        }

        self.store.mark_swapped_in(project, path, &mirror)?;
        transfer::move_path(&mirror, &original)?;
        info!("swapped in {path}");

        Ok(SwapOutcome::Swapped)
    }

    /// Restore original content, harvesting current content into the mirror.
    ///
    /// Idempotent: a path that is not swapped in is left alone.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::CrossHostConflict`] if another host has the
    ///   path swapped in.
    /// - Return [`MirrorError::StateConflict`] if this host's sentinel
    ///   vanishes midway.
    /// - Return [`MirrorError::Filesystem`] if any file operation fails.
    #[instrument(skip(self, project), level = "debug")]
    pub fn swap_out(&self, project: &Project, path: &ManagedPath) -> Result<SwapOutcome> {
        project.check_managed(path)?;
        match self.store.query_state(project, path)? {
            SwapState::NotSwapped => {
                debug!("{path} already swapped out");
                return Ok(SwapOutcome::AlreadyInPlace);
            }
            SwapState::SwappedElsewhere(hostname) => {
                return Err(MirrorError::CrossHostConflict {
                    path: path.to_string(),
                    hostname,
                });
            }
            SwapState::SwappedHere(_) => {}
        }

        let original = project.original_location(path);
        let mirror = project.mirror_location(path);
        let backup = project.backup_location(path);

        // INVARIANT: Mirror content without a backup means a previous swap out
        // already harvested and restored, only the sentinel is left.
        if !transfer::exists(&backup) && transfer::exists(&mirror) {
            warn!("resume interrupted swap out of {path}");
            self.store.clear_swapped(project, path)?;
            return Ok(SwapOutcome::Swapped);
        }

        if transfer::exists(&original) {
            transfer::move_path(&original, &mirror)?;
        }

        if transfer::exists(&backup) {
            transfer::move_path(&backup, &original)?;
        } else {
            debug!("{path} had no original content, leaving original location empty");
            transfer::remove_path(&original)?;
        }

        self.store.clear_swapped(project, path)?;
        info!("swapped out {path}");

        Ok(SwapOutcome::Swapped)
    }

    /// Stop managing a path.
    ///
    /// Removes mirror content, backup, and the path's entry in the project's
    /// configuration document. Original content is left alone.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::InvalidState`] if any host has the path
    ///   swapped in.
    /// - Return [`MirrorError::Filesystem`] if any file operation fails.
    #[instrument(skip(self, project), level = "debug")]
    pub fn delete(&self, project: &Project, path: &ManagedPath) -> Result<()> {
        project.check_managed(path)?;
        let state = self.store.query_state(project, path)?;
        if state.is_swapped_in() {
            return Err(MirrorError::InvalidState {
                path: path.to_string(),
                operation: "delete",
                state,
            });
        }

        transfer::remove_path(project.mirror_location(path))?;
        transfer::remove_path(project.backup_location(path))?;

        let config = project.config_file();
        if transfer::exists(config) {
            let content = read_to_string(config).map_err(|err| MirrorError::Filesystem {
                source: err,
                path: config.to_path_buf(),
            })?;
            let updated = pathspec::remove_entry(&content, path.raw());
            if updated != content {
                write(config, updated).map_err(|err| MirrorError::Filesystem {
                    source: err,
                    path: config.to_path_buf(),
                })?;
            }
        }

        info!("deleted {path} from mirror");
        Ok(())
    }

    /// Populate the mirror with current project content.
    ///
    /// Used to start managing a path whose private content currently lives in
    /// the project: the content moves into the mirror, leaving the original
    /// location empty until the next swap in.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::InvalidState`] if any host has the path
    ///   swapped in.
    /// - Return [`MirrorError::Filesystem`] if the move fails.
    #[instrument(skip(self, project), level = "debug")]
    pub fn seed_mirror(&self, project: &Project, path: &ManagedPath) -> Result<SwapOutcome> {
        project.check_managed(path)?;
        let state = self.store.query_state(project, path)?;
        if state.is_swapped_in() {
            return Err(MirrorError::InvalidState {
                path: path.to_string(),
                operation: "seed mirror of",
                state,
            });
        }

        let original = project.original_location(path);
        let mirror = project.mirror_location(path);
        if transfer::exists(&mirror) || !transfer::exists(&original) {
            debug!("mirror of {path} needs no seeding");
            return Ok(SwapOutcome::AlreadyInPlace);
        }

        transfer::move_path(&original, &mirror)?;
        info!("initialized mirror {:?}", mirror.display());

        Ok(SwapOutcome::Swapped)
    }
}
