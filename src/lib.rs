// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Swap project files with mirrored copies.
//!
//! A project lists the paths it wants managed in a markdown document under a
//! `## rplc-config` section. Each listed path has a counterpart in a mirror
//! directory, usually shared between machines. __Swapping in__ moves the
//! mirror copy into the project and keeps the project's own copy as a backup.
//! __Swapping out__ puts everything back.
//!
//! Hosts record that they have a path swapped in through sentinel files in the
//! mirror directory, so a second machine sharing the mirror refuses to swap in
//! something another machine currently holds.
//!
//! # Layout
//!
//! - [`pathspec`]: parse managed path listings.
//! - [`mirror`]: project layout, sentinels, and swap engine.
//! - [`discovery`]: find projects and swap them out in bulk.
//! - [`envrc`]: maintain swap marker in direnv files.
//! - [`config`]: user settings file.

pub mod config;
pub mod discovery;
pub mod environment;
pub mod envrc;
pub mod mirror;
pub mod path;
pub mod pathspec;
