// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Project discovery and bulk swap out.
//!
//! Projects announce themselves through their direnv file. Any `.envrc` that
//! assigns `RPLC_MIRROR_DIR` marks its directory as an rplc project:
//!
//! ```sh
//! export RPLC_MIRROR_DIR="$HOME/mirrors/my-project"
//! export RPLC_CONFIG=README.md
//! ```
//!
//! `RPLC_CONFIG` is optional and defaults to `sample.md`. Relative values are
//! resolved against the directory holding the `.envrc`.
//!
//! Bulk swap out walks a directory tree for such projects and swaps out every
//! path this host has swapped in, e.g. before leaving a machine for the day.
//! Paths claimed by other hosts are reported but never touched.

use crate::{
    config::DEFAULT_CONFIG_FILE,
    envrc::{self, ENVRC_FILE},
    environment::Environment,
    mirror::{
        sentinel::SentinelStore,
        swap::{SwapEngine, SwapOutcome},
        Project, SwapState,
    },
    pathspec::{load_path_spec, ManagedPath},
};

use ignore::WalkBuilder;
use std::{
    fs::read_to_string,
    path::Path,
};
use tracing::{debug, instrument, warn};

/// Settings extracted from a `.envrc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvrcSettings {
    /// Value of `RPLC_MIRROR_DIR`, expanded.
    pub mirror_dir: String,

    /// Value of `RPLC_CONFIG`, expanded.
    pub config: Option<String>,
}

/// Extract rplc settings from `.envrc` content.
///
/// Returns [`None`] if `RPLC_MIRROR_DIR` is never assigned.
pub fn parse_envrc(content: &str, env: &impl Environment) -> Option<EnvrcSettings> {
    let mut mirror_dir = None;
    let mut config = None;

    for line in content.lines() {
        let line = line.trim();
        let line = line.strip_prefix("export").map_or(line, |rest| {
            if rest.starts_with(char::is_whitespace) {
                rest.trim_start()
            } else {
                line
            }
        });

        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let Some(name) = name.strip_prefix("RPLC_") else {
            continue;
        };

        let value = envrc_value(value);
        if value.is_empty() {
            continue;
        }

        let value = shellexpand::full_with_context_no_errors(
            value,
            || env.home_dir().map(|home| home.to_string_lossy().into_owned()),
            |var| env.var(var),
        )
        .into_owned();

        match name {
            "MIRROR_DIR" => mirror_dir = Some(value),
            "CONFIG" => config = Some(value),
            _ => {}
        }
    }

    mirror_dir.map(|mirror_dir| EnvrcSettings { mirror_dir, config })
}

/// Strip quotes and trailing comment off a shell assignment value.
fn envrc_value(value: &str) -> &str {
    let value = value.trim_start();
    let value = value.trim_start_matches(['"', '\'']);
    let end = value.find(['"', '\'', '#']).unwrap_or(value.len());
    value[..end].trim()
}

/// Find all rplc projects under base directory.
///
/// Projects whose configuration document does not exist are skipped.
/// Results are sorted by project directory. Unreadable parts of the tree are
/// skipped with a warning.
#[instrument(skip(env), level = "debug")]
pub fn discover_projects(base: &Path, env: &impl Environment) -> Vec<Project> {
    if !base.exists() {
        warn!("base directory {:?} does not exist", base.display());
        return Vec::new();
    }

    let mut projects = Vec::new();
    let walker = WalkBuilder::new(base)
        .standard_filters(false)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skip unreadable entry: {err}");
                continue;
            }
        };
        if entry.file_name() != ENVRC_FILE
            || !entry.file_type().is_some_and(|kind| kind.is_file())
        {
            continue;
        }

        debug!("check {:?}", entry.path().display());
        if let Some(project) = project_from_envrc(entry.path(), env) {
            projects.push(project);
        }
    }

    projects.sort_by(|a, b| a.project_dir().cmp(b.project_dir()));
    projects
}

fn project_from_envrc(envrc: &Path, env: &impl Environment) -> Option<Project> {
    let content = match read_to_string(envrc) {
        Ok(content) => content,
        Err(err) => {
            warn!("failed to read {:?}: {err}", envrc.display());
            return None;
        }
    };

    let settings = parse_envrc(&content, env)?;
    let project_dir = envrc.parent()?.to_path_buf();
    let mirror_dir = project_dir.join(&settings.mirror_dir);
    let config_file = project_dir.join(settings.config.as_deref().unwrap_or(DEFAULT_CONFIG_FILE));

    if !config_file.exists() {
        debug!(
            "skip {:?}: config file {:?} not found",
            project_dir.display(),
            config_file.display()
        );
        return None;
    }

    match Project::new(&project_dir, &mirror_dir, &config_file) {
        Ok(project) => Some(project),
        Err(err) => {
            warn!("skip {:?}: {err}", project_dir.display());
            None
        }
    }
}

/// Action taken for one managed path during bulk swap out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkAction {
    /// Path was swapped out.
    SwappedOut,

    /// Path would be swapped out (dry run).
    WouldSwapOut,

    /// Path is swapped in by another host and was left alone.
    LeftElsewhere(String),

    /// Path was not swapped in.
    Untouched,

    /// Swap out failed.
    Failed(String),
}

/// Bulk swap out result of one managed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub path: ManagedPath,
    pub state: SwapState,
    pub action: BulkAction,
}

/// Bulk swap out result of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectReport {
    pub project: Project,
    pub entries: Vec<EntryReport>,

    /// Project could not be processed at all.
    pub error: Option<String>,
}

impl ProjectReport {
    /// Whether any entry failed or the project itself could not be processed.
    pub fn has_failures(&self) -> bool {
        self.error.is_some()
            || self
                .entries
                .iter()
                .any(|entry| matches!(entry.action, BulkAction::Failed(_)))
    }
}

/// Bulk swap out result across projects.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BulkReport {
    pub projects: Vec<ProjectReport>,
}

impl BulkReport {
    /// Whether anything failed.
    pub fn has_failures(&self) -> bool {
        self.projects.iter().any(ProjectReport::has_failures)
    }
}

/// Options for bulk swap out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    /// Only report what would be swapped out.
    pub dry_run: bool,

    /// Clear swap marker in each project's `.envrc` once nothing is left
    /// swapped in.
    pub manage_env: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            manage_env: true,
        }
    }
}

/// Swap out every path of project that this host has swapped in.
///
/// With [`BulkOptions::dry_run`] only reads are performed.
pub fn swap_out_project<E>(
    engine: &SwapEngine<'_, E>,
    project: &Project,
    options: BulkOptions,
) -> ProjectReport
where
    E: Environment,
{
    let mut report = ProjectReport {
        project: project.clone(),
        entries: Vec::new(),
        error: None,
    };

    let paths = match load_path_spec(project.config_file(), engine.store().environment()) {
        Ok(paths) => paths,
        Err(err) => {
            warn!("skip {project}: {err}");
            report.error = Some(err.to_string());
            return report;
        }
    };

    let mut swapped_out = false;
    for path in paths {
        let state = match engine.query_state(project, &path) {
            Ok(state) => state,
            Err(err) => {
                report.entries.push(EntryReport {
                    path,
                    state: SwapState::NotSwapped,
                    action: BulkAction::Failed(err.to_string()),
                });
                continue;
            }
        };

        let action = match &state {
            SwapState::NotSwapped => BulkAction::Untouched,
            SwapState::SwappedElsewhere(host) => {
                warn!("{path} in {project} is swapped in on {host:?}, leaving it alone");
                BulkAction::LeftElsewhere(host.clone())
            }
            SwapState::SwappedHere(_) if options.dry_run => BulkAction::WouldSwapOut,
            SwapState::SwappedHere(_) => match engine.swap_out(project, &path) {
                Ok(SwapOutcome::Swapped) => {
                    swapped_out = true;
                    BulkAction::SwappedOut
                }
                Ok(SwapOutcome::AlreadyInPlace) => BulkAction::Untouched,
                Err(err) => BulkAction::Failed(err.to_string()),
            },
        };

        report.entries.push(EntryReport {
            path,
            state,
            action,
        });
    }

    if swapped_out && options.manage_env {
        let still_swapped = report.entries.iter().any(|entry| {
            matches!(entry.state, SwapState::SwappedHere(_)) && entry.action != BulkAction::SwappedOut
        });
        if let Err(err) = envrc::mark_swapped(project.project_dir(), still_swapped) {
            warn!("failed to update {ENVRC_FILE} of {project}: {err}");
        }
    }

    report
}

/// Discover projects under base directory and swap out this host's paths.
pub fn swap_out_all<E>(base: &Path, engine: &SwapEngine<'_, E>, options: BulkOptions) -> BulkReport
where
    E: Environment,
{
    let projects = discover_projects(base, engine.store().environment())
        .iter()
        .map(|project| swap_out_project(engine, project, options))
        .collect();

    BulkReport { projects }
}
