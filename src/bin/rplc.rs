// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use rplc::{
    config::Settings,
    discovery::{swap_out_all, BulkAction, BulkOptions, BulkReport},
    environment::{Environment, SystemEnvironment},
    envrc,
    mirror::{
        sentinel::SentinelStore,
        swap::{SwapEngine, SwapOutcome},
        MirrorError, Project, SwapState,
    },
    path::default_settings_path,
    pathspec::{load_path_spec, ManagedPath},
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use std::{
    env::current_dir,
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "rplc [options] <rplc-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(flatten)]
    pub project: ProjectOptions,

    /// Path to settings file.
    #[arg(long, global = true, env = "RPLC_SETTINGS", value_name = "path")]
    pub settings: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let Cli {
            project,
            settings,
            command,
            ..
        } = self;

        let settings = load_settings(settings)?;
        let env = SystemEnvironment::new()?;
        let store = SentinelStore::new(&env).with_policy(settings.sentinel.duplicate_policy);
        let engine = SwapEngine::new(store);

        match command {
            Command::SwapIn(opts) => run_swap_in(&engine, &project.resolve(&settings)?, opts),
            Command::SwapOut(opts) => run_swap_out(&engine, &project.resolve(&settings)?, opts),
            Command::Status => run_status(&engine, &project.resolve(&settings)?),
            Command::Delete(opts) => run_delete(&engine, &project.resolve(&settings)?, opts),
            Command::InitMirror(opts) => run_init_mirror(&engine, &project.resolve(&settings)?, opts),
            Command::SwapOutAll(opts) => {
                let manage_env = settings.defaults.manage_env && !project.no_env;
                run_swap_out_all(&engine, manage_env, opts)
            }
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Swap mirror content into project.
    #[command(override_usage = "rplc swap-in [options] [<path>]")]
    SwapIn(PathOptions),

    /// Swap original content back into project.
    #[command(override_usage = "rplc swap-out [options] [<path>]")]
    SwapOut(PathOptions),

    /// Show swap state of managed paths.
    #[command(override_usage = "rplc status [options]")]
    Status,

    /// Stop managing a path, removing its mirror content.
    #[command(override_usage = "rplc delete [options] <path>")]
    Delete(DeleteOptions),

    /// Move current project content into an empty mirror.
    #[command(override_usage = "rplc init-mirror [options] [<path>]")]
    InitMirror(PathOptions),

    /// Swap out everything this host has swapped in under a directory tree.
    #[command(override_usage = "rplc swap-out-all [options]")]
    SwapOutAll(SwapOutAllOptions),
}

#[derive(Args, Clone, Debug)]
struct ProjectOptions {
    /// Project directory containing original files.
    #[arg(short, long = "proj-dir", global = true, env = "RPLC_PROJ_DIR", value_name = "path")]
    pub proj_dir: Option<PathBuf>,

    /// Directory containing mirrored files.
    #[arg(short, long, global = true, env = "RPLC_MIRROR_DIR", value_name = "path")]
    pub mirror_dir: Option<PathBuf>,

    /// Document listing managed paths.
    #[arg(short, long, global = true, env = "RPLC_CONFIG", value_name = "path")]
    pub config: Option<PathBuf>,

    /// Leave project's .envrc alone.
    #[arg(long, global = true)]
    pub no_env: bool,
}

impl ProjectOptions {
    fn resolve(&self, settings: &Settings) -> Result<Target> {
        let proj_dir = match &self.proj_dir {
            Some(path) => path.clone(),
            None => current_dir().context("cannot determine current directory")?,
        };
        let mirror_dir = self
            .mirror_dir
            .as_ref()
            .unwrap_or(&settings.defaults.mirror_dir);
        let config = self.config.as_ref().unwrap_or(&settings.defaults.config);

        // INVARIANT: Relative mirror and config paths resolve against project.
        let project = Project::new(&proj_dir, proj_dir.join(mirror_dir), proj_dir.join(config))?;
        if !project.config_file().exists() {
            bail!("config file {:?} not found", project.config_file().display());
        }

        Ok(Target {
            project,
            manage_env: settings.defaults.manage_env && !self.no_env,
        })
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PathOptions {
    /// Managed path to act on, all managed paths if omitted.
    #[arg(value_name = "path")]
    pub path: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeleteOptions {
    /// Managed path to stop managing.
    #[arg(required = true, value_name = "path")]
    pub path: String,

    /// Skip confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SwapOutAllOptions {
    /// Directory tree to search for projects, current directory if omitted.
    #[arg(short, long, value_name = "path")]
    pub base: Option<PathBuf>,

    /// Report what would be swapped out without touching anything.
    #[arg(short, long)]
    pub dry_run: bool,
}

/// Project resolved from command line, environment, and settings.
struct Target {
    project: Project,
    manage_env: bool,
}

fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    let path = match path {
        Some(path) => path,
        None => match default_settings_path() {
            Ok(path) => path,
            Err(err) => {
                warn!("{err}, using default settings");
                return Ok(Settings::default());
            }
        },
    };

    Ok(Settings::load(path)?)
}

fn run_swap_in<E: Environment>(
    engine: &SwapEngine<'_, E>,
    target: &Target,
    opts: PathOptions,
) -> Result<()> {
    let project = &target.project;
    let result = select_paths(engine, project, opts.path.as_deref())?
        .into_iter()
        .try_for_each(|path| match engine.swap_in(project, &path) {
            Ok(_) => Ok(()),
            Err(err @ MirrorError::MirrorNotFound { .. }) => {
                warn!("skip {path}: {err}");
                Ok(())
            }
            Err(err) => Err(err),
        });

    finish_swaps(engine, target, result)
}

fn run_swap_out<E: Environment>(
    engine: &SwapEngine<'_, E>,
    target: &Target,
    opts: PathOptions,
) -> Result<()> {
    let project = &target.project;
    let result = select_paths(engine, project, opts.path.as_deref())?
        .into_iter()
        .try_for_each(|path| engine.swap_out(project, &path).map(|_| ()));

    finish_swaps(engine, target, result)
}

fn run_status<E: Environment>(engine: &SwapEngine<'_, E>, target: &Target) -> Result<()> {
    let project = &target.project;
    let paths = select_paths(engine, project, None)?;

    println!("project: {}", project.project_dir().display());
    println!("mirror:  {}", project.mirror_dir().display());
    println!("host:    {}", engine.store().hostname());
    println!();

    let width = paths
        .iter()
        .map(|path| path.to_string().len())
        .max()
        .unwrap_or_default();
    for path in &paths {
        let state = engine.query_state(project, path)?;
        println!("{:<width$}  {state}", path.to_string());
    }

    Ok(())
}

fn run_delete<E: Environment>(
    engine: &SwapEngine<'_, E>,
    target: &Target,
    opts: DeleteOptions,
) -> Result<()> {
    let project = &target.project;
    for path in select_paths(engine, project, Some(&opts.path))? {
        if !opts.yes {
            let confirmed = Confirm::new(&format!("Delete mirror content of {path}?"))
                .with_default(false)
                .with_help_message("mirror content and backup are removed for good")
                .prompt()?;
            if !confirmed {
                info!("leave {path} alone");
                continue;
            }
        }

        engine.delete(project, &path)?;
    }

    Ok(())
}

fn run_init_mirror<E: Environment>(
    engine: &SwapEngine<'_, E>,
    target: &Target,
    opts: PathOptions,
) -> Result<()> {
    let project = &target.project;
    for path in select_paths(engine, project, opts.path.as_deref())? {
        if engine.seed_mirror(project, &path)? == SwapOutcome::AlreadyInPlace {
            info!("{path} needs no seeding");
        }
    }

    Ok(())
}

fn run_swap_out_all<E: Environment>(
    engine: &SwapEngine<'_, E>,
    manage_env: bool,
    opts: SwapOutAllOptions,
) -> Result<()> {
    let base = match opts.base {
        Some(base) => base,
        None => current_dir().context("cannot determine current directory")?,
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(format!("searching {}", base.display()));
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    let options = BulkOptions {
        dry_run: opts.dry_run,
        manage_env,
    };
    let report = swap_out_all(&base, engine, options);
    spinner.finish_and_clear();

    print_bulk_report(&report);
    if report.has_failures() {
        return Err(anyhow!("some paths could not be swapped out"));
    }

    Ok(())
}

fn print_bulk_report(report: &BulkReport) {
    if report.projects.is_empty() {
        info!("no rplc projects found");
        return;
    }

    for project in &report.projects {
        println!("{}", project.project.project_dir().display());
        if let Some(err) = &project.error {
            println!("  error: {err}");
            continue;
        }

        for entry in &project.entries {
            let action = match &entry.action {
                BulkAction::SwappedOut => "swapped out".to_string(),
                BulkAction::WouldSwapOut => "would swap out".to_string(),
                BulkAction::LeftElsewhere(host) => format!("left alone, swapped in on {host}"),
                BulkAction::Untouched => entry.state.to_string(),
                BulkAction::Failed(err) => format!("failed: {err}"),
            };
            println!("  {}: {action}", entry.path);
        }
    }
}

/// Load managed paths, narrowed down to one if requested.
fn select_paths<E: Environment>(
    engine: &SwapEngine<'_, E>,
    project: &Project,
    wanted: Option<&str>,
) -> Result<Vec<ManagedPath>> {
    let paths = load_path_spec(project.config_file(), engine.store().environment())?;
    let Some(wanted) = wanted else {
        return Ok(paths);
    };

    let trimmed = wanted.trim_end_matches('/');
    let from_cwd = std::path::absolute(Path::new(trimmed)).ok();
    let from_project = project.project_dir().join(trimmed);
    let selected = paths
        .into_iter()
        .filter(|path| {
            let location = project.original_location(path);
            path.raw().trim_end_matches('/') == trimmed
                || path.trimmed() == trimmed
                || location == from_project
                || from_cwd.as_ref() == Some(&location)
        })
        .collect::<Vec<_>>();

    if selected.is_empty() {
        bail!(
            "{wanted:?} is not a managed path in {:?}",
            project.config_file().display()
        );
    }

    Ok(selected)
}

/// Update swap marker after a run of swaps, whether or not all of them went
/// through.
///
/// The first swap error wins over a marker error.
fn finish_swaps<E: Environment>(
    engine: &SwapEngine<'_, E>,
    target: &Target,
    result: std::result::Result<(), MirrorError>,
) -> Result<()> {
    let marker = update_marker(engine, target);
    match (result, marker) {
        (Ok(()), marker) => marker,
        (Err(err), Ok(())) => Err(err.into()),
        (Err(err), Err(marker_err)) => {
            warn!("failed to update swap marker: {marker_err:?}");
            Err(err.into())
        }
    }
}

/// Set `.envrc` swap marker from current state of all managed paths.
fn update_marker<E: Environment>(engine: &SwapEngine<'_, E>, target: &Target) -> Result<()> {
    if !target.manage_env {
        return Ok(());
    }

    let project = &target.project;
    let mut swapped = false;
    for path in load_path_spec(project.config_file(), engine.store().environment())? {
        if matches!(engine.query_state(project, &path)?, SwapState::SwappedHere(_)) {
            swapped = true;
            break;
        }
    }

    envrc::mark_swapped(project.project_dir(), swapped)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use rplc::{envrc::SWAPPED_MARKER, environment::FixedEnvironment};
    use std::fs::{create_dir_all, read_to_string, write};
    use tempfile::{tempdir, TempDir};

    const CONFIG: &str = indoc! {r#"
        # Development
        ## rplc-config
        first.txt
        second.txt
    "#};

    fn setup(envrc: &str) -> anyhow::Result<(TempDir, Target)> {
        let root = tempdir()?;
        let proj = root.path().join("proj");
        let mirror = root.path().join("mirror");
        create_dir_all(&proj)?;
        create_dir_all(&mirror)?;
        write(proj.join("sample.md"), CONFIG)?;
        write(proj.join(".envrc"), envrc)?;
        for name in ["first.txt", "second.txt"] {
            write(proj.join(name), "original")?;
            write(mirror.join(name), "mirror")?;
        }

        let project = Project::new(&proj, &mirror, proj.join("sample.md"))?;
        let target = Target {
            project,
            manage_env: true,
        };
        Ok((root, target))
    }

    fn all_paths() -> PathOptions {
        PathOptions { path: None }
    }

    #[test]
    fn swap_in_marks_envrc_when_later_path_fails() -> anyhow::Result<()> {
        let (_root, target) = setup("export RPLC_MIRROR_DIR=../mirror\n")?;
        let alpha = FixedEnvironment::new("alpha");
        let beta = FixedEnvironment::new("beta");
        SwapEngine::new(SentinelStore::new(&beta))
            .swap_in(&target.project, &ManagedPath::new("second.txt", false))?;

        let engine = SwapEngine::new(SentinelStore::new(&alpha));
        assert!(run_swap_in(&engine, &target, all_paths()).is_err());

        let first = ManagedPath::new("first.txt", false);
        assert!(matches!(
            engine.query_state(&target.project, &first)?,
            SwapState::SwappedHere(_)
        ));
        let envrc = read_to_string(target.project.project_dir().join(".envrc"))?;
        assert!(envrc.lines().any(|line| line == SWAPPED_MARKER));

        Ok(())
    }

    #[test]
    fn swap_out_clears_envrc_when_later_path_fails() -> anyhow::Result<()> {
        let (_root, target) = setup("export RPLC_MIRROR_DIR=../mirror\nexport RPLC_SWAPPED=1\n")?;
        let alpha = FixedEnvironment::new("alpha");
        let beta = FixedEnvironment::new("beta");
        let engine = SwapEngine::new(SentinelStore::new(&alpha));
        engine.swap_in(&target.project, &ManagedPath::new("first.txt", false))?;
        SwapEngine::new(SentinelStore::new(&beta))
            .swap_in(&target.project, &ManagedPath::new("second.txt", false))?;

        assert!(run_swap_out(&engine, &target, all_paths()).is_err());

        let envrc = read_to_string(target.project.project_dir().join(".envrc"))?;
        pretty_assertions::assert_eq!(envrc, "export RPLC_MIRROR_DIR=../mirror\n");
        pretty_assertions::assert_eq!(
            read_to_string(target.project.project_dir().join("first.txt"))?,
            "original"
        );

        Ok(())
    }
}
