// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::ProjectFixture;

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use rplc::{
    discovery::{swap_out_all, BulkAction, BulkOptions},
    environment::FixedEnvironment,
    envrc,
    mirror::{
        sentinel::SentinelStore,
        swap::{SwapEngine, SwapOutcome},
        transfer, MirrorError, SwapState,
    },
    pathspec::{load_path_spec, ManagedPath},
};
use std::fs::{create_dir_all, read_to_string, write};

const CONFIG: &str = indoc! {r#"
    # Project

    Some prose about the project.

    ```md
    # Development
    ## rplc-config
    not/this.txt
    ```

    # Development

    ## rplc-config
    main/resources/application.yml
    # swapped as one unit
    scratchdir/

    # Other
    ignored.txt
"#};

fn app() -> ManagedPath {
    ManagedPath::new("main/resources/application.yml", false)
}

fn scratch() -> ManagedPath {
    ManagedPath::new("scratchdir/", true)
}

fn populate(fixture: &ProjectFixture) -> Result<()> {
    fixture.write_original("main/resources/application.yml", "original")?;
    fixture.write_mirror("main/resources/application.yml", "mirror")?;
    fixture.write_mirror("scratchdir/notes.txt", "scratch")?;
    Ok(())
}

#[test]
fn config_lists_managed_paths() -> Result<()> {
    let fixture = ProjectFixture::new(CONFIG)?;
    let paths = load_path_spec(fixture.project().config_file(), &FixedEnvironment::new("alpha"))?;
    assert_eq!(paths, vec![app(), scratch()]);

    Ok(())
}

#[test]
fn hosts_sharing_mirror_exclude_each_other() -> Result<()> {
    let fixture = ProjectFixture::new(CONFIG)?;
    populate(&fixture)?;
    let project = fixture.project();

    let alpha = FixedEnvironment::new("alpha");
    let beta = FixedEnvironment::new("beta");
    let on_alpha = SwapEngine::new(SentinelStore::new(&alpha));
    let on_beta = SwapEngine::new(SentinelStore::new(&beta));

    for path in [app(), scratch()] {
        assert_eq!(on_alpha.swap_in(project, &path)?, SwapOutcome::Swapped);
    }
    assert_eq!(fixture.read_original("main/resources/application.yml")?, "mirror");
    assert_eq!(fixture.read_original("scratchdir/notes.txt")?, "scratch");

    let before = fixture.snapshot()?;
    for path in [app(), scratch()] {
        assert_eq!(
            on_beta.query_state(project, &path)?,
            SwapState::SwappedElsewhere("alpha".into())
        );
        assert!(matches!(
            on_beta.swap_in(project, &path),
            Err(MirrorError::CrossHostConflict { hostname, .. }) if hostname == "alpha"
        ));
        assert!(matches!(
            on_beta.swap_out(project, &path),
            Err(MirrorError::CrossHostConflict { .. })
        ));
        assert!(matches!(
            on_beta.delete(project, &path),
            Err(MirrorError::InvalidState { .. })
        ));
    }
    assert_eq!(fixture.snapshot()?, before);

    for path in [app(), scratch()] {
        assert_eq!(on_alpha.swap_out(project, &path)?, SwapOutcome::Swapped);
    }
    assert_eq!(fixture.read_original("main/resources/application.yml")?, "original");
    assert!(!transfer::exists(project.original_location(&scratch())));
    assert_eq!(fixture.read_mirror("scratchdir/notes.txt")?, "scratch");

    assert_eq!(on_beta.swap_in(project, &app())?, SwapOutcome::Swapped);
    assert_eq!(
        on_alpha.query_state(project, &app())?,
        SwapState::SwappedElsewhere("beta".into())
    );

    Ok(())
}

#[test]
fn edits_while_swapped_in_land_in_mirror() -> Result<()> {
    let fixture = ProjectFixture::new(CONFIG)?;
    populate(&fixture)?;
    let project = fixture.project();
    let alpha = FixedEnvironment::new("alpha");
    let engine = SwapEngine::new(SentinelStore::new(&alpha));

    engine.swap_in(project, &app())?;
    engine.swap_in(project, &scratch())?;
    fixture.write_original("main/resources/application.yml", "edited")?;
    fixture.write_original("scratchdir/new.txt", "fresh")?;

    engine.swap_out(project, &app())?;
    engine.swap_out(project, &scratch())?;

    assert_eq!(fixture.read_mirror("main/resources/application.yml")?, "edited");
    assert_eq!(fixture.read_mirror("scratchdir/new.txt")?, "fresh");
    assert_eq!(fixture.read_original("main/resources/application.yml")?, "original");
    assert!(!transfer::exists(project.backup_location(&app())));
    assert!(!transfer::exists(project.sentinel_location(&app(), "alpha")));
    assert!(!transfer::exists(project.sentinel_location(&scratch(), "alpha")));

    Ok(())
}

#[test]
fn delete_stops_managing_path() -> Result<()> {
    let fixture = ProjectFixture::new(CONFIG)?;
    populate(&fixture)?;
    let project = fixture.project();
    let alpha = FixedEnvironment::new("alpha");
    let engine = SwapEngine::new(SentinelStore::new(&alpha));

    engine.swap_in(project, &app())?;
    engine.swap_out(project, &app())?;
    engine.delete(project, &app())?;

    assert!(!transfer::exists(project.mirror_location(&app())));
    assert_eq!(fixture.read_original("main/resources/application.yml")?, "original");
    assert_eq!(load_path_spec(project.config_file(), &alpha)?, vec![scratch()]);

    Ok(())
}

#[test]
fn expanded_paths_swap_like_relative_ones() -> Result<()> {
    let fixture = ProjectFixture::new("")?;
    let project = fixture.project();
    let home = fixture.root().join("home");
    let alpha = FixedEnvironment::new("alpha")
        .with_var("PROJ_ROOT", project.project_dir().to_string_lossy())
        .with_home(&home);

    write(
        project.config_file(),
        indoc! {r#"
            # Development
            ## rplc-config
            $PROJ_ROOT/conf/app.toml
            ~/.tool/
        "#},
    )?;
    let paths = load_path_spec(project.config_file(), &alpha)?;
    assert_eq!(paths.len(), 2);
    assert_eq!(
        project.mirror_location(&paths[0]),
        project.mirror_dir().join("conf/app.toml")
    );
    assert!(paths[1].is_dir());
    assert_eq!(project.original_location(&paths[1]), home.join(".tool"));

    fixture.write_mirror("conf/app.toml", "private")?;
    create_dir_all(project.mirror_location(&paths[1]))?;
    write(project.mirror_location(&paths[1]).join("state"), "tool")?;

    let engine = SwapEngine::new(SentinelStore::new(&alpha));
    for path in &paths {
        engine.swap_in(project, path)?;
    }
    assert_eq!(fixture.read_original("conf/app.toml")?, "private");
    assert_eq!(read_to_string(home.join(".tool/state"))?, "tool");

    for path in &paths {
        engine.swap_out(project, path)?;
    }
    assert!(!transfer::exists(project.project_dir().join("conf/app.toml")));
    assert!(!transfer::exists(home.join(".tool")));

    Ok(())
}

#[test]
fn swap_out_all_restores_every_project() -> Result<()> {
    let fixture = ProjectFixture::new(CONFIG)?;
    populate(&fixture)?;
    let other = ProjectFixture::add_project(
        fixture.root(),
        "other",
        indoc! {r#"
            # Development
            ## rplc-config
            local.env
        "#},
    )?;
    write(other.project_dir().join("local.env"), "original")?;
    write(other.mirror_dir().join("local.env"), "mirror")?;

    let alpha = FixedEnvironment::new("alpha");
    let engine = SwapEngine::new(SentinelStore::new(&alpha));
    engine.swap_in(fixture.project(), &app())?;
    engine.swap_in(&other, &ManagedPath::new("local.env", false))?;
    envrc::mark_swapped(fixture.project().project_dir(), true)?;
    envrc::mark_swapped(other.project_dir(), true)?;

    let report = swap_out_all(fixture.root(), &engine, BulkOptions::default());

    assert!(!report.has_failures());
    assert_eq!(report.projects.len(), 2);
    let swapped_out = report
        .projects
        .iter()
        .flat_map(|project| project.entries.iter())
        .filter(|entry| entry.action == BulkAction::SwappedOut)
        .count();
    assert_eq!(swapped_out, 2);

    assert_eq!(fixture.read_original("main/resources/application.yml")?, "original");
    assert_eq!(read_to_string(other.project_dir().join("local.env"))?, "original");
    assert_eq!(
        read_to_string(other.project_dir().join(".envrc"))?,
        "export RPLC_MIRROR_DIR=../other_mirror\n"
    );

    Ok(())
}
