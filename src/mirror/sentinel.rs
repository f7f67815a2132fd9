// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sentinel bookkeeping.
//!
//! A sentinel named `<path>.<hostname>.rplc_active` in the mirror directory
//! means `<hostname>` has swapped in `<path>`. This module is the only place
//! that reads sentinel names or compares them against the local hostname;
//! everything else asks it for a [`SwapState`].
//!
//! At most one sentinel should exist per managed path. Finding several means
//! two hosts raced each other, or someone copied files around by hand. There
//! is no right answer in that case, so the store picks one according to a
//! [`DuplicateSentinelPolicy`] and complains loudly.

use crate::{
    environment::Environment,
    mirror::{transfer, MirrorError, Project, Result, SwapState, SENTINEL_SUFFIX},
    pathspec::ManagedPath,
};

use glob::Pattern;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// How to pick a claim when several hosts have sentinels for one path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateSentinelPolicy {
    /// Pick lexicographically smallest hostname.
    #[default]
    LowestHostname,

    /// Pick the local host if it is among the claimants, otherwise the
    /// lexicographically smallest hostname.
    PreferLocalHost,
}

/// Read and write sentinels for managed paths.
#[derive(Debug, Clone)]
pub struct SentinelStore<'env, E>
where
    E: Environment,
{
    env: &'env E,
    policy: DuplicateSentinelPolicy,
}

impl<'env, E> SentinelStore<'env, E>
where
    E: Environment,
{
    /// Construct new sentinel store.
    pub fn new(env: &'env E) -> Self {
        Self {
            env,
            policy: DuplicateSentinelPolicy::default(),
        }
    }

    /// Use target policy for duplicate sentinels.
    pub fn with_policy(mut self, policy: DuplicateSentinelPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Hostname this store writes sentinels under.
    pub fn hostname(&self) -> &str {
        self.env.hostname()
    }

    /// Environment backing this store.
    pub fn environment(&self) -> &'env E {
        self.env
    }

    /// Determine current swap state of managed path.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Glob`] if sentinel lookup pattern is invalid.
    /// - Return [`MirrorError::Filesystem`] if mirror directory cannot be
    ///   listed.
    pub fn query_state(&self, project: &Project, path: &ManagedPath) -> Result<SwapState> {
        let claims = self.claims(project, path)?;
        let local = self.hostname();

        let hostname = match claims.as_slice() {
            [] => return Ok(SwapState::NotSwapped),
            [only] => only.clone(),
            many => {
                let pick = match self.policy {
                    DuplicateSentinelPolicy::PreferLocalHost
                        if many.iter().any(|host| host == local) =>
                    {
                        local.to_string()
                    }
                    _ => many[0].clone(),
                };
                warn!(
                    "{path} has sentinels from several hosts {many:?}, treating it as claimed by {pick:?}"
                );
                pick
            }
        };

        if hostname == local {
            Ok(SwapState::SwappedHere(hostname))
        } else {
            Ok(SwapState::SwappedElsewhere(hostname))
        }
    }

    /// Record that managed path is swapped in by this host.
    ///
    /// Copies `snapshot` into a sentinel named after the local hostname.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::StateConflict`] if any host already holds a
    ///   sentinel for the path.
    /// - Return [`MirrorError::Filesystem`] if snapshot cannot be copied.
    #[instrument(skip(self, project, snapshot), level = "debug")]
    pub fn mark_swapped_in(
        &self,
        project: &Project,
        path: &ManagedPath,
        snapshot: impl AsRef<std::path::Path>,
    ) -> Result<()> {
        let claims = self.claims(project, path)?;
        if !claims.is_empty() {
            return Err(MirrorError::StateConflict {
                path: path.to_string(),
                detail: format!("sentinel already held by {claims:?}"),
            });
        }

        let sentinel = project.sentinel_location(path, self.hostname());
        debug!("create sentinel {:?}", sentinel.display());
        transfer::copy_path(snapshot, &sentinel)
    }

    /// Remove this host's sentinel for managed path.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::StateConflict`] if this host holds no sentinel
    ///   for the path.
    /// - Return [`MirrorError::Filesystem`] if sentinel cannot be removed.
    #[instrument(skip(self, project), level = "debug")]
    pub fn clear_swapped(&self, project: &Project, path: &ManagedPath) -> Result<()> {
        let sentinel = project.sentinel_location(path, self.hostname());
        if !transfer::exists(&sentinel) {
            return Err(MirrorError::StateConflict {
                path: path.to_string(),
                detail: format!("no sentinel held by {:?}", self.hostname()),
            });
        }

        debug!("remove sentinel {:?}", sentinel.display());
        transfer::remove_path(&sentinel)
    }

    /// List hostnames holding a sentinel for managed path, sorted.
    fn claims(&self, project: &Project, path: &ManagedPath) -> Result<Vec<String>> {
        let mirror = project.mirror_location(path);
        let (Some(parent), Some(name)) = (mirror.parent(), mirror.file_name()) else {
            return Ok(Vec::new());
        };

        if !parent.is_dir() {
            return Ok(Vec::new());
        }

        let name = name.to_string_lossy();
        let pattern = format!(
            "{}/{}.*{SENTINEL_SUFFIX}",
            Pattern::escape(&parent.to_string_lossy()),
            Pattern::escape(&name),
        );

        let mut hosts = Vec::new();
        for entry in glob::glob(&pattern)? {
            let entry = entry.map_err(|err| {
                let path = err.path().to_path_buf();
                MirrorError::Filesystem {
                    source: err.into(),
                    path,
                }
            })?;

            let Some(file_name) = entry.file_name() else {
                continue;
            };

            if let Some(host) = sentinel_host(&file_name.to_string_lossy(), &name) {
                hosts.push(host.to_string());
            }
        }

        hosts.sort();
        hosts.dedup();
        Ok(hosts)
    }
}

/// Extract hostname out of sentinel file name for target base name.
///
/// Hostnames never contain dots, so `a.b.host.rplc_active` belongs to `a.b`,
/// not `a`.
fn sentinel_host<'a>(file_name: &'a str, base: &str) -> Option<&'a str> {
    let host = file_name
        .strip_prefix(base)?
        .strip_prefix('.')?
        .strip_suffix(SENTINEL_SUFFIX)?;

    if host.is_empty() || host.contains('.') {
        return None;
    }

    Some(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::FixedEnvironment;
    use simple_test_case::test_case;
    use std::fs::{create_dir_all, read_to_string, write};
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _root: TempDir,
        project: Project,
    }

    impl Fixture {
        fn new() -> anyhow::Result<Self> {
            let root = tempdir()?;
            let project = Project::new(
                root.path().join("proj"),
                root.path().join("mirror"),
                root.path().join("proj/sample.md"),
            )?;
            create_dir_all(project.project_dir())?;
            create_dir_all(project.mirror_dir().join("conf"))?;
            write(project.mirror_dir().join("conf/app.yml"), "mirror: true")?;

            Ok(Self {
                _root: root,
                project,
            })
        }

        fn claim(&self, path: &ManagedPath, host: &str) -> anyhow::Result<()> {
            write(self.project.sentinel_location(path, host), "snapshot")?;
            Ok(())
        }
    }

    fn app() -> ManagedPath {
        ManagedPath::new("conf/app.yml", false)
    }

    #[test_case("app.yml.alpha.rplc_active", "app.yml", Some("alpha"); "plain")]
    #[test_case("app.yml.rplc_active", "app.yml", None; "missing hostname")]
    #[test_case("app.yml.x.alpha.rplc_active", "app.yml", None; "longer base")]
    #[test_case("app.yml.alpha.rplc.original", "app.yml", None; "backup")]
    #[test]
    fn sentinel_host_extraction(file_name: &str, base: &str, expect: Option<&str>) {
        pretty_assertions::assert_eq!(sentinel_host(file_name, base), expect);
    }

    #[test]
    fn query_state_without_sentinel() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let env = FixedEnvironment::new("alpha");
        let store = SentinelStore::new(&env);

        pretty_assertions::assert_eq!(store.query_state(&fixture.project, &app())?, SwapState::NotSwapped);
        pretty_assertions::assert_eq!(
            store.query_state(&fixture.project, &ManagedPath::new("missing/dir/", true))?,
            SwapState::NotSwapped
        );

        Ok(())
    }

    #[test]
    fn query_state_compares_hostnames() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.claim(&app(), "alpha")?;

        let alpha = FixedEnvironment::new("alpha");
        let beta = FixedEnvironment::new("beta");
        pretty_assertions::assert_eq!(
            SentinelStore::new(&alpha).query_state(&fixture.project, &app())?,
            SwapState::SwappedHere("alpha".into())
        );
        pretty_assertions::assert_eq!(
            SentinelStore::new(&beta).query_state(&fixture.project, &app())?,
            SwapState::SwappedElsewhere("alpha".into())
        );

        Ok(())
    }

    #[test]
    fn query_state_ignores_sentinels_of_longer_names() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.claim(&ManagedPath::new("conf/app.yml.bak", false), "alpha")?;

        let env = FixedEnvironment::new("alpha");
        let store = SentinelStore::new(&env);
        pretty_assertions::assert_eq!(store.query_state(&fixture.project, &app())?, SwapState::NotSwapped);

        Ok(())
    }

    #[test]
    fn query_state_with_duplicate_sentinels() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.claim(&app(), "gamma")?;
        fixture.claim(&app(), "beta")?;

        let env = FixedEnvironment::new("gamma");
        let lowest = SentinelStore::new(&env);
        pretty_assertions::assert_eq!(
            lowest.query_state(&fixture.project, &app())?,
            SwapState::SwappedElsewhere("beta".into())
        );

        let local = SentinelStore::new(&env).with_policy(DuplicateSentinelPolicy::PreferLocalHost);
        pretty_assertions::assert_eq!(
            local.query_state(&fixture.project, &app())?,
            SwapState::SwappedHere("gamma".into())
        );

        Ok(())
    }

    #[test]
    fn mark_swapped_in_snapshots_content() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let env = FixedEnvironment::new("alpha");
        let store = SentinelStore::new(&env);
        let snapshot = fixture.project.mirror_location(&app());

        store.mark_swapped_in(&fixture.project, &app(), &snapshot)?;

        let sentinel = fixture.project.sentinel_location(&app(), "alpha");
        pretty_assertions::assert_eq!(read_to_string(sentinel)?, "mirror: true");
        pretty_assertions::assert_eq!(
            store.query_state(&fixture.project, &app())?,
            SwapState::SwappedHere("alpha".into())
        );

        Ok(())
    }

    #[test]
    fn mark_swapped_in_refuses_existing_claim() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.claim(&app(), "beta")?;
        let env = FixedEnvironment::new("alpha");
        let store = SentinelStore::new(&env);
        let snapshot = fixture.project.mirror_location(&app());

        let result = store.mark_swapped_in(&fixture.project, &app(), &snapshot);

        assert!(matches!(result, Err(MirrorError::StateConflict { .. })));
        assert!(!transfer::exists(fixture.project.sentinel_location(&app(), "alpha")));

        Ok(())
    }

    #[test]
    fn clear_swapped_only_touches_local_claim() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.claim(&app(), "beta")?;
        let env = FixedEnvironment::new("alpha");
        let store = SentinelStore::new(&env);

        let result = store.clear_swapped(&fixture.project, &app());
        assert!(matches!(result, Err(MirrorError::StateConflict { .. })));
        assert!(transfer::exists(fixture.project.sentinel_location(&app(), "beta")));

        fixture.claim(&app(), "alpha")?;
        store.clear_swapped(&fixture.project, &app())?;
        assert!(!transfer::exists(fixture.project.sentinel_location(&app(), "alpha")));
        assert!(transfer::exists(fixture.project.sentinel_location(&app(), "beta")));

        Ok(())
    }
}
