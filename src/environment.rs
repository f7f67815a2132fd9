// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Process environment capability.
//!
//! Everything rplc needs to know about the machine it runs on goes through the
//! [`Environment`] trait: the local hostname that gets stamped onto sentinel
//! files, variable lookup for path expansion, and the user's home directory.
//! Passing the capability explicitly keeps hostname comparison and expansion
//! deterministic under test.

use std::{collections::HashMap, path::PathBuf};

/// Source of machine identity and variable lookups.
pub trait Environment {
    /// Short, lowercase hostname of the current machine.
    fn hostname(&self) -> &str;

    /// Look up an environment variable.
    fn var(&self, name: &str) -> Option<String>;

    /// Absolute path to the current user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;
}

/// Environment of the running process.
///
/// Hostname is resolved once at construction.
#[derive(Debug, Clone)]
pub struct SystemEnvironment {
    hostname: String,
}

impl SystemEnvironment {
    /// Resolve hostname of current machine.
    ///
    /// # Errors
    ///
    /// - Return [`EnvironmentError::Hostname`] if the operating system refuses
    ///   to report a hostname.
    /// - Return [`EnvironmentError::EmptyHostname`] if the reported hostname
    ///   is empty.
    pub fn new() -> Result<Self> {
        let raw = hostname::get().map_err(EnvironmentError::Hostname)?;
        let hostname = short_hostname(&raw.to_string_lossy());
        if hostname.is_empty() {
            return Err(EnvironmentError::EmptyHostname);
        }

        Ok(Self { hostname })
    }
}

impl Environment for SystemEnvironment {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }
}

/// Fixed environment with caller supplied values.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FixedEnvironment {
    hostname: String,
    vars: HashMap<String, String>,
    home: Option<PathBuf>,
}

impl FixedEnvironment {
    /// Construct new fixed environment for target host.
    ///
    /// Hostname is normalized the same way [`SystemEnvironment`] normalizes
    /// it.
    pub fn new(hostname: impl AsRef<str>) -> Self {
        Self {
            hostname: short_hostname(hostname.as_ref()),
            ..Default::default()
        }
    }

    /// Define a variable.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Define home directory.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }
}

impl Environment for FixedEnvironment {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home.clone()
    }
}

/// Reduce a hostname to the lowercase label before its first dot.
///
/// Sentinel file names rely on hostnames never containing a dot.
pub fn short_hostname(raw: &str) -> String {
    raw.trim()
        .split('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Environment error types.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    /// Operating system cannot report hostname.
    #[error("failed to determine hostname of current machine")]
    Hostname(#[source] std::io::Error),

    /// Operating system reports an empty hostname.
    #[error("hostname of current machine is empty")]
    EmptyHostname,
}

/// Friendly result alias :3
type Result<T, E = EnvironmentError> = std::result::Result<T, E>;
