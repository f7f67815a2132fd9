// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Settings file layout.
//!
//! Optional per-user settings that fill in whatever the command line and
//! environment leave unset. Lives at `$XDG_CONFIG_HOME/rplc/config.toml` by
//! default:
//!
//! ```toml
//! [defaults]
//! mirror_dir = "../mirror_proj"
//! config = "sample.md"
//! manage_env = true
//!
//! [sentinel]
//! duplicate_policy = "lowest-hostname"
//! ```
//!
//! Every field is optional.

use crate::mirror::sentinel::DuplicateSentinelPolicy;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    io,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Default mirror directory, relative to project directory.
pub const DEFAULT_MIRROR_DIR: &str = "../mirror_proj";

/// Default configuration document, relative to project directory.
pub const DEFAULT_CONFIG_FILE: &str = "sample.md";

/// User settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Fallback project options.
    pub defaults: ProjectDefaults,

    /// Sentinel handling.
    pub sentinel: SentinelSettings,
}

impl Settings {
    /// Load settings from file.
    ///
    /// A missing file yields default settings.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file is not valid settings.
    /// - Return [`ConfigError::ShellExpansion`] if a path cannot be expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match read_to_string(path) {
            Ok(data) => {
                debug!("load settings from {:?}", path.display());
                data.parse()
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no settings at {:?}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(ConfigError::Read {
                source: err,
                path: path.to_path_buf(),
            }),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on path fields.
        settings.defaults.mirror_dir = expand(&settings.defaults.mirror_dir)?;
        settings.defaults.config = expand(&settings.defaults.config)?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand(path: &Path) -> Result<PathBuf> {
    let expanded = shellexpand::full(path.to_string_lossy().as_ref())
        .map_err(ConfigError::ShellExpansion)?
        .into_owned();

    Ok(PathBuf::from(expanded))
}

/// Fallback values for project options.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectDefaults {
    /// Mirror directory, relative paths resolve against project directory.
    pub mirror_dir: PathBuf,

    /// Configuration document, relative paths resolve against project directory.
    pub config: PathBuf,

    /// Maintain swap marker in project `.envrc`.
    pub manage_env: bool,
}

impl Default for ProjectDefaults {
    fn default() -> Self {
        Self {
            mirror_dir: PathBuf::from(DEFAULT_MIRROR_DIR),
            config: PathBuf::from(DEFAULT_CONFIG_FILE),
            manage_env: true,
        }
    }
}

/// Sentinel handling settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SentinelSettings {
    /// Tie-break when several hosts claim one path.
    pub duplicate_policy: DuplicateSentinelPolicy,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read settings file.
    #[error("failed to read settings file {:?}", path.display())]
    Read {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
