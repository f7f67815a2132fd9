// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed path listing.
//!
//! A project declares which of its paths may be swapped with mirror content
//! inside an ordinary Markdown document, usually the project's README or a
//! dedicated notes file. The listing lives under a level-2 `## rplc-config`
//! heading placed somewhere below a level-1 `# Development` heading:
//!
//! ```markdown
//! # Development
//!
//! ## rplc-config
//! main/resources/application.yml
//! scratchdir/
//! $HOME/.config/tool/settings.toml
//! ```
//!
//! Each non-blank line of the section names one path relative to the project
//! directory. A trailing `/` marks a directory. Shell variables (`$NAME`,
//! `${NAME}`) and a leading `~` are expanded. Lines starting with `#` that do
//! not begin a new section are comments, and fenced code blocks are skipped
//! wholesale.

use crate::environment::Environment;

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Component, Path, PathBuf},
};

/// Level-2 heading that opens the managed path section.
pub const SECTION_HEADING: &str = "## rplc-config";

/// A path declared as eligible for swapping.
#[derive(Debug, Clone, Eq)]
pub struct ManagedPath {
    raw: String,
    path: String,
    is_dir: bool,
}

impl ManagedPath {
    /// Construct new managed path from an already expanded path string.
    pub fn new(path: impl Into<String>, is_dir: bool) -> Self {
        let path = path.into();
        Self {
            raw: path.clone(),
            path,
            is_dir,
        }
    }

    /// Expanded path exactly as produced by expansion.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Entry text as written in the configuration document.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether the entry was declared as a directory.
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Expanded path without trailing separators.
    pub fn trimmed(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        if trimmed.is_empty() {
            self.path.as_str()
        } else {
            trimmed
        }
    }

    /// Expanded path as a [`Path`] slice, trailing separators removed.
    pub fn as_path(&self) -> &Path {
        Path::new(self.trimmed())
    }

    /// Whether expansion produced an absolute location.
    pub fn is_absolute(&self) -> bool {
        self.as_path().is_absolute()
    }
}

impl PartialEq for ManagedPath {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.is_dir == other.is_dir
    }
}

impl Display for ManagedPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.path)
    }
}

/// Read and parse managed path listing from configuration file.
///
/// # Errors
///
/// - Return [`PathSpecError::NotFound`] if configuration file does not exist.
/// - Return [`PathSpecError::Read`] if configuration file cannot be read.
/// - Return any error of [`parse_path_spec`].
pub fn load_path_spec(file: impl AsRef<Path>, env: &impl Environment) -> Result<Vec<ManagedPath>> {
    let file = file.as_ref();
    if !file.exists() {
        return Err(PathSpecError::NotFound {
            path: file.to_path_buf(),
        });
    }

    let content = read_to_string(file).map_err(|err| PathSpecError::Read {
        source: err,
        path: file.to_path_buf(),
    })?;

    parse_path_spec(&content, env)
}

/// Parse managed path listing out of configuration document.
///
/// Entries are returned in document order, duplicates included.
///
/// # Errors
///
/// - Return [`PathSpecError::MissingHeading`] if the document lacks either
///   the development heading or the `## rplc-config` heading below it.
/// - Return [`PathSpecError::ParentTraversal`] if an expanded entry contains a
///   `..` component.
pub fn parse_path_spec(text: &str, env: &impl Environment) -> Result<Vec<ManagedPath>> {
    let scan = scan(text);
    if !scan.found_top {
        return Err(PathSpecError::MissingHeading {
            heading: "# Development",
        });
    }

    if !scan.found_section {
        return Err(PathSpecError::MissingHeading {
            heading: SECTION_HEADING,
        });
    }

    scan.entries
        .into_iter()
        .map(|(_, raw)| expand_entry(raw, env))
        .collect()
}

/// Remove every occurrence of an entry from the managed path section.
///
/// Matches on the entry text as written, not its expansion. All other lines
/// are kept untouched.
pub fn remove_entry(text: &str, raw: &str) -> String {
    let doomed = scan(text)
        .entries
        .into_iter()
        .filter(|(_, entry)| *entry == raw)
        .map(|(index, _)| index)
        .collect::<Vec<_>>();

    if doomed.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    for (index, line) in text.split_inclusive('\n').enumerate() {
        if !doomed.contains(&index) {
            out.push_str(line);
        }
    }

    out
}

fn expand_entry(raw: &str, env: &impl Environment) -> Result<ManagedPath> {
    // INVARIANT: Directory-ness comes from the entry as written, never from
    // its expansion.
    let is_dir = raw.ends_with('/');
    let path = shellexpand::full_with_context_no_errors(
        raw,
        || env.home_dir().map(|home| home.to_string_lossy().into_owned()),
        |name| env.var(name),
    )
    .into_owned();

    if Path::new(&path)
        .components()
        .any(|component| component == Component::ParentDir)
    {
        return Err(PathSpecError::ParentTraversal {
            entry: raw.to_string(),
        });
    }

    // INVARIANT: Entry must name something below its base directory, never
    // the base itself.
    if !Path::new(&path)
        .components()
        .any(|component| matches!(component, Component::Normal(_)))
    {
        return Err(PathSpecError::NoTarget {
            entry: raw.to_string(),
        });
    }

    Ok(ManagedPath {
        raw: raw.to_string(),
        path,
        is_dir,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    SeekingTopHeading,
    SeekingSubHeading,
    Collecting,
    Done,
}

#[derive(Debug, Default)]
struct Scan<'text> {
    found_top: bool,
    found_section: bool,
    entries: Vec<(usize, &'text str)>,
}

fn scan(text: &str) -> Scan<'_> {
    let mut result = Scan::default();
    let mut state = ParseState::SeekingTopHeading;
    let mut fence: Option<&str> = None;
    let mut after_blank = true;

    for (index, line) in text.lines().enumerate() {
        let stripped = line.trim();

        // INVARIANT: Nothing inside a fenced code block is interpreted.
        if let Some(token) = fence {
            if stripped.starts_with(token) {
                fence = None;
            }
            after_blank = false;
            continue;
        }

        if let Some(token) = fence_token(stripped) {
            fence = Some(token);
            after_blank = false;
            continue;
        }

        let heading = heading(stripped);
        match state {
            ParseState::SeekingTopHeading => {
                if matches!(heading, Some((1, title)) if is_development(title)) {
                    result.found_top = true;
                    state = ParseState::SeekingSubHeading;
                }
            }
            ParseState::SeekingSubHeading => {
                if stripped == SECTION_HEADING {
                    result.found_section = true;
                    state = ParseState::Collecting;
                } else if let Some((level, title)) = heading {
                    if is_development(title) || (level == 1 && result.found_section) {
                        state = ParseState::Done;
                    }
                }
            }
            ParseState::Collecting => {
                if stripped.is_empty() || stripped == SECTION_HEADING {
                    // Blank, or a repeated section heading.
                } else if let Some((level, title)) = heading {
                    if is_development(title) || (level == 1 && after_blank) {
                        state = ParseState::Done;
                    } else if level > 1 {
                        state = ParseState::SeekingSubHeading;
                    }
                } else if !stripped.starts_with('#') {
                    result.entries.push((index, stripped));
                }
            }
            ParseState::Done => break,
        }

        if state == ParseState::Done {
            break;
        }

        after_blank = stripped.is_empty();
    }

    result
}

fn fence_token(line: &str) -> Option<&'static str> {
    ["```", "~~~"]
        .into_iter()
        .find(|token| line.starts_with(token))
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }

    let rest = &line[level..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let title = rest.trim();
    if title.is_empty() {
        return None;
    }

    Some((level, title))
}

fn is_development(title: &str) -> bool {
    title.starts_with("Development") || title.starts_with("development")
}

/// Managed path listing error types.
#[derive(Debug, thiserror::Error)]
pub enum PathSpecError {
    /// Configuration file does not exist.
    #[error("configuration file {:?} not found", path.display())]
    NotFound { path: PathBuf },

    /// Configuration file cannot be read.
    #[error("failed to read configuration file {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Required heading structure is absent.
    #[error("configuration document lacks a {heading:?} heading")]
    MissingHeading { heading: &'static str },

    /// Entry escapes its base directory.
    #[error("managed path {entry:?} must not contain '..'")]
    ParentTraversal { entry: String },

    /// Entry names a root or the current directory instead of a path below it.
    #[error("managed path {entry:?} does not name a file or directory")]
    NoTarget { entry: String },
}

impl PathSpecError {
    /// Whether the document itself is malformed.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::MissingHeading { .. } | Self::ParentTraversal { .. } | Self::NoTarget { .. }
        )
    }
}

/// Friendly result alias :3
pub type Result<T, E = PathSpecError> = std::result::Result<T, E>;
