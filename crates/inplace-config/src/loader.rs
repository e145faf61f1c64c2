//! Alias store: short names expanding to full filter command templates.
//!
//! # Design
//! - The first existing file among the XDG location and `~/.inplace` is read;
//!   later candidates are ignored.
//! - Lines look like `name = template`; comments start with `#` and lines
//!   that do not parse are skipped.
//! - Expansion is purely textual and applies only to an exact name match.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::defaults::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, LEGACY_FILE_NAME, XDG_FALLBACK_DIR};
use crate::error::{ConfigError, ConfigResult};

/// Mapping from alias name to the command template it stands for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasStore {
    aliases: BTreeMap<String, String>,
    source: Option<PathBuf>,
}

impl AliasStore {
    /// Load aliases from the first configuration file found in the default
    /// locations. Returns an empty store when none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing configuration file cannot be read.
    pub fn discover() -> ConfigResult<Self> {
        let candidates = default_locations(env::var_os("XDG_CONFIG_HOME"), home_dir());
        Self::load_first(&candidates)
    }

    /// Load aliases from the first path in `candidates` that exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen file cannot be read.
    pub fn load_first(candidates: &[PathBuf]) -> ConfigResult<Self> {
        match candidates.iter().find(|path| path.is_file()) {
            Some(path) => Self::load(path),
            None => {
                debug!("no alias configuration found");
                Ok(Self::default())
            }
        }
    }

    /// Load aliases from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let contents =
            fs::read_to_string(path).map_err(|source| ConfigError::io("alias.read", path, source))?;
        let mut store = Self::parse(&contents);
        store.source = Some(path.to_path_buf());
        debug!(
            path = %path.display(),
            aliases = store.len(),
            "loaded alias configuration"
        );
        Ok(store)
    }

    /// Parse alias definitions from configuration text.
    #[must_use]
    pub fn parse(contents: &str) -> Self {
        let aliases = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(parse_line)
            .map(|(name, template)| (name.to_string(), template.to_string()))
            .collect();
        Self {
            aliases,
            source: None,
        }
    }

    /// Replace `command` with its alias template when it names an alias.
    #[must_use]
    pub fn expand<'a>(&'a self, command: &'a str) -> &'a str {
        match self.get(command) {
            Some(template) => {
                info!(alias = command, template, "expanding alias");
                template
            }
            None => command,
        }
    }

    /// Look up a single alias.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// File the aliases were read from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Number of aliases defined.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Whether no aliases are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

fn parse_line(line: &str) -> Option<(&str, &str)> {
    let (name, template) = line.split_once('=')?;
    let name = name.trim_end();
    let template = template.trim();
    if name.is_empty() || name.contains(char::is_whitespace) || template.is_empty() {
        return None;
    }
    Some((name, template))
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

/// Candidate alias files in lookup order.
#[must_use]
pub fn default_locations(xdg_config_home: Option<OsString>, home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);
    let config_home = xdg_config_home
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.as_ref().map(|home| home.join(XDG_FALLBACK_DIR)));
    if let Some(config_home) = config_home {
        candidates.push(config_home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    if let Some(home) = home {
        candidates.push(home.join(LEGACY_FILE_NAME));
    }
    candidates
}
