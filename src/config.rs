//! Subversion runtime configuration (`~/.subversion/config`, `servers`).
//!
//! The files use Subversion's INI dialect: `[section]` headers,
//! `name = value` or `name: value` options, `#`/`;` comments, indented
//! continuation lines and `%(name)s` expansion from the same section or
//! `[DEFAULT]`. Section and option names are case-insensitive.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::{Error, SvnError, codes};

/// Category holding `~/.subversion/config`.
pub const CATEGORY_CONFIG: &str = "config";
/// Category holding `~/.subversion/servers`.
pub const CATEGORY_SERVERS: &str = "servers";

const DEFAULT_SECTION: &str = "default";
const MAX_EXPANSION_DEPTH: usize = 16;

type Section = BTreeMap<String, String>;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// A set of configuration categories (`apr_hash_t` of `svn_config_t`).
pub struct Config {
    categories: BTreeMap<String, BTreeMap<String, Section>>,
}

impl Config {
    /// An empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `config` and `servers` from `dir`. Missing files are empty.
    pub fn load_dir(dir: &Path) -> Result<Self, SvnError> {
        let mut config = Self::new();
        for category in [CATEGORY_CONFIG, CATEGORY_SERVERS] {
            let path = dir.join(category);
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    debug!(path = %path.display(), "loading subversion config");
                    config.merge_text(category, &text);
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(SvnError::from(err).wrap(
                        codes::MALFORMED_FILE,
                        format!("Can't read configuration file '{}'", path.display()),
                    ));
                }
            }
        }
        Ok(config)
    }

    /// Parses INI text into `category`, overriding options already present.
    pub fn merge_text(&mut self, category: &str, text: &str) {
        let sections = self.categories.entry(category.to_string()).or_default();
        let mut current: Option<String> = None;
        let mut last_option: Option<String> = None;
        for raw in text.lines() {
            let line = raw.trim_end();
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }
            if line.starts_with([' ', '\t']) {
                if let (Some(section), Some(option)) = (&current, &last_option)
                    && let Some(value) = sections
                        .get_mut(section)
                        .and_then(|options| options.get_mut(option))
                {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(trimmed);
                }
                continue;
            }
            if let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                let name = name.trim().to_ascii_lowercase();
                sections.entry(name.clone()).or_default();
                current = Some(name);
                last_option = None;
                continue;
            }
            let Some(section) = &current else {
                continue;
            };
            let Some(split) = trimmed.find(['=', ':']) else {
                continue;
            };
            let name = trimmed[..split].trim().to_ascii_lowercase();
            let value = trimmed[split + 1..].trim().to_string();
            sections
                .entry(section.clone())
                .or_default()
                .insert(name.clone(), value);
            last_option = Some(name);
        }
    }

    /// Looks up an option, expanding `%(name)s` references.
    pub fn get(&self, category: &str, section: &str, option: &str) -> Option<String> {
        let sections = self.categories.get(category)?;
        let section = section.to_ascii_lowercase();
        let raw = lookup(sections, &section, &option.to_ascii_lowercase())?;
        Some(expand(sections, &section, raw, 0))
    }

    /// Looks up a boolean option (`yes`/`true`/`on`/`1` and their negations).
    pub fn get_bool(
        &self,
        category: &str,
        section: &str,
        option: &str,
        default: bool,
    ) -> Result<bool, Error> {
        let Some(value) = self.get(category, section, option) else {
            return Ok(default);
        };
        match value.to_ascii_lowercase().as_str() {
            "yes" | "true" | "on" | "1" => Ok(true),
            "no" | "false" | "off" | "0" => Ok(false),
            other => Err(Error::Value(format!(
                "Config error: invalid value '{other}' for option '{option}'"
            ))),
        }
    }

    pub fn set(&mut self, category: &str, section: &str, option: &str, value: impl Into<String>) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .entry(section.to_ascii_lowercase())
            .or_default()
            .insert(option.to_ascii_lowercase(), value.into());
    }

    /// Section names present in `category`, lowercased.
    pub fn sections(&self, category: &str) -> Vec<&str> {
        self.categories
            .get(category)
            .map(|sections| sections.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn categories(&self) -> Vec<&str> {
        self.categories.keys().map(String::as_str).collect()
    }
}

fn lookup<'a>(sections: &'a BTreeMap<String, Section>, section: &str, option: &str) -> Option<&'a str> {
    sections
        .get(section)
        .and_then(|options| options.get(option))
        .or_else(|| sections.get(DEFAULT_SECTION).and_then(|d| d.get(option)))
        .map(String::as_str)
}

fn expand(sections: &BTreeMap<String, Section>, section: &str, raw: &str, depth: usize) -> String {
    if depth >= MAX_EXPANSION_DEPTH || !raw.contains("%(") {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("%(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find(")s") {
            Some(end) => {
                let name = after[..end].to_ascii_lowercase();
                match lookup(sections, section, &name) {
                    Some(value) => out.push_str(&expand(sections, section, value, depth + 1)),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Default configuration directory: `$SUBVERT_CONFIG_DIR`, else
/// `~/.subversion` (`%APPDATA%\Subversion` on Windows).
pub fn default_config_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("SUBVERT_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    if cfg!(windows) {
        return std::env::var_os("APPDATA").map(|dir| PathBuf::from(dir).join("Subversion"));
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".subversion"))
}

/// Loads the configuration in `dir`, or in [`default_config_dir`] (`get_config`).
pub fn get_config(dir: Option<&Path>) -> Result<Config, Error> {
    match dir.map(Path::to_path_buf).or_else(default_config_dir) {
        Some(dir) => Ok(Config::load_dir(&dir)?),
        None => Ok(Config::new()),
    }
}

static DEFAULT_CONFIG: OnceLock<Config> = OnceLock::new();

/// Resolves the configuration to hand to native calls
/// (`config_hash_from_object`).
///
/// `None` selects the process-wide default configuration, loaded once on
/// first use. A default configuration that fails to load is empty.
pub fn config_hash_from_object(config: Option<&Config>) -> &Config {
    match config {
        Some(config) => config,
        None => DEFAULT_CONFIG.get_or_init(|| match get_config(None) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "failed to load default subversion config");
                Config::new()
            }
        }),
    }
}
