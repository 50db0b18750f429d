//! User configuration at `<config dir>/neoterm/config.toml`.
//!
//! A missing file means defaults. `get`/`set` address values with dotted
//! keys (`terminal.cols`) and validate every change by deserializing the
//! edited document again.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::blocks::SessionLimits;
use crate::process::{DriverKind, ShellSpec, TermSize};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("unknown config key '{0}'")]
    UnknownKey(String),
    #[error("no configuration directory available on this platform")]
    NoConfigDir,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub shell: ShellConfig,
    pub terminal: TerminalConfig,
    pub session: SessionConfig,
    pub vault: VaultConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    /// Interpreter for commands (default: `$SHELL`, then `/bin/sh`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Arguments placed before the command (default: `-c`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Extra environment for every command.
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TerminalConfig {
    pub cols: u16,
    pub rows: u16,
    pub driver: DriverKind,
    /// How long to wait for trailing output after a process exits.
    pub drain_timeout_ms: u64,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            driver: DriverKind::Pty,
            drain_timeout_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub max_blocks: usize,
    pub max_total_lines: usize,
    /// Entries kept by the input history navigator.
    pub history_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let limits = SessionLimits::default();
        Self {
            max_blocks: limits.max_blocks,
            max_total_lines: limits.max_total_lines,
            history_size: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    pub enabled: bool,
    /// Database file (default: `<data dir>/history.db`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UiConfig {
    pub prompt: String,
    pub show_duration: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            prompt: "❯ ".to_string(),
            show_duration: true,
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "neoterm")
}

/// Where logs and the vault live by default.
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.data_dir().to_path_buf())
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// An explicit path wins; otherwise the platform default.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(p) => Ok(p.to_path_buf()),
            None => Self::default_path(),
        }
    }

    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;

        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, content).map_err(write_err)?;
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────
    // Derived settings
    // ────────────────────────────────────────────────────────────────

    pub fn shell_spec(&self) -> ShellSpec {
        let mut spec = ShellSpec::default();
        if let Some(program) = &self.shell.program {
            spec.program = program.clone();
        }
        if let Some(args) = &self.shell.args {
            spec.args = args.clone();
        }
        spec
    }

    pub fn term_size(&self) -> TermSize {
        TermSize {
            cols: self.terminal.cols,
            rows: self.terminal.rows,
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.terminal.drain_timeout_ms)
    }

    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_blocks: self.session.max_blocks.max(1),
            max_total_lines: self.session.max_total_lines,
        }
    }

    /// `None` when the vault is disabled or no data dir exists.
    pub fn vault_path(&self) -> Option<PathBuf> {
        if !self.vault.enabled {
            return None;
        }
        self.vault
            .path
            .clone()
            .or_else(|| data_dir().map(|d| d.join("history.db")))
    }

    // ────────────────────────────────────────────────────────────────
    // Dotted-key access
    // ────────────────────────────────────────────────────────────────

    fn to_table(&self) -> Result<toml::Table> {
        match toml::Value::try_from(self)? {
            toml::Value::Table(t) => Ok(t),
            _ => Ok(toml::Table::new()),
        }
    }

    /// Value at a dotted key, rendered as it would be typed on `set`.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let table = self.to_table()?;
        let mut parts = key.split('.');
        let first = parts.next().unwrap_or_default();
        let mut current = match table.get(first) {
            Some(v) => v,
            None => return Err(ConfigError::UnknownKey(key.to_string())),
        };
        for part in parts {
            match current.get(part) {
                Some(v) => current = v,
                None => return self.check_key(key).map(|_| None),
            }
        }
        Ok(Some(render_value(current)))
    }

    /// Unset optional keys exist but have no value.
    fn check_key(&self, key: &str) -> Result<()> {
        const OPTIONAL: &[&str] = &["shell.program", "shell.args", "vault.path"];
        if OPTIONAL.contains(&key) || key.starts_with("shell.env.") {
            Ok(())
        } else {
            Err(ConfigError::UnknownKey(key.to_string()))
        }
    }

    /// Set a dotted key from user text. Integers, booleans and arrays are
    /// parsed as TOML; anything else is taken as a string.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<()> {
        let mut table = self.to_table()?;
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let value = parse_value(raw);
        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        let mut current = &mut table;
        for part in parents {
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            current = match entry {
                toml::Value::Table(t) => t,
                _ => return Err(ConfigError::UnknownKey(key.to_string())),
            };
        }
        current.insert(last.to_string(), value);

        // deny_unknown_fields rejects misspelled keys here
        let updated: Config = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| {
                if e.message().contains("unknown field") {
                    ConfigError::UnknownKey(key.to_string())
                } else {
                    ConfigError::Parse(e)
                }
            })?;
        *self = updated;
        Ok(())
    }

    /// Every set key as `(dotted key, value)`, sorted.
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let mut out = Vec::new();
        flatten("", &toml::Value::Table(self.to_table()?), &mut out);
        out.sort();
        Ok(out)
    }
}

fn parse_value(raw: &str) -> toml::Value {
    let doc = format!("v = {}", raw.trim());
    toml::from_str::<toml::Table>(&doc)
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

fn render_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn flatten(prefix: &str, value: &toml::Value, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(t) => {
            for (k, v) in t {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten(&key, v, out);
            }
        }
        other => out.push((prefix.to_string(), render_value(other))),
    }
}
