//! Harness settings
//!
//! `harness.conf` is a flat `key = value` file shared with the shell loop
//! that drives cycles. It is parsed into a [`SettingsMap`] first, then layered
//! with environment overrides and converted into typed [`HarnessSettings`].

use crate::harness::error::{HarnessError, HarnessResult};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default settings file name under the project root
pub const SETTINGS_FILE: &str = "harness.conf";

/// Directories never descended into when walking the project
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".venv",
    "__pycache__",
    "node_modules",
    "dist",
    "build",
    "logs",
    ".pytest_cache",
    "venv",
    "env",
];

/// Environment variables that override settings file keys
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("HARNESS_MAX_FILES", "max_files"),
    ("HARNESS_MAX_FILE_BYTES", "max_file_bytes"),
    ("HARNESS_MAX_GIT_LOG_LINES", "max_git_log_lines"),
    ("HARNESS_TEST_CASE_LIMIT", "test_case_limit"),
    ("HARNESS_CODEX_MODEL", "codex_model"),
    ("HARNESS_LOG_LEVEL", "log_level"),
    ("CYCLE_PROMPT_FILE", "cycle_prompt_file"),
];

/// A scalar value from the settings file
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SettingValue {
    /// Parse a raw value: quotes stripped, then bool, integer, float, text.
    pub fn parse(raw: &str) -> Self {
        let value = raw.trim().trim_matches('"').trim_matches('\'');
        match value.to_lowercase().as_str() {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(n) = value.parse::<i64>() {
            return Self::Int(n);
        }
        if let Ok(f) = value.parse::<f64>() {
            return Self::Float(f);
        }
        Self::Text(value.to_string())
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Flat key -> value mapping, as read from `harness.conf`
pub type SettingsMap = BTreeMap<String, SettingValue>;

/// Parse settings file text.
///
/// Blank lines, `#` comments, lines without `=`, and keys with an empty value
/// are skipped.
pub fn parse_settings(text: &str) -> SettingsMap {
    let mut map = SettingsMap::new();
    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        let Some((key, raw_value)) = stripped.split_once('=') else {
            continue;
        };
        if raw_value.trim().is_empty() {
            continue;
        }
        map.insert(key.trim().to_string(), SettingValue::parse(raw_value));
    }
    map
}

/// Read a settings file; a missing file is an empty map.
pub fn load_settings_map(path: impl AsRef<Path>) -> HarnessResult<SettingsMap> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(parse_settings(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No settings file, using defaults");
            Ok(SettingsMap::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Layer environment overrides onto `map`, reading variables through `lookup`.
///
/// Empty variables are ignored.
pub fn apply_env_overrides(map: &mut SettingsMap, lookup: impl Fn(&str) -> Option<String>) {
    for (var, key) in ENV_OVERRIDES {
        if let Some(raw) = lookup(var) {
            if !raw.trim().is_empty() {
                map.insert((*key).to_string(), SettingValue::parse(&raw));
            }
        }
    }
}

/// Typed harness settings
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessSettings {
    /// Cap on the number of files in a context bundle
    pub max_files: usize,
    /// Per-file truncation threshold in bytes
    pub max_file_bytes: usize,
    /// Number of `git log --oneline` lines in the bundle
    pub max_git_log_lines: usize,
    /// Default test cap, and the ceiling of the adaptive limit
    pub test_case_limit: usize,
    /// Size the test list from the pass/fail mix instead of `test_case_limit`
    pub use_smart_test_limit: bool,
    /// Log registry validation issues before assembling context
    pub validate_feature_list: bool,
    /// Apply `.gitignore` rules on top of `ignore_dirs`
    pub respect_gitignore: bool,
    /// Directory names never descended into
    pub ignore_dirs: Vec<String>,
    /// Default tracing level when `RUST_LOG` is unset
    pub log_level: String,
    /// Prompt template for a coding cycle
    pub cycle_prompt_file: PathBuf,
    /// Agent executable
    pub agent_command: String,
    /// Model passed to the agent (empty = agent default)
    pub codex_model: String,
    /// Agent timeout per cycle in seconds (0 = none)
    pub cycle_timeout_secs: u64,
    pub feature_list_path: PathBuf,
    pub app_spec_path: PathBuf,
    pub progress_path: PathBuf,
    pub metrics_path: PathBuf,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            max_files: 200,
            max_file_bytes: 200_000,
            max_git_log_lines: 50,
            test_case_limit: 200,
            use_smart_test_limit: true,
            validate_feature_list: true,
            respect_gitignore: false,
            ignore_dirs: DEFAULT_IGNORE_DIRS.iter().map(|d| d.to_string()).collect(),
            log_level: "INFO".to_string(),
            cycle_prompt_file: PathBuf::from("coding_prompt.md"),
            agent_command: "codex".to_string(),
            codex_model: String::new(),
            cycle_timeout_secs: 0,
            feature_list_path: PathBuf::from("feature_list.json"),
            app_spec_path: PathBuf::from("app_spec.txt"),
            progress_path: PathBuf::from("codex-progress.txt"),
            metrics_path: PathBuf::from("harness_metrics.jsonl"),
        }
    }
}

impl HarnessSettings {
    /// Load settings for `root`: defaults, then `config_path` (or
    /// `<root>/harness.conf`), then environment, with paths resolved
    /// against `root`.
    pub fn load(root: impl AsRef<Path>, config_path: Option<&Path>) -> HarnessResult<Self> {
        let root = root.as_ref();
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.join(SETTINGS_FILE));

        let mut map = load_settings_map(&path)?;
        apply_env_overrides(&mut map, |var| std::env::var(var).ok());

        let mut settings = Self::from_map(&map)?;
        settings.resolve_paths(root);
        Ok(settings)
    }

    /// Build settings from a flat map; unknown keys are ignored.
    pub fn from_map(map: &SettingsMap) -> HarnessResult<Self> {
        let mut s = Self::default();

        set_usize(map, "max_files", &mut s.max_files)?;
        set_usize(map, "max_file_bytes", &mut s.max_file_bytes)?;
        set_usize(map, "max_git_log_lines", &mut s.max_git_log_lines)?;
        set_usize(map, "test_case_limit", &mut s.test_case_limit)?;
        set_bool(map, "use_smart_test_limit", &mut s.use_smart_test_limit)?;
        set_bool(map, "validate_feature_list", &mut s.validate_feature_list)?;
        set_bool(map, "respect_gitignore", &mut s.respect_gitignore)?;
        set_text(map, "log_level", &mut s.log_level);
        set_text(map, "agent_command", &mut s.agent_command);
        set_text(map, "codex_model", &mut s.codex_model);
        set_path(map, "cycle_prompt_file", &mut s.cycle_prompt_file);
        set_path(map, "feature_list_path", &mut s.feature_list_path);
        set_path(map, "app_spec_path", &mut s.app_spec_path);
        set_path(map, "progress_path", &mut s.progress_path);
        set_path(map, "metrics_path", &mut s.metrics_path);

        let mut timeout = s.cycle_timeout_secs as usize;
        set_usize(map, "cycle_timeout_secs", &mut timeout)?;
        s.cycle_timeout_secs = timeout as u64;

        if let Some(value) = map.get("ignore_dirs") {
            s.ignore_dirs = value
                .to_string()
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(s)
    }

    /// Resolve relative artifact paths against the project root
    pub fn resolve_paths(&mut self, root: &Path) {
        for path in [
            &mut self.cycle_prompt_file,
            &mut self.feature_list_path,
            &mut self.app_spec_path,
            &mut self.progress_path,
            &mut self.metrics_path,
        ] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
    }
}

fn set_usize(map: &SettingsMap, key: &str, target: &mut usize) -> HarnessResult<()> {
    match map.get(key) {
        None => Ok(()),
        Some(SettingValue::Int(n)) if *n >= 0 => {
            *target = *n as usize;
            Ok(())
        }
        Some(other) => Err(HarnessError::config(format!(
            "{} must be a non-negative integer, got '{}'",
            key, other
        ))),
    }
}

fn set_bool(map: &SettingsMap, key: &str, target: &mut bool) -> HarnessResult<()> {
    match map.get(key) {
        None => Ok(()),
        Some(SettingValue::Bool(b)) => {
            *target = *b;
            Ok(())
        }
        Some(SettingValue::Int(n)) => {
            *target = *n != 0;
            Ok(())
        }
        Some(other) => Err(HarnessError::config(format!(
            "{} must be true/false or 1/0, got '{}'",
            key, other
        ))),
    }
}

fn set_text(map: &SettingsMap, key: &str, target: &mut String) {
    if let Some(value) = map.get(key) {
        *target = value.to_string();
    }
}

fn set_path(map: &SettingsMap, key: &str, target: &mut PathBuf) {
    if let Some(value) = map.get(key) {
        *target = PathBuf::from(value.to_string());
    }
}
