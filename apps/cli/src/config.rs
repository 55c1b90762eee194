//! CLI configuration: JSON file, then environment overrides.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use wds_deploy::history::DEFAULT_HISTORY_CAP;
use wds_deploy::{DeploymentOptions, PipelineConfig};

/// Persistent configuration for the `wds` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding build artifacts, keyed by relative path.
    pub source_dir: PathBuf,
    /// Directory served as the web UI bucket.
    pub target_dir: PathBuf,
    /// JSON file receiving deployment history.
    pub history_file: PathBuf,
    /// Number of runs kept in the history file.
    pub history_cap: usize,
    /// Options applied when the command line does not override them.
    pub defaults: DeploymentOptions,
    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("artifacts"),
            target_dir: PathBuf::from("deploy"),
            history_file: PathBuf::from("version.json"),
            history_cap: DEFAULT_HISTORY_CAP,
            defaults: DeploymentOptions::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads the config file, then applies environment overrides.
    ///
    /// Without `explicit`, a missing default file yields defaults. A file
    /// that fails to parse is logged and ignored.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match explicit {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                Self::parse(path, &content)
            }
            None => match default_config_path() {
                Some(path) if path.exists() => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read config {}", path.display()))?;
                    Self::parse(&path, &content)
                }
                _ => Self::default(),
            },
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn parse(path: &Path, content: &str) -> Self {
        match serde_json::from_str::<Self>(content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Applies overrides from environment variables read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(n) = parse_env(&lookup, "UPLOAD_CONCURRENCY", |v| v.parse::<usize>().ok()) {
            self.pipeline.upload_concurrency = n;
        }
        if let Some(n) = parse_env(&lookup, "MAX_PARALLEL_ARTIFACTS", |v| v.parse::<usize>().ok()) {
            self.pipeline.max_parallel_artifacts = n;
        }
        if let Some(b) = parse_env(&lookup, "DEFAULT_CLEAR_BEFORE_DEPLOY", parse_bool) {
            self.defaults.clear_before_deploy = b;
        }
        if let Some(b) = parse_env(&lookup, "DEFAULT_EXTRACT_ZIP", parse_bool) {
            self.defaults.extract_archives = b;
        }
        if let Some(prefix) = lookup("DEFAULT_TARGET_PREFIX") {
            self.defaults.custom_prefix = prefix;
        }
        if let Some(dir) = lookup("WDS_SOURCE_DIR").filter(|v| !v.is_empty()) {
            self.source_dir = dir.into();
        }
        if let Some(dir) = lookup("WDS_TARGET_DIR").filter(|v| !v.is_empty()) {
            self.target_dir = dir.into();
        }
        if let Some(file) = lookup("WDS_HISTORY_FILE").filter(|v| !v.is_empty()) {
            self.history_file = file.into();
        }
        if let Some(n) = parse_env(&lookup, "WDS_HISTORY_CAP", |v| v.parse::<usize>().ok()) {
            self.history_cap = n;
        }
        self.pipeline = std::mem::take(&mut self.pipeline).normalized();
    }
}

fn parse_env<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(name)?;
    let value = parse(raw.trim());
    if value.is_none() {
        tracing::warn!(var = name, value = %raw, "ignoring invalid environment value");
    }
    value
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `$XDG_CONFIG_HOME/wds/config.json`, falling back to `~/.config`.
pub fn default_config_path() -> Option<PathBuf> {
    config_base_dir().map(|dir| dir.join("wds").join("config.json"))
}

fn config_base_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir));
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
    }
}
