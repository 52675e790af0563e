//! Session preferences.
//!
//! Read once when a session starts, from an optional JSON file followed by
//! `BUGHOUSE_*` environment overrides:
//! 1. `BUGHOUSE_CONFIG` names the file; otherwise `$HOME/.config/bughouse-sync/config.json`
//!    is used when it exists
//! 2. `BUGHOUSE_MULTIPV`, `BUGHOUSE_EVAL_FILE`, `BUGHOUSE_MAX_DEPTH` and
//!    `BUGHOUSE_AUTO_PROMOTE` override single fields; unparsable values are ignored

use std::path::{Path, PathBuf};

use engine::{AnalysisSettings, EngineOptions};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = ".config/bughouse-sync/config.json";

pub const MAX_MULTIPV: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub auto_promote: bool,
    /// Number of principal variations to request, 1..=5.
    pub multipv: u32,
    /// NNUE file; empty disables NNUE.
    pub eval_file: String,
    /// Search depth; 99 means unlimited.
    pub max_depth: u32,
    pub blindfold: bool,
    pub animation: bool,
    pub clock_on: bool,
    pub variant: String,
    pub engine_path: Option<PathBuf>,
    pub engine_hash_mb: Option<u32>,
    /// Variant definition file loaded into the engine after its banner.
    pub variants_ini: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_promote: false,
            multipv: 1,
            eval_file: String::new(),
            max_depth: 18,
            blindfold: false,
            animation: true,
            clock_on: true,
            variant: "bughouse".to_string(),
            engine_path: None,
            engine_hash_mb: None,
            variants_ini: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl SessionConfig {
    /// File (if any) plus process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        Ok(base.with_env_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded session config from {}", path.display());
        Ok(config.normalized())
    }

    /// Apply `BUGHOUSE_*` overrides looked up through `lookup`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(multipv) = lookup("BUGHOUSE_MULTIPV").and_then(|v| v.parse().ok()) {
            self.multipv = multipv;
        }
        if let Some(eval_file) = lookup("BUGHOUSE_EVAL_FILE") {
            self.eval_file = eval_file;
        }
        if let Some(depth) = lookup("BUGHOUSE_MAX_DEPTH").and_then(|v| v.parse().ok()) {
            self.max_depth = depth;
        }
        if let Some(flag) = lookup("BUGHOUSE_AUTO_PROMOTE").and_then(|v| parse_flag(&v)) {
            self.auto_promote = flag;
        }
        self.normalized()
    }

    fn normalized(mut self) -> Self {
        self.multipv = self.multipv.clamp(1, MAX_MULTIPV);
        self
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            variant: self.variant.clone(),
            eval_file: (!self.eval_file.is_empty()).then(|| self.eval_file.clone()),
            multipv: self.multipv,
            max_depth: self.max_depth,
            ..Default::default()
        }
    }

    pub fn engine_options(&self) -> Result<EngineOptions, ConfigError> {
        let variants_ini = match &self.variants_ini {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|source| {
                ConfigError::Io {
                    path: path.clone(),
                    source,
                }
            })?),
            None => None,
        };
        Ok(EngineOptions {
            path: self.engine_path.clone(),
            hash_mb: self.engine_hash_mb,
            variants_ini,
        })
    }
}

/// `BUGHOUSE_CONFIG`, else the per-user config file.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("BUGHOUSE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(DEFAULT_CONFIG_FILE))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
