//! Batch configuration loaded from `.xcanon.json`

use crate::core::error::{CanonError, Result};
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the project root
pub const CONFIG_FILE_NAME: &str = ".xcanon.json";

/// Configuration for the batch pipeline; every key is optional
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Worker threads; 0 uses the available parallelism
    #[serde(default)]
    pub workers: usize,
    /// Files larger than this many bytes are skipped
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Globs selecting source files
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    /// Globs rejecting files or directories
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    /// Non-equivalent comparisons fail the process
    #[serde(default)]
    pub strict: bool,
}

fn default_max_file_size() -> u64 {
    1_048_576 // 1MB
}

fn default_include() -> Vec<String> {
    ["**/*.py", "**/*.rs", "**/*.ir.json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude() -> Vec<String> {
    [".git", "node_modules", "__pycache__", "target", ".venv", "venv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 0,
            max_file_size: default_max_file_size(),
            include: default_include(),
            exclude: default_exclude(),
            strict: false,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| CanonError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; a missing or malformed file is an error
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CanonError::invalid_config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content).map_err(|e| e.with_context(path.display().to_string()))
    }

    /// `.xcanon.json` in `root`, if present
    pub fn discover(root: &Path) -> Option<PathBuf> {
        let candidate = if root.is_dir() {
            root.join(CONFIG_FILE_NAME)
        } else {
            root.parent()?.join(CONFIG_FILE_NAME)
        };
        candidate.is_file().then_some(candidate)
    }

    /// Load the discovered config for `root`, or the defaults
    pub fn load_for(root: &Path) -> Result<Self> {
        match Self::discover(root) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Worker count with `0` resolved to the machine's parallelism
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(CanonError::invalid_config("max_file_size must be positive"));
        }
        for pattern in self.include.iter().chain(&self.exclude) {
            Glob::new(pattern).map_err(|e| {
                CanonError::invalid_config(format!("invalid glob '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }
}
