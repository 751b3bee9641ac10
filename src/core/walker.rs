//! Source discovery for the batch pipeline
//!
//! This module provides the SourceWalker trait and the default
//! implementation that walks files and directories for parseable sources.

use crate::core::config::Config;
use crate::core::error::{CanonError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

#[cfg(test)]
use mockall::automock;

/// Normalize path separators for cross-platform compatibility.
/// - Converts Windows backslashes to forward slashes
/// - Strips Windows UNC prefix `\\?\` if present
pub fn normalize_path_separators(path: &str) -> String {
    let path = path
        .strip_prefix(r"\\?\")
        .or_else(|| path.strip_prefix(r"\\.\"))
        .unwrap_or(path);
    path.replace('\\', "/")
}

/// One source file read into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path as given or discovered, with `/` separators
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// An entry under a root that could not be walked or read
#[derive(Debug)]
pub struct WalkFailure {
    pub path: String,
    pub error: CanonError,
}

/// Sources found under one root, plus the entries that failed
#[derive(Debug, Default)]
pub struct SourceWalk {
    pub sources: Vec<SourceFile>,
    pub failures: Vec<WalkFailure>,
}

impl SourceWalk {
    pub fn from_sources(sources: Vec<SourceFile>) -> Self {
        Self {
            sources,
            failures: Vec::new(),
        }
    }
}

/// Trait for source discovery
///
/// This trait allows for mocking in tests and alternative implementations
/// (e.g., in-memory fixtures).
#[cfg_attr(test, automock)]
pub trait SourceWalker: Send + Sync {
    /// Collect the sources under `root` (a directory or a single file)
    ///
    /// Fails only when `root` itself cannot be walked. Entries below it that
    /// cannot be read are reported in [`SourceWalk::failures`].
    fn walk(&self, root: &Path, config: &Config) -> Result<SourceWalk>;

    /// Check if a relative path matches an exclude pattern
    fn is_excluded(&self, path: &str, patterns: &[String]) -> bool;

    /// Check if a file is too large
    fn is_too_large(&self, size: u64, limit: u64) -> bool {
        size > limit
    }
}

/// Default walker over the local file system
#[derive(Debug, Default)]
pub struct DefaultWalker;

impl DefaultWalker {
    pub fn new() -> Self {
        Self
    }

    fn build_globset(patterns: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| CanonError::invalid_config(format!("invalid glob '{}': {}", pattern, e)))?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| CanonError::invalid_config(e.to_string()))
    }

    /// Read a file unless it is too large or binary
    fn read_source(&self, path: &Path, config: &Config) -> Result<Option<SourceFile>> {
        let size = std::fs::metadata(path)?.len();
        if self.is_too_large(size, config.max_file_size) {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        if is_binary(&bytes) {
            return Ok(None);
        }
        Ok(read_file_content(&bytes).map(|content| {
            SourceFile::new(normalize_path_separators(&path.to_string_lossy()), content)
        }))
    }
}

impl SourceWalker for DefaultWalker {
    fn walk(&self, root: &Path, config: &Config) -> Result<SourceWalk> {
        if !root.exists() {
            return Err(CanonError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("'{}' does not exist", root.display()),
            )));
        }

        // an explicitly named file is taken regardless of include globs
        if root.is_file() {
            return Ok(SourceWalk::from_sources(
                self.read_source(root, config)?.into_iter().collect(),
            ));
        }

        let include = Self::build_globset(&config.include)?;
        let mut walk = SourceWalk::default();

        let entries = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                let relative = normalize_path_separators(&relative.to_string_lossy());
                relative.is_empty() || !self.is_excluded(&relative, &config.exclude)
            });

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(root).to_string_lossy().to_string();
                    walk.failures.push(WalkFailure {
                        path: normalize_path_separators(&path),
                        error: CanonError::Io(err.into()),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let relative = normalize_path_separators(&relative.to_string_lossy());
            if !include.is_match(&relative) {
                continue;
            }
            match self.read_source(entry.path(), config) {
                Ok(Some(source)) => walk.sources.push(source),
                Ok(None) => {}
                Err(error) => walk.failures.push(WalkFailure {
                    path: normalize_path_separators(&entry.path().to_string_lossy()),
                    error,
                }),
            }
        }

        Ok(walk)
    }

    fn is_excluded(&self, path: &str, patterns: &[String]) -> bool {
        patterns.iter().any(|pattern| {
            path == pattern
                || path.split('/').any(|component| component == pattern)
                || path.starts_with(&format!("{}/", pattern))
                || Glob::new(pattern).is_ok_and(|glob| glob.compile_matcher().is_match(path))
        })
    }
}

/// Check if content appears to be binary
pub fn is_binary(content: &[u8]) -> bool {
    // Check first 8KB for null bytes
    let check_len = content.len().min(8192);
    content[..check_len].contains(&0)
}

/// Decode file content, normalizing line endings
pub fn read_file_content(bytes: &[u8]) -> Option<String> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Some(s.replace("\r\n", "\n"));
    }

    let s = String::from_utf8_lossy(bytes);
    if s.chars().filter(|c| *c == '\u{FFFD}').count() < s.len() / 10 {
        Some(s.replace("\r\n", "\n"))
    } else {
        None // Too many replacement characters, likely binary
    }
}
