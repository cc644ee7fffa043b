// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Sanitizer Domain Service
//!
//! Keeps every path the provisioner derives from outside input (owner names,
//! archive entry names, placeholder entries, export paths) inside the
//! directory it is meant to land in.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Traversal checks for derived filesystem paths

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Path sanitization errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathSanitizerError {
    #[error("Path traversal attempt detected: {0}")]
    PathTraversal(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path outside export root: {0}")]
    OutsideBoundary(String),

    #[error("Path too long: {0}")]
    PathTooLong(String),
}

/// Path sanitizer domain service
///
/// # Guarantees
/// - Rejects `..` components and absolute paths where a relative one is expected
/// - Rejects NUL bytes
/// - Drops `.` components
pub struct PathSanitizer {
    /// Maximum allowed path length (default: 4096)
    max_path_len: usize,
}

impl PathSanitizer {
    pub fn new() -> Self {
        Self { max_path_len: 4096 }
    }

    pub fn with_max_length(max_path_len: usize) -> Self {
        Self { max_path_len }
    }

    /// Normalize a path that must stay below some target directory
    ///
    /// Returns the cleaned relative path; an empty path means the target
    /// directory itself (archives commonly contain a `./` entry).
    ///
    /// # Examples
    /// ```
    /// use provisioner_core::domain::path_sanitizer::PathSanitizer;
    /// use std::path::{Path, PathBuf};
    ///
    /// let sanitizer = PathSanitizer::new();
    /// let safe = sanitizer.relative(Path::new("./home/.bashrc")).unwrap();
    /// assert_eq!(safe, PathBuf::from("home/.bashrc"));
    ///
    /// assert!(sanitizer.relative(Path::new("../etc/passwd")).is_err());
    /// assert!(sanitizer.relative(Path::new("/etc/passwd")).is_err());
    /// ```
    pub fn relative(&self, path: &Path) -> Result<PathBuf, PathSanitizerError> {
        let shown = path.to_string_lossy();

        if shown.len() > self.max_path_len {
            return Err(PathSanitizerError::PathTooLong(shown.into_owned()));
        }

        if shown.contains('\0') {
            return Err(PathSanitizerError::InvalidPath(shown.into_owned()));
        }

        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    tracing::warn!(path = %shown, "Path traversal attempt detected: contains '..' component");
                    return Err(PathSanitizerError::PathTraversal(shown.into_owned()));
                }
                Component::RootDir | Component::Prefix(_) => {
                    tracing::warn!(path = %shown, "Absolute path where a relative path is required");
                    return Err(PathSanitizerError::PathTraversal(shown.into_owned()));
                }
            }
        }

        Ok(normalized)
    }

    /// Validate a name that is used as exactly one path component
    pub fn component(&self, name: &str) -> Result<(), PathSanitizerError> {
        if name.is_empty() || name.len() > 255 {
            return Err(PathSanitizerError::InvalidPath(name.to_string()));
        }

        if name == "." || name == ".." || name.contains('/') || name.contains('\0') {
            tracing::warn!(name = %name, "Rejected unsafe path component");
            return Err(PathSanitizerError::PathTraversal(name.to_string()));
        }

        Ok(())
    }

    /// Extract the root-relative part of an absolute export path
    ///
    /// # Arguments
    /// * `absolute_path` - e.g. "/exports/pvs/pv-alice/volume"
    /// * `root` - e.g. "/exports/pvs"
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - e.g. "pv-alice/volume"
    /// * `Err(PathSanitizerError)` - path is not under `root` or contains `..`
    pub fn strip_root(&self, absolute_path: &str, root: &str) -> Result<PathBuf, PathSanitizerError> {
        let abs = PathBuf::from(absolute_path);
        let root = PathBuf::from(root);

        let stripped = abs
            .strip_prefix(&root)
            .map_err(|_| PathSanitizerError::OutsideBoundary(absolute_path.to_string()))?;

        self.relative(stripped)
    }
}

impl Default for PathSanitizer {
    fn default() -> Self {
        Self::new()
    }
}
