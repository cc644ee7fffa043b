// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Seed Archive Extraction Trait
//!
//! A seed archive holds the directory tree every new volume starts with.
//! Only gzip-compressed tar streams are supported.

use crate::domain::identity::UserIdentity;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name suffixes accepted for seed archives
pub const SUPPORTED_SUFFIXES: &[&str] = &[".tar.gz", ".tgz"];

/// Whether `path` names an archive in a supported format
pub fn is_supported_archive(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| SUPPORTED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)))
        .unwrap_or(false)
}

/// Unpacks a seed archive into a volume directory
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `target`
    ///
    /// # Arguments
    /// * `archive` - Path to the compressed archive
    /// * `work_dir` - Directory for the decompressed intermediate file
    /// * `target` - Existing directory to unpack into
    /// * `owner_tag` - Owner name, used to keep intermediate files of
    ///   concurrent extractions apart
    /// * `identity` - Owner applied to every created entry, when known
    ///
    /// A failure may leave `target` partially populated.
    fn extract(
        &self,
        archive: &Path,
        work_dir: &Path,
        target: &Path,
        owner_tag: &str,
        identity: Option<UserIdentity>,
    ) -> Result<(), ExtractionError>;
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported archive format: {path} (only .tar.gz is supported)")]
    UnsupportedFormat { path: PathBuf },

    #[error("Failed to decompress {path}")]
    Decompression {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive entry escapes the target directory: {entry}")]
    UnsafeEntryPath { entry: String },

    #[error("Unsupported archive entry kind '{kind}' for {entry}")]
    UnsupportedEntry { entry: String, kind: String },

    #[error("I/O error while extracting {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractionError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
