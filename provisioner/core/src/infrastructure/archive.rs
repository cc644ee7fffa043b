// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tar.gz Seed Archive Extractor
//!
//! Two passes: the gzip stream is first inflated to `tmp-<owner>.tar` in the
//! work directory, then the tar is unpacked entry by entry in stream order.
//! Every created directory and file is chowned to the volume owner right
//! after it is written.
//!
//! Only directories and regular files are honoured. Links, devices and fifos
//! abort the extraction with `UnsupportedEntry`; entry names that would land
//! outside the target abort with `UnsafeEntryPath`.

use crate::domain::archive::{is_supported_archive, ArchiveExtractor, ExtractionError};
use crate::domain::identity::{OwnershipApplier, UserIdentity};
use crate::domain::path_sanitizer::PathSanitizer;
use crate::infrastructure::ownership::UnixOwnership;
use flate2::read::MultiGzDecoder;
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tar::EntryType;
use tracing::{debug, info, warn};

/// Mode for parent directories the archive does not list explicitly
const IMPLICIT_DIR_MODE: u32 = 0o755;

pub struct TarGzExtractor {
    sanitizer: PathSanitizer,
    ownership: Arc<dyn OwnershipApplier>,
}

impl Default for TarGzExtractor {
    fn default() -> Self {
        Self {
            sanitizer: PathSanitizer::new(),
            ownership: Arc::new(UnixOwnership),
        }
    }
}

impl TarGzExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ownership(mut self, ownership: Arc<dyn OwnershipApplier>) -> Self {
        self.ownership = ownership;
        self
    }

    /// Path of the decompressed intermediate file for `owner_tag`
    pub fn intermediate_path(work_dir: &Path, owner_tag: &str) -> PathBuf {
        work_dir.join(format!("tmp-{}.tar", owner_tag))
    }

    /// Chown `path` to `identity`, if one is given
    fn apply_owner(&self, path: &Path, identity: Option<UserIdentity>) -> Result<(), ExtractionError> {
        if let Some(identity) = identity {
            self.ownership
                .apply(path, identity)
                .map_err(|e| ExtractionError::io(path, e))?;
        }
        Ok(())
    }

    fn decompress(&self, archive: &Path, destination: &Path) -> Result<(), ExtractionError> {
        let source = File::open(archive).map_err(|e| ExtractionError::Decompression {
            path: archive.to_path_buf(),
            source: e,
        })?;
        // Concatenated members (pigz, cat a.gz b.gz) form one stream
        let mut decoder = MultiGzDecoder::new(source);

        let mut output =
            File::create(destination).map_err(|e| ExtractionError::io(destination, e))?;

        io::copy(&mut decoder, &mut output).map_err(|e| ExtractionError::Decompression {
            path: archive.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    fn unpack(
        &self,
        tar_path: &Path,
        target: &Path,
        identity: Option<UserIdentity>,
    ) -> Result<usize, ExtractionError> {
        let file = File::open(tar_path).map_err(|e| ExtractionError::io(tar_path, e))?;
        let mut archive = tar::Archive::new(file);
        let mut count = 0usize;

        let entries = archive
            .entries()
            .map_err(|e| ExtractionError::io(tar_path, e))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| ExtractionError::io(tar_path, e))?;

            let entry_path = entry
                .path()
                .map_err(|e| ExtractionError::io(tar_path, e))?
                .into_owned();
            let entry_name = entry_path.display().to_string();

            let relative = self
                .sanitizer
                .relative(&entry_path)
                .map_err(|_| ExtractionError::UnsafeEntryPath {
                    entry: entry_name.clone(),
                })?;
            let destination = target.join(&relative);

            let mode = entry
                .header()
                .mode()
                .map_err(|e| ExtractionError::io(tar_path, e))?
                & 0o7777;

            match entry.header().entry_type() {
                EntryType::Directory => {
                    self.ensure_parents(target, &relative, identity)?;
                    DirBuilder::new()
                        .recursive(true)
                        .mode(mode)
                        .create(&destination)
                        .map_err(|e| ExtractionError::io(&destination, e))?;
                    self.apply_owner(&destination, identity)?;
                    debug!(entry = %entry_name, mode = %format!("{:o}", mode), "Created directory");
                }
                EntryType::Regular | EntryType::Continuous => {
                    self.ensure_parents(target, &relative, identity)?;
                    let mut output = OpenOptions::new()
                        .create(true)
                        .truncate(true)
                        .write(true)
                        .mode(mode)
                        .open(&destination)
                        .map_err(|e| ExtractionError::io(&destination, e))?;
                    io::copy(&mut entry, &mut output)
                        .map_err(|e| ExtractionError::io(&destination, e))?;
                    drop(output);
                    self.apply_owner(&destination, identity)?;
                    // Existing files keep their old mode through open(2), and chown may clear setuid
                    apply_mode(&destination, mode).map_err(|e| ExtractionError::io(&destination, e))?;
                    debug!(entry = %entry_name, mode = %format!("{:o}", mode), "Extracted file");
                }
                EntryType::XGlobalHeader | EntryType::XHeader => {
                    // Metadata records, nothing to create
                    continue;
                }
                other => {
                    return Err(ExtractionError::UnsupportedEntry {
                        entry: entry_name,
                        kind: format!("{:?}", other),
                    });
                }
            }

            count += 1;
        }

        Ok(count)
    }

    /// Create missing ancestors of `relative` below `target`, owned like the
    /// rest of the tree
    fn ensure_parents(
        &self,
        target: &Path,
        relative: &Path,
        identity: Option<UserIdentity>,
    ) -> Result<(), ExtractionError> {
        let Some(parent) = relative.parent() else {
            return Ok(());
        };

        let mut current = target.to_path_buf();
        for component in parent.components() {
            current.push(component);
            if current.is_dir() {
                continue;
            }
            DirBuilder::new()
                .mode(IMPLICIT_DIR_MODE)
                .create(&current)
                .map_err(|e| ExtractionError::io(&current, e))?;
            self.apply_owner(&current, identity)?;
        }

        Ok(())
    }
}

impl ArchiveExtractor for TarGzExtractor {
    fn extract(
        &self,
        archive: &Path,
        work_dir: &Path,
        target: &Path,
        owner_tag: &str,
        identity: Option<UserIdentity>,
    ) -> Result<(), ExtractionError> {
        if !is_supported_archive(archive) {
            return Err(ExtractionError::UnsupportedFormat {
                path: archive.to_path_buf(),
            });
        }

        let intermediate = Self::intermediate_path(work_dir, owner_tag);

        // Removed on success and on every error path
        let intermediate = scopeguard::guard(intermediate, |path| {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove intermediate archive");
                }
            }
        });

        info!(archive = %archive.display(), target = %target.display(), "Extracting seed archive");

        self.decompress(archive, &intermediate)?;
        let count = self.unpack(&intermediate, target, identity)?;

        info!(
            archive = %archive.display(),
            target = %target.display(),
            entries = count,
            "Seed archive extracted"
        );

        Ok(())
    }
}


/// Set permission bits on `path`
pub fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}
