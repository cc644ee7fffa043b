// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Backing Allocation
//!
//! On-disk layout of one provisioned volume:
//!
//! ```text
//! <data_directory>/pv-<owner>/            allocation root
//! <data_directory>/pv-<owner>/volume/     exported subtree (subpath layout)
//! <data_directory>/pv-<owner>/.success    sentinel, written last
//! <data_directory>/<prefix>-pv-<owner>/   archived allocation
//! ```
//!
//! The sentinel is the only completion signal. A root without it is a
//! leftover from an interrupted attempt and gets rebuilt from scratch.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const ROOT_PREFIX: &str = "pv";
pub const VOLUME_DIR: &str = "volume";
pub const SENTINEL_FILE: &str = ".success";

/// Which directory of the allocation is exported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeLayout {
    /// Export `<root>/volume`; the sentinel stays outside the export
    #[default]
    Subpath,
    /// Export the allocation root itself
    Root,
}

/// Lifecycle of an allocation on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationState {
    /// Missing, or left behind by an attempt that never wrote the sentinel
    Incomplete,
    /// Allocated and fully seeded
    Complete,
}

/// Deterministic paths of the allocation owned by one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingAllocation {
    dir_name: String,
    root: PathBuf,
    volume: PathBuf,
    sentinel: PathBuf,
    layout: VolumeLayout,
}

impl BackingAllocation {
    pub fn new(data_directory: &Path, owner: &str, layout: VolumeLayout) -> Self {
        let dir_name = allocation_dir_name(owner);
        let root = data_directory.join(&dir_name);
        let volume = root.join(VOLUME_DIR);
        let sentinel = root.join(SENTINEL_FILE);

        Self {
            dir_name,
            root,
            volume,
            sentinel,
            layout,
        }
    }

    /// Directory name under the data directory (`pv-<owner>`)
    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn volume(&self) -> &Path {
        &self.volume
    }

    pub fn sentinel(&self) -> &Path {
        &self.sentinel
    }

    /// Directory that is seeded and exported, depending on the layout
    pub fn export_dir(&self) -> &Path {
        match self.layout {
            VolumeLayout::Subpath => &self.volume,
            VolumeLayout::Root => &self.root,
        }
    }

    /// Export path relative to the NFS export root
    pub fn export_suffix(&self) -> String {
        match self.layout {
            VolumeLayout::Subpath => format!("{}/{}", self.dir_name, VOLUME_DIR),
            VolumeLayout::Root => self.dir_name.clone(),
        }
    }

    /// Completion state from the sentinel. Only a missing sentinel means
    /// incomplete; any other stat failure is returned to the caller.
    pub fn state(&self) -> io::Result<AllocationState> {
        match fs::metadata(&self.sentinel) {
            Ok(_) => Ok(AllocationState::Complete),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(AllocationState::Incomplete),
            Err(e) => Err(e),
        }
    }
}

/// `pv-<owner>`
pub fn allocation_dir_name(owner: &str) -> String {
    format!("{}-{}", ROOT_PREFIX, owner)
}

/// `<prefix>-pv-<owner>` for an allocation directory name `pv-<owner>`
pub fn archived_dir_name(archive_prefix: &str, dir_name: &str) -> String {
    format!("{}-{}", archive_prefix, dir_name)
}
