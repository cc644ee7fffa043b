// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! chown(2)-backed ownership

use crate::domain::identity::{OwnershipApplier, UserIdentity};
use std::io;
use std::path::Path;

/// Sets uid and gid of an entry without following a final symlink
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixOwnership;

impl OwnershipApplier for UnixOwnership {
    fn apply(&self, path: &Path, identity: UserIdentity) -> io::Result<()> {
        std::os::unix::fs::lchown(path, Some(identity.uid), Some(identity.gid))
    }
}
