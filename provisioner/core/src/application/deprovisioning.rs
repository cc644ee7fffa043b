// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume release. Data is never erased: depending on the delete policy the
//! allocation is kept in place or renamed to `<prefix>-pv-<owner>`.

use crate::domain::allocation::{archived_dir_name, ROOT_PREFIX};
use crate::domain::config::{DeletePolicy, ProvisionerConfigSpec};
use crate::domain::path_sanitizer::PathSanitizer;
use crate::domain::volume::DeleteRequest;
use std::fs;
use std::io;
use std::path::{Component, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("Failed to archive {from} to {to}")]
    Archival {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Export path '{path}' was not provisioned here")]
    ForeignVolume { path: String },

    #[error("Delete worker failed: {0}")]
    Worker(String),
}

pub struct Deprovisioner {
    data_directory: PathBuf,
    export_root: String,
    policy: DeletePolicy,
    sanitizer: PathSanitizer,
}

impl Deprovisioner {
    pub fn new(spec: &ProvisionerConfigSpec) -> Self {
        Self {
            data_directory: spec.data_directory.clone(),
            export_root: spec.export.path.clone(),
            policy: spec.delete_policy.clone(),
            sanitizer: PathSanitizer::new(),
        }
    }

    pub fn delete(&self, request: &DeleteRequest) -> Result<(), DeleteError> {
        let volume = &request.volume;

        let prefix = match &self.policy {
            DeletePolicy::Retain => {
                info!(
                    volume = %volume.name,
                    export = %volume.export,
                    "Retaining backing data"
                );
                return Ok(());
            }
            DeletePolicy::Archive { prefix } => prefix,
        };

        let dir_name = self.allocation_dir_name(&volume.export.path)?;
        let from = self.data_directory.join(&dir_name);
        let to = self.data_directory.join(archived_dir_name(prefix, &dir_name));

        // rename(2) silently replaces an empty directory
        if fs::symlink_metadata(&to).is_ok() {
            return Err(DeleteError::Archival {
                from,
                to,
                source: io::Error::new(io::ErrorKind::AlreadyExists, "archive destination exists"),
            });
        }

        fs::rename(&from, &to).map_err(|source| DeleteError::Archival {
            from: from.clone(),
            to: to.clone(),
            source,
        })?;

        info!(
            volume = %volume.name,
            from = %from.display(),
            to = %to.display(),
            "Archived backing data"
        );
        Ok(())
    }

    /// `pv-<owner>` from an export path under the configured export root
    fn allocation_dir_name(&self, export_path: &str) -> Result<String, DeleteError> {
        let foreign = || DeleteError::ForeignVolume {
            path: export_path.to_string(),
        };

        let relative = self
            .sanitizer
            .strip_root(export_path, &self.export_root)
            .map_err(|_| foreign())?;

        match relative.components().next() {
            Some(Component::Normal(name)) => {
                let name = name.to_str().ok_or_else(foreign)?;
                let prefix = format!("{}-", ROOT_PREFIX);
                if name.len() > prefix.len() && name.starts_with(&prefix) {
                    Ok(name.to_string())
                } else {
                    Err(foreign())
                }
            }
            _ => Err(foreign()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::volume::{AccessMode, NfsExport, Quantity, ReclaimPolicy, VolumeDescriptor};
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    /// Relative path -> file contents (None for directories)
    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
        WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|entry| {
                let entry = entry.unwrap();
                let contents = entry.file_type().is_file().then(|| fs::read(entry.path()).unwrap());
                (entry.path().strip_prefix(root).unwrap().to_path_buf(), contents)
            })
            .collect()
    }

    fn populate(data_directory: &Path) {
        fs::create_dir_all(data_directory.join("pv-alice/volume/docs")).unwrap();
        fs::write(data_directory.join("pv-alice/volume/notes.txt"), b"keep").unwrap();
        fs::write(data_directory.join("pv-alice/volume/docs/a.md"), b"# a").unwrap();
        fs::write(data_directory.join("pv-alice/.success"), b"").unwrap();
    }

    fn descriptor(export_path: &str) -> VolumeDescriptor {
        VolumeDescriptor {
            name: "pvc-0001".to_string(),
            export: NfsExport {
                server: "127.0.0.1".to_string(),
                path: export_path.to_string(),
            },
            capacity: Quantity::parse("1Gi").unwrap(),
            access_modes: vec![AccessMode::ReadWriteOnce],
            reclaim_policy: ReclaimPolicy::Delete,
            provisioned_by: "storage.example.com/custom".to_string(),
            owner: "alice".to_string(),
        }
    }

    fn deprovisioner(data_directory: &std::path::Path, policy: DeletePolicy) -> Deprovisioner {
        Deprovisioner::new(&ProvisionerConfigSpec {
            data_directory: data_directory.to_path_buf(),
            delete_policy: policy,
            ..ProvisionerConfigSpec::default()
        })
    }

    fn archive() -> DeletePolicy {
        DeletePolicy::Archive {
            prefix: "archived".to_string(),
        }
    }

    #[test]
    fn test_retain_leaves_data_in_place() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path());
        let before = snapshot(temp_dir.path());

        deprovisioner(temp_dir.path(), DeletePolicy::Retain)
            .delete(&DeleteRequest::new(descriptor("/exports/pvs/pv-alice/volume")))
            .unwrap();

        assert_eq!(snapshot(temp_dir.path()), before);
    }

    #[test]
    fn test_archive_renames_allocation() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path());
        let before = snapshot(&temp_dir.path().join("pv-alice"));

        deprovisioner(temp_dir.path(), archive())
            .delete(&DeleteRequest::new(descriptor("/exports/pvs/pv-alice/volume")))
            .unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["archived-pv-alice"]);
        assert_eq!(snapshot(&temp_dir.path().join("archived-pv-alice")), before);
    }

    #[test]
    fn test_archive_root_layout_export() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("pv-bob")).unwrap();

        deprovisioner(temp_dir.path(), archive())
            .delete(&DeleteRequest::new(descriptor("/exports/pvs/pv-bob")))
            .unwrap();

        assert!(temp_dir.path().join("archived-pv-bob").is_dir());
    }

    #[test]
    fn test_archive_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("pv-alice/volume")).unwrap();
        fs::create_dir_all(temp_dir.path().join("archived-pv-alice")).unwrap();

        let result = deprovisioner(temp_dir.path(), archive())
            .delete(&DeleteRequest::new(descriptor("/exports/pvs/pv-alice/volume")));

        match result {
            Err(DeleteError::Archival { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::AlreadyExists)
            }
            other => panic!("expected archival error, got {:?}", other),
        }
        assert!(temp_dir.path().join("pv-alice/volume").is_dir());
    }

    #[test]
    fn test_archive_missing_allocation_fails() {
        let temp_dir = TempDir::new().unwrap();

        let result = deprovisioner(temp_dir.path(), archive())
            .delete(&DeleteRequest::new(descriptor("/exports/pvs/pv-alice/volume")));

        assert!(matches!(result, Err(DeleteError::Archival { .. })));
    }

    #[test]
    fn test_foreign_export_paths_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let deprovisioner = deprovisioner(temp_dir.path(), archive());

        for path in [
            "/srv/other/pv-alice/volume",
            "/exports/pvs/../pv-alice",
            "/exports/pvs/data-alice",
            "/exports/pvs/pv-",
            "/exports/pvs",
        ] {
            let result = deprovisioner.delete(&DeleteRequest::new(descriptor(path)));
            assert!(
                matches!(result, Err(DeleteError::ForeignVolume { .. })),
                "{} should be rejected",
                path
            );
        }
    }
}
