// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning Workflow Application Service
//!
//! Turns a storage claim into a seeded backing directory and the volume
//! descriptor the orchestrator persists:
//!
//! 1. read the owner from the claim annotations
//! 2. resolve the owner's uid/gid (when a directory service is configured)
//! 3. reuse the allocation if its sentinel exists, otherwise wipe any
//!    leftover root and allocate it again
//! 4. seed it (archive, placeholders or nothing) and write the sentinel last
//! 5. describe the NFS export
//!
//! Calls are synchronous and block the calling thread for the whole run.
//! Concurrent calls for the same owner are not serialized here.

use crate::domain::allocation::{AllocationState, BackingAllocation};
use crate::domain::archive::{ArchiveExtractor, ExtractionError};
use crate::domain::config::{PlaceholderEntry, PlaceholderKind, ProvisionerConfig, ProvisionerConfigSpec, SeedConfig};
use crate::domain::identity::{IdentityError, IdentityResolver, OwnershipApplier, UserIdentity};
use crate::domain::path_sanitizer::PathSanitizer;
use crate::domain::volume::{NfsExport, ProvisionRequest, ReclaimPolicy, VolumeDescriptor};
use crate::infrastructure::archive::{apply_mode, TarGzExtractor};
use crate::infrastructure::identity::create_identity_resolver;
use crate::infrastructure::ownership::UnixOwnership;
use std::fs::{self, DirBuilder, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Mode of freshly allocated directories
const ALLOCATION_DIR_MODE: u32 = 0o740;

/// Mode of the sentinel once written
const SENTINEL_MODE: u32 = 0o444;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Volume {volume}: missing '{annotation}' annotation")]
    MissingOwnerAnnotation { annotation: String, volume: String },

    #[error("Owner '{owner}' cannot be used as a directory name")]
    InvalidOwner { owner: String },

    #[error("Identity lookup failed")]
    IdentityLookup(#[from] IdentityError),

    #[error("Failed to allocate {path}")]
    Allocation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to seed volume")]
    Extraction(#[from] ExtractionError),

    #[error("Provisioning worker failed: {0}")]
    Worker(String),
}

impl ProvisionError {
    fn allocation(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Allocation {
            path: path.into(),
            source,
        }
    }
}

pub struct ProvisioningWorkflow {
    spec: ProvisionerConfigSpec,
    identity_resolver: Option<Arc<dyn IdentityResolver>>,
    extractor: Arc<dyn ArchiveExtractor>,
    ownership: Arc<dyn OwnershipApplier>,
    sanitizer: PathSanitizer,
}

impl ProvisioningWorkflow {
    pub fn new(
        spec: ProvisionerConfigSpec,
        identity_resolver: Option<Arc<dyn IdentityResolver>>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        Self {
            spec,
            identity_resolver,
            extractor,
            ownership: Arc::new(UnixOwnership),
            sanitizer: PathSanitizer::new(),
        }
    }

    /// Replace how the allocation root, volume and placeholders are chowned
    pub fn with_ownership(mut self, ownership: Arc<dyn OwnershipApplier>) -> Self {
        self.ownership = ownership;
        self
    }

    /// Wire the workflow with the resolver and extractor named in `config`
    pub fn from_config(config: &ProvisionerConfig) -> Self {
        let identity_resolver = config.spec.identity.as_ref().map(create_identity_resolver);
        Self::new(
            config.spec.clone(),
            identity_resolver,
            Arc::new(TarGzExtractor::new()),
        )
    }

    /// Backing allocation used for `owner`
    pub fn allocation_for(&self, owner: &str) -> BackingAllocation {
        BackingAllocation::new(&self.spec.data_directory, owner, self.spec.layout)
    }

    /// Provision (or re-describe) the volume requested by `request`
    pub fn provision(&self, request: &ProvisionRequest) -> Result<VolumeDescriptor, ProvisionError> {
        let owner = request
            .owner(&self.spec.owner_annotation)
            .ok_or_else(|| ProvisionError::MissingOwnerAnnotation {
                annotation: self.spec.owner_annotation.clone(),
                volume: request.volume_name.clone(),
            })?;

        self.sanitizer
            .component(owner)
            .map_err(|_| ProvisionError::InvalidOwner {
                owner: owner.to_string(),
            })?;

        let identity = match &self.identity_resolver {
            Some(resolver) => Some(resolver.resolve(owner)?),
            None => None,
        };

        match identity {
            Some(identity) => info!(
                volume = %request.volume_name,
                owner = %owner,
                uid = identity.uid,
                gid = identity.gid,
                "Provisioning volume"
            ),
            None => info!(volume = %request.volume_name, owner = %owner, "Provisioning volume"),
        }

        let allocation = self.allocation_for(owner);

        let state = allocation
            .state()
            .map_err(|e| ProvisionError::allocation(allocation.sentinel(), e))?;

        match state {
            AllocationState::Complete => {
                info!(
                    path = %allocation.root().display(),
                    "Allocation already complete, reusing it"
                );
            }
            AllocationState::Incomplete => {
                self.allocate(&allocation, identity)?;
                self.seed(&allocation, owner, identity)?;
                self.mark_complete(&allocation)?;
            }
        }

        let descriptor = self.describe(request, owner, &allocation);
        info!(
            volume = %descriptor.name,
            export = %descriptor.export,
            "NFS export ready"
        );

        Ok(descriptor)
    }

    /// Remove any leftover root and create the exported directory fresh
    fn allocate(
        &self,
        allocation: &BackingAllocation,
        identity: Option<UserIdentity>,
    ) -> Result<(), ProvisionError> {
        let root = allocation.root();

        match fs::symlink_metadata(root) {
            Ok(_) => {
                warn!(path = %root.display(), "Removing incomplete allocation left by an earlier attempt");
                fs::remove_dir_all(root).map_err(|e| ProvisionError::allocation(root, e))?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ProvisionError::allocation(root, e)),
        }

        let export_dir = allocation.export_dir();
        info!(path = %export_dir.display(), "Creating allocation");

        DirBuilder::new()
            .recursive(true)
            .mode(ALLOCATION_DIR_MODE)
            .create(export_dir)
            .map_err(|e| ProvisionError::allocation(export_dir, e))?;

        if export_dir != root {
            self.chown(root, identity)?;
        }
        self.chown(export_dir, identity)?;
        Ok(())
    }

    fn seed(
        &self,
        allocation: &BackingAllocation,
        owner: &str,
        identity: Option<UserIdentity>,
    ) -> Result<(), ProvisionError> {
        let target = allocation.export_dir();

        match &self.spec.seed {
            SeedConfig::Archive { path } => {
                self.extractor
                    .extract(path, &self.spec.data_directory, target, owner, identity)?;
            }
            SeedConfig::Placeholders { entries } => {
                for entry in entries {
                    self.create_placeholder(target, entry, identity)?;
                }
                debug!(count = entries.len(), "Placeholder entries created");
            }
            SeedConfig::Empty => {
                debug!(path = %target.display(), "Leaving volume empty");
            }
        }

        Ok(())
    }

    fn create_placeholder(
        &self,
        target: &Path,
        entry: &PlaceholderEntry,
        identity: Option<UserIdentity>,
    ) -> Result<(), ProvisionError> {
        let relative = self.sanitizer.relative(&entry.path).map_err(|e| {
            ProvisionError::allocation(
                target.join(&entry.path),
                io::Error::new(io::ErrorKind::InvalidInput, e.to_string()),
            )
        })?;

        // Ancestors first, so every level ends up owned by the user
        let mut current = target.to_path_buf();
        if let Some(parent) = relative.parent() {
            for component in parent.components() {
                current.push(component);
                if !current.is_dir() {
                    DirBuilder::new()
                        .mode(entry.effective_mode() | 0o700)
                        .create(&current)
                        .map_err(|e| ProvisionError::allocation(&current, e))?;
                    self.chown(&current, identity)?;
                }
            }
        }

        let path = target.join(&relative);
        match entry.kind {
            PlaceholderKind::Directory => {
                DirBuilder::new()
                    .recursive(true)
                    .mode(entry.effective_mode())
                    .create(&path)
                    .map_err(|e| ProvisionError::allocation(&path, e))?;
            }
            PlaceholderKind::File => {
                OpenOptions::new()
                    .create(true)
                    .truncate(true)
                    .write(true)
                    .mode(entry.effective_mode())
                    .open(&path)
                    .map_err(|e| ProvisionError::allocation(&path, e))?;
            }
        }

        self.chown(&path, identity)?;
        debug!(path = %path.display(), kind = ?entry.kind, "Placeholder created");
        Ok(())
    }

    /// Write the sentinel. Must stay the last filesystem step of a provision.
    fn mark_complete(&self, allocation: &BackingAllocation) -> Result<(), ProvisionError> {
        let sentinel = allocation.sentinel();

        fs::File::create(sentinel).map_err(|e| ProvisionError::allocation(sentinel, e))?;
        if let Err(e) = apply_mode(sentinel, SENTINEL_MODE) {
            warn!(path = %sentinel.display(), error = %e, "Failed to make sentinel read-only");
        }

        debug!(path = %sentinel.display(), "Allocation marked complete");
        Ok(())
    }

    fn chown(&self, path: &Path, identity: Option<UserIdentity>) -> Result<(), ProvisionError> {
        if let Some(identity) = identity {
            self.ownership
                .apply(path, identity)
                .map_err(|e| ProvisionError::allocation(path, e))?;
        }
        Ok(())
    }

    fn describe(
        &self,
        request: &ProvisionRequest,
        owner: &str,
        allocation: &BackingAllocation,
    ) -> VolumeDescriptor {
        VolumeDescriptor {
            name: request.volume_name.clone(),
            export: NfsExport {
                server: self.spec.export.server.clone(),
                path: export_path(&self.spec.export.path, &allocation.export_suffix()),
            },
            capacity: request.capacity.clone(),
            access_modes: request.access_modes.clone(),
            reclaim_policy: ReclaimPolicy::Delete,
            provisioned_by: self.spec.provisioner_name.clone(),
            owner: owner.to_string(),
        }
    }
}

/// `<export_root>/<suffix>` without doubled separators
pub fn export_path(export_root: &str, suffix: &str) -> String {
    format!("{}/{}", export_root.trim_end_matches('/'), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::allocation::VolumeLayout;
    use crate::domain::volume::{AccessMode, Quantity};
    use crate::infrastructure::identity::StaticIdentityResolver;
    use std::collections::HashMap;
    use std::os::unix::fs::MetadataExt;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingOwnership {
        applied: Mutex<HashMap<PathBuf, UserIdentity>>,
    }

    impl OwnershipApplier for RecordingOwnership {
        fn apply(&self, path: &Path, identity: UserIdentity) -> io::Result<()> {
            fs::symlink_metadata(path)?;
            self.applied.lock().unwrap().insert(path.to_path_buf(), identity);
            Ok(())
        }
    }

    const OWNER_ANNOTATION: &str = "storage.example.com/owner";

    fn spec(data_directory: &Path, seed: SeedConfig) -> ProvisionerConfigSpec {
        ProvisionerConfigSpec {
            data_directory: data_directory.to_path_buf(),
            seed,
            ..ProvisionerConfigSpec::default()
        }
    }

    fn request(owner: Option<&str>) -> ProvisionRequest {
        let request = ProvisionRequest::new(
            "pvc-0001",
            Quantity::parse("5Gi").unwrap(),
            vec![AccessMode::ReadWriteMany],
        );
        match owner {
            Some(owner) => request.with_annotation(OWNER_ANNOTATION, owner),
            None => request,
        }
    }

    #[test]
    fn test_export_path_join() {
        assert_eq!(export_path("/exports/pvs", "pv-alice/volume"), "/exports/pvs/pv-alice/volume");
        assert_eq!(export_path("/exports/pvs/", "pv-alice"), "/exports/pvs/pv-alice");
        assert_eq!(export_path("/", "pv-alice"), "/pv-alice");
    }

    #[test]
    fn test_empty_seed_creates_volume_and_sentinel() {
        let temp_dir = TempDir::new().unwrap();
        let workflow = ProvisioningWorkflow::new(
            spec(temp_dir.path(), SeedConfig::Empty),
            None,
            Arc::new(TarGzExtractor::new()),
        );

        let descriptor = workflow.provision(&request(Some("alice"))).unwrap();

        assert!(temp_dir.path().join("pv-alice/volume").is_dir());
        assert!(temp_dir.path().join("pv-alice/.success").is_file());
        assert_eq!(descriptor.export.path, "/exports/pvs/pv-alice/volume");
        assert_eq!(descriptor.export.server, "127.0.0.1");
        assert_eq!(descriptor.owner, "alice");
        assert_eq!(descriptor.reclaim_policy, ReclaimPolicy::Delete);
        assert_eq!(descriptor.capacity.as_str(), "5Gi");
    }

    #[test]
    fn test_sentinel_is_read_only() {
        let temp_dir = TempDir::new().unwrap();
        let workflow = ProvisioningWorkflow::new(
            spec(temp_dir.path(), SeedConfig::Empty),
            None,
            Arc::new(TarGzExtractor::new()),
        );
        workflow.provision(&request(Some("alice"))).unwrap();

        let metadata = fs::metadata(temp_dir.path().join("pv-alice/.success")).unwrap();
        assert_eq!(metadata.len(), 0);
        assert_eq!(metadata.mode() & 0o777, SENTINEL_MODE);
    }

    #[test]
    fn test_root_layout_exports_allocation_root() {
        let temp_dir = TempDir::new().unwrap();
        let mut spec = spec(temp_dir.path(), SeedConfig::Empty);
        spec.layout = VolumeLayout::Root;
        let workflow = ProvisioningWorkflow::new(spec, None, Arc::new(TarGzExtractor::new()));

        let descriptor = workflow.provision(&request(Some("bob"))).unwrap();

        assert_eq!(descriptor.export.path, "/exports/pvs/pv-bob");
        assert!(!temp_dir.path().join("pv-bob/volume").exists());
        assert!(temp_dir.path().join("pv-bob/.success").exists());
    }

    #[test]
    fn test_invalid_owner_rejected_before_filesystem() {
        let temp_dir = TempDir::new().unwrap();
        let workflow = ProvisioningWorkflow::new(
            spec(temp_dir.path(), SeedConfig::Empty),
            None,
            Arc::new(TarGzExtractor::new()),
        );

        let result = workflow.provision(&request(Some("../etc")));

        assert!(matches!(result, Err(ProvisionError::InvalidOwner { .. })));
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unknown_owner_fails_identity_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let workflow = ProvisioningWorkflow::new(
            spec(temp_dir.path(), SeedConfig::Empty),
            Some(Arc::new(StaticIdentityResolver::default())),
            Arc::new(TarGzExtractor::new()),
        );

        let result = workflow.provision(&request(Some("ghost")));

        assert!(matches!(
            result,
            Err(ProvisionError::IdentityLookup(IdentityError::NotFound { .. }))
        ));
        assert!(!temp_dir.path().join("pv-ghost").exists());
    }

    #[test]
    fn test_placeholders_created_with_owner() {
        let temp_dir = TempDir::new().unwrap();
        let metadata = fs::metadata(temp_dir.path()).unwrap();
        let identity = UserIdentity::new(metadata.uid(), metadata.gid());

        let workflow = ProvisioningWorkflow::new(
            spec(
                temp_dir.path(),
                SeedConfig::Placeholders {
                    entries: vec![
                        PlaceholderEntry {
                            path: PathBuf::from("public_html"),
                            kind: PlaceholderKind::Directory,
                            mode: Some(0o755),
                        },
                        PlaceholderEntry {
                            path: PathBuf::from("config/settings.ini"),
                            kind: PlaceholderKind::File,
                            mode: None,
                        },
                    ],
                },
            ),
            Some(Arc::new(StaticIdentityResolver::default().with_user("carol", identity))),
            Arc::new(TarGzExtractor::new()),
        );

        workflow.provision(&request(Some("carol"))).unwrap();

        let volume = temp_dir.path().join("pv-carol/volume");
        assert!(volume.join("public_html").is_dir());
        assert!(volume.join("config").is_dir());
        let settings = fs::metadata(volume.join("config/settings.ini")).unwrap();
        assert!(settings.is_file());
        assert_eq!(settings.len(), 0);
        assert_eq!(settings.uid(), identity.uid);
        assert_eq!(settings.gid(), identity.gid);
    }

    #[test]
    fn test_resolved_identity_applied_to_allocation_and_placeholders() {
        let temp_dir = TempDir::new().unwrap();
        let owner = UserIdentity::new(1001, 1001);
        let ownership = Arc::new(RecordingOwnership::default());

        let workflow = ProvisioningWorkflow::new(
            spec(
                temp_dir.path(),
                SeedConfig::Placeholders {
                    entries: vec![PlaceholderEntry {
                        path: PathBuf::from("config/app/settings.ini"),
                        kind: PlaceholderKind::File,
                        mode: None,
                    }],
                },
            ),
            Some(Arc::new(StaticIdentityResolver::default().with_user("erin", owner))),
            Arc::new(TarGzExtractor::new()),
        )
        .with_ownership(ownership.clone());

        workflow.provision(&request(Some("erin"))).unwrap();

        let root = temp_dir.path().join("pv-erin");
        let applied = ownership.applied.lock().unwrap().clone();
        for path in [
            root.clone(),
            root.join("volume"),
            root.join("volume/config"),
            root.join("volume/config/app"),
            root.join("volume/config/app/settings.ini"),
        ] {
            assert_eq!(applied.get(&path), Some(&owner), "{}", path.display());
        }
        assert_eq!(applied.len(), 5);
        assert!(!applied.contains_key(&root.join(".success")));
    }

    #[test]
    fn test_unreadable_sentinel_keeps_existing_data() {
        let temp_dir = TempDir::new().unwrap();
        let workflow = ProvisioningWorkflow::new(
            spec(temp_dir.path(), SeedConfig::Empty),
            None,
            Arc::new(TarGzExtractor::new()),
        );
        workflow.provision(&request(Some("alice"))).unwrap();

        let thesis = temp_dir.path().join("pv-alice/volume/thesis.tex");
        fs::write(&thesis, "chapter one").unwrap();
        let sentinel = temp_dir.path().join("pv-alice/.success");
        fs::remove_file(&sentinel).unwrap();
        std::os::unix::fs::symlink(&sentinel, &sentinel).unwrap();

        let result = workflow.provision(&request(Some("alice")));

        assert!(matches!(
            result,
            Err(ProvisionError::Allocation { ref path, .. }) if *path == sentinel
        ));
        assert_eq!(fs::read_to_string(&thesis).unwrap(), "chapter one");
    }
}
