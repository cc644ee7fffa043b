// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Provisioner Configuration Types
//
// Defines the configuration manifest of one provisioner deployment:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Backing directory, export endpoint and owner annotation
// - Seeding strategy (archive, placeholders or nothing)
// - Directory service used to resolve owner identities
// - Delete policy (retain or archive)
// - Logging settings
//
// Configuration is loaded once at startup and handed to the workflow as an
// immutable value.

use crate::domain::allocation::VolumeLayout;
use crate::domain::archive::is_supported_archive;
use crate::domain::identity::UserIdentity;
use crate::domain::path_sanitizer::PathSanitizer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "provisioner.storage.example.com/v1";
pub const KIND: &str = "ProvisionerConfig";

/// Top-level Kubernetes-style provisioner configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// API version (must be "provisioner.storage.example.com/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ProvisionerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: ProvisionerConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Deployment name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Provisioner settings (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfigSpec {
    /// Name the controller registers this provisioner under
    #[serde(default = "default_provisioner_name")]
    pub provisioner_name: String,

    /// Directory where allocations are created (as seen by the provisioner)
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,

    /// Claim annotation naming the owner of the volume
    #[serde(default = "default_owner_annotation")]
    pub owner_annotation: String,

    /// Whether the allocation root or its `volume/` subdirectory is exported
    #[serde(default)]
    pub layout: VolumeLayout,

    #[serde(default)]
    pub seed: SeedConfig,

    #[serde(default)]
    pub export: ExportConfig,

    /// Directory service; without it no ownership is applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityConfig>,

    #[serde(default)]
    pub delete_policy: DeletePolicy,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How a fresh allocation is populated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SeedConfig {
    /// Extract a .tar.gz archive into the volume
    Archive { path: PathBuf },

    /// Create a fixed set of entries
    Placeholders {
        #[serde(default)]
        entries: Vec<PlaceholderEntry>,
    },

    /// Leave the volume empty
    Empty,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self::Archive {
            path: PathBuf::from("/data/base.tar.gz"),
        }
    }
}

/// One entry created by the placeholder seeding strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderEntry {
    /// Path relative to the volume directory
    pub path: PathBuf,

    #[serde(default)]
    pub kind: PlaceholderKind,

    /// Permission bits; defaults to 0o750 for directories, 0o640 for files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

impl PlaceholderEntry {
    pub fn effective_mode(&self) -> u32 {
        self.mode.unwrap_or(match self.kind {
            PlaceholderKind::Directory => 0o750,
            PlaceholderKind::File => 0o640,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderKind {
    #[default]
    Directory,
    File,
}

/// NFS export the allocations are reachable through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// NFS server address
    #[serde(default = "default_nfs_server")]
    pub server: String,

    /// Server-side path that corresponds to `data_directory`
    #[serde(default = "default_nfs_path")]
    pub path: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            server: default_nfs_server(),
            path: default_nfs_path(),
        }
    }
}

/// Identity source for owner uid/gid resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IdentityConfig {
    /// LDAP directory lookup
    Ldap(LdapSettings),

    /// Fixed table (development and testing)
    Static {
        #[serde(default)]
        users: HashMap<String, UserIdentity>,
    },
}

/// LDAP lookup parameters
///
/// Users are searched with the filter `(&(<user_filter>=<username>))` in the
/// whole subtree below `base_dn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapSettings {
    /// `host:port` or an `ldap://` / `ldaps://` URL
    #[serde(default = "default_ldap_server")]
    pub server: String,

    #[serde(default = "default_ldap_base_dn")]
    pub base_dn: String,

    /// Attribute matched against the owner name
    #[serde(default = "default_ldap_user_filter")]
    pub user_filter: String,

    #[serde(default = "default_ldap_uid_attribute")]
    pub uid_attribute: String,

    #[serde(default = "default_ldap_gid_attribute")]
    pub gid_attribute: String,
}

impl Default for LdapSettings {
    fn default() -> Self {
        Self {
            server: default_ldap_server(),
            base_dn: default_ldap_base_dn(),
            user_filter: default_ldap_user_filter(),
            uid_attribute: default_ldap_uid_attribute(),
            gid_attribute: default_ldap_gid_attribute(),
        }
    }
}

/// What happens to the backing directory when the volume is deleted
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeletePolicy {
    /// Keep the data where it is
    #[default]
    Retain,

    /// Rename `pv-<owner>` to `<prefix>-pv-<owner>`
    Archive {
        #[serde(default = "default_archive_prefix")]
        prefix: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_provisioner_name() -> String {
    "storage.example.com/custom".to_string()
}

fn default_data_directory() -> PathBuf {
    PathBuf::from("/data")
}

fn default_owner_annotation() -> String {
    "storage.example.com/owner".to_string()
}

fn default_nfs_server() -> String {
    "127.0.0.1".to_string()
}

fn default_nfs_path() -> String {
    "/exports/pvs".to_string()
}

fn default_ldap_server() -> String {
    "ldap.example.com:389".to_string()
}

fn default_ldap_base_dn() -> String {
    "ou=users,o=example,c=com".to_string()
}

fn default_ldap_user_filter() -> String {
    "uid".to_string()
}

fn default_ldap_uid_attribute() -> String {
    "uidNumber".to_string()
}

fn default_ldap_gid_attribute() -> String {
    "gidNumber".to_string()
}

pub fn default_archive_prefix() -> String {
    "archived".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProvisionerConfigSpec {
    fn default() -> Self {
        Self {
            provisioner_name: default_provisioner_name(),
            data_directory: default_data_directory(),
            owner_annotation: default_owner_annotation(),
            layout: VolumeLayout::default(),
            seed: SeedConfig::default(),
            export: ExportConfig::default(),
            identity: None,
            delete_policy: DeletePolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "nfs-user-provisioner".to_string(),
                labels: None,
            },
            spec: ProvisionerConfigSpec::default(),
        }
    }
}

impl ProvisionerConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Candidate configuration paths in precedence order
    /// 1. PROVISIONER_CONFIG_PATH environment variable
    /// 2. ./provisioner-config.yaml (working directory)
    /// 3. ~/.config/nfs-user-provisioner/config.yaml (user config dir)
    /// 4. /etc/nfs-user-provisioner/config.yaml (system)
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(path) = std::env::var("PROVISIONER_CONFIG_PATH") {
            paths.push(PathBuf::from(path));
        }

        paths.push(PathBuf::from("./provisioner-config.yaml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("nfs-user-provisioner").join("config.yaml"));
        }

        paths.push(PathBuf::from("/etc/nfs-user-provisioner/config.yaml"));
        paths
    }

    /// Discover configuration file using precedence order
    pub fn discover_config() -> Option<PathBuf> {
        Self::candidate_paths().into_iter().find(|path| path.exists())
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    /// This allows container deployments to override config via env vars
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let spec = &mut self.spec;

        if let Some(val) = lookup("PROVISIONER_NAME") {
            tracing::info!("Environment override: PROVISIONER_NAME={}", val);
            spec.provisioner_name = val;
        }

        if let Some(val) = lookup("PROVISIONER_DATA_DIR") {
            tracing::info!("Environment override: PROVISIONER_DATA_DIR={}", val);
            spec.data_directory = PathBuf::from(val);
        }

        if let Some(val) = lookup("PROVISIONER_BASE_ARCHIVE") {
            tracing::info!("Environment override: PROVISIONER_BASE_ARCHIVE={}", val);
            spec.seed = SeedConfig::Archive {
                path: PathBuf::from(val),
            };
        }

        if let Some(val) = lookup("PROVISIONER_NFS_SERVER") {
            tracing::info!("Environment override: PROVISIONER_NFS_SERVER={}", val);
            spec.export.server = val;
        }

        if let Some(val) = lookup("PROVISIONER_NFS_PATH") {
            tracing::info!("Environment override: PROVISIONER_NFS_PATH={}", val);
            spec.export.path = val;
        }

        if let Some(val) = lookup("PROVISIONER_OWNER_ANNOTATION") {
            tracing::info!("Environment override: PROVISIONER_OWNER_ANNOTATION={}", val);
            spec.owner_annotation = val;
        }

        let ldap_server = lookup("PROVISIONER_LDAP_SERVER");
        let ldap_base_dn = lookup("PROVISIONER_LDAP_BASE_DN");
        if ldap_server.is_some() || ldap_base_dn.is_some() {
            let mut settings = match spec.identity.take() {
                Some(IdentityConfig::Ldap(settings)) => settings,
                Some(IdentityConfig::Static { .. }) => {
                    tracing::warn!("LDAP environment overrides replace the static identity table");
                    LdapSettings::default()
                }
                None => LdapSettings::default(),
            };
            if let Some(val) = ldap_server {
                tracing::info!("Environment override: PROVISIONER_LDAP_SERVER={}", val);
                settings.server = val;
            }
            if let Some(val) = ldap_base_dn {
                tracing::info!("Environment override: PROVISIONER_LDAP_BASE_DN={}", val);
                settings.base_dn = val;
            }
            spec.identity = Some(IdentityConfig::Ldap(settings));
        }

        if let Some(val) = lookup("PROVISIONER_DELETE_POLICY") {
            match val.to_lowercase().as_str() {
                "retain" => {
                    tracing::info!("Environment override: PROVISIONER_DELETE_POLICY=retain");
                    spec.delete_policy = DeletePolicy::Retain;
                }
                "archive" => {
                    tracing::info!("Environment override: PROVISIONER_DELETE_POLICY=archive");
                    if !matches!(spec.delete_policy, DeletePolicy::Archive { .. }) {
                        spec.delete_policy = DeletePolicy::Archive {
                            prefix: default_archive_prefix(),
                        };
                    }
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for PROVISIONER_DELETE_POLICY: '{}'. Expected retain/archive. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;

        if spec.provisioner_name.trim().is_empty() {
            anyhow::bail!("spec.provisioner_name cannot be empty");
        }

        if !spec.data_directory.is_absolute() {
            anyhow::bail!(
                "spec.data_directory must be an absolute path: {}",
                spec.data_directory.display()
            );
        }

        if spec.owner_annotation.trim().is_empty() {
            anyhow::bail!("spec.owner_annotation cannot be empty");
        }

        if spec.export.server.trim().is_empty() {
            anyhow::bail!("spec.export.server cannot be empty");
        }

        if !spec.export.path.starts_with('/') {
            anyhow::bail!("spec.export.path must be absolute: '{}'", spec.export.path);
        }

        match &spec.seed {
            SeedConfig::Archive { path } => {
                if !is_supported_archive(path) {
                    anyhow::bail!(
                        "spec.seed.path must be a .tar.gz archive: {}",
                        path.display()
                    );
                }
            }
            SeedConfig::Placeholders { entries } => {
                let sanitizer = PathSanitizer::new();
                for entry in entries {
                    let relative = sanitizer.relative(&entry.path).map_err(|e| {
                        anyhow::anyhow!("Invalid placeholder entry {}: {}", entry.path.display(), e)
                    })?;
                    if relative.as_os_str().is_empty() {
                        anyhow::bail!("Placeholder entry path cannot be empty");
                    }
                }
            }
            SeedConfig::Empty => {}
        }

        if let Some(IdentityConfig::Ldap(ldap)) = &spec.identity {
            for (field, value) in [
                ("server", &ldap.server),
                ("base_dn", &ldap.base_dn),
                ("user_filter", &ldap.user_filter),
                ("uid_attribute", &ldap.uid_attribute),
                ("gid_attribute", &ldap.gid_attribute),
            ] {
                if value.trim().is_empty() {
                    anyhow::bail!("spec.identity.{} cannot be empty", field);
                }
            }
        }

        if let DeletePolicy::Archive { prefix } = &spec.delete_policy {
            if prefix.trim().is_empty() {
                anyhow::bail!("spec.delete_policy.prefix cannot be empty");
            }
            PathSanitizer::new()
                .component(prefix)
                .map_err(|e| anyhow::anyhow!("Invalid archive prefix: {}", e))?;
        }

        Ok(())
    }
}
