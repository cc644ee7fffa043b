// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// Value Objects
// ============================================================================

/// Storage capacity as written on the claim (e.g. `5Gi`, `500M`, `1024`).
///
/// The original text is kept so the descriptor echoes exactly what the claim
/// asked for; `bytes()` gives the parsed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity {
    raw: String,
    bytes: u64,
}

impl Quantity {
    /// Parse a quantity, accepting binary (`Ki`..`Ei`) and decimal
    /// (`k`..`E`) suffixes.
    pub fn parse(raw: &str) -> Result<Self, VolumeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(VolumeError::InvalidQuantity(raw.to_string()));
        }

        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, suffix) = trimmed.split_at(split);

        let value: u64 = digits
            .parse()
            .map_err(|_| VolumeError::InvalidQuantity(raw.to_string()))?;

        let multiplier: u64 = match suffix {
            "" => 1,
            "Ki" => 1 << 10,
            "Mi" => 1 << 20,
            "Gi" => 1 << 30,
            "Ti" => 1 << 40,
            "Pi" => 1 << 50,
            "Ei" => 1 << 60,
            "k" => 1_000,
            "M" => 1_000_000,
            "G" => 1_000_000_000,
            "T" => 1_000_000_000_000,
            "P" => 1_000_000_000_000_000,
            "E" => 1_000_000_000_000_000_000,
            _ => return Err(VolumeError::InvalidQuantity(raw.to_string())),
        };

        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| VolumeError::InvalidQuantity(raw.to_string()))?;

        Ok(Self {
            raw: trimmed.to_string(),
            bytes,
        })
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::str::FromStr for Quantity {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Quantity {
    type Error = VolumeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Quantity> for String {
    fn from(quantity: Quantity) -> Self {
        quantity.raw
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Volume access mode, in the orchestrator's spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    ReadWriteOnce,
    ReadOnlyMany,
    ReadWriteMany,
    ReadWriteOncePod,
}

impl std::str::FromStr for AccessMode {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ReadWriteOnce" | "RWO" => Ok(Self::ReadWriteOnce),
            "ReadOnlyMany" | "ROX" => Ok(Self::ReadOnlyMany),
            "ReadWriteMany" | "RWX" => Ok(Self::ReadWriteMany),
            "ReadWriteOncePod" | "RWOP" => Ok(Self::ReadWriteOncePod),
            other => Err(VolumeError::InvalidAccessMode(other.to_string())),
        }
    }
}

/// What the orchestrator does with its volume object once the claim is gone.
///
/// Always `Delete` here: the object goes away, the data is handled by the
/// configured delete policy and is never erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReclaimPolicy {
    Delete,
}

/// NFS export endpoint handed to the orchestrator for mounting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfsExport {
    /// NFS server address (hostname or IP)
    pub server: String,

    /// Remote path on the server
    pub path: String,
}

impl std::fmt::Display for NfsExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.server, self.path)
    }
}

// ============================================================================
// Requests & Descriptors
// ============================================================================

/// A storage claim to satisfy, as handed over by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Orchestrator-assigned volume name (unique)
    pub volume_name: String,

    /// Requested capacity
    pub capacity: Quantity,

    /// Requested access modes
    #[serde(default)]
    pub access_modes: Vec<AccessMode>,

    /// Claim annotations; the owner annotation is looked up here
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl ProvisionRequest {
    pub fn new(
        volume_name: impl Into<String>,
        capacity: Quantity,
        access_modes: Vec<AccessMode>,
    ) -> Self {
        Self {
            volume_name: volume_name.into(),
            capacity,
            access_modes,
            annotations: HashMap::new(),
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Value of the owner annotation, if present and non-blank
    pub fn owner(&self, annotation: &str) -> Option<&str> {
        self.annotations
            .get(annotation)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Volume description returned to the orchestrator after a successful
/// provision. The orchestrator owns and persists it from then on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    /// Orchestrator volume name (copied from the request)
    pub name: String,

    /// Where to mount the volume from
    pub export: NfsExport,

    pub capacity: Quantity,

    pub access_modes: Vec<AccessMode>,

    pub reclaim_policy: ReclaimPolicy,

    /// Name of the provisioner that created the volume
    pub provisioned_by: String,

    /// Owner the backing directory was allocated for
    pub owner: String,
}

/// Request to release a previously provisioned volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub volume: VolumeDescriptor,
}

impl DeleteRequest {
    pub fn new(volume: VolumeDescriptor) -> Self {
        Self { volume }
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("Invalid capacity quantity: '{0}'")]
    InvalidQuantity(String),

    #[error("Invalid access mode: '{0}'")]
    InvalidAccessMode(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_binary_suffixes() {
        assert_eq!(Quantity::parse("5Gi").unwrap().bytes(), 5 * 1024 * 1024 * 1024);
        assert_eq!(Quantity::parse("512Mi").unwrap().bytes(), 512 * 1024 * 1024);
        assert_eq!(Quantity::parse("1Ki").unwrap().bytes(), 1024);
    }

    #[test]
    fn test_quantity_decimal_suffixes() {
        assert_eq!(Quantity::parse("500M").unwrap().bytes(), 500_000_000);
        assert_eq!(Quantity::parse("2k").unwrap().bytes(), 2_000);
        assert_eq!(Quantity::parse("1024").unwrap().bytes(), 1024);
    }

    #[test]
    fn test_quantity_rejects_garbage() {
        assert!(Quantity::parse("").is_err());
        assert!(Quantity::parse("Gi").is_err());
        assert!(Quantity::parse("5Xi").is_err());
        assert!(Quantity::parse("1.5Gi").is_err());
        assert!(Quantity::parse("99999999999Ei").is_err());
    }

    #[test]
    fn test_quantity_keeps_original_text() {
        let quantity = Quantity::parse(" 5Gi ").unwrap();
        assert_eq!(quantity.to_string(), "5Gi");
        assert_eq!(serde_json::to_string(&quantity).unwrap(), "\"5Gi\"");

        let parsed: Quantity = serde_json::from_str("\"10Gi\"").unwrap();
        assert_eq!(parsed.bytes(), 10 * 1024 * 1024 * 1024);
        assert!(serde_json::from_str::<Quantity>("\"ten\"").is_err());
    }

    #[test]
    fn test_access_mode_parsing() {
        assert_eq!("ReadWriteOnce".parse::<AccessMode>().unwrap(), AccessMode::ReadWriteOnce);
        assert_eq!("RWX".parse::<AccessMode>().unwrap(), AccessMode::ReadWriteMany);
        assert!("Sometimes".parse::<AccessMode>().is_err());
    }

    #[test]
    fn test_owner_annotation_lookup() {
        let request = ProvisionRequest::new(
            "pvc-1234",
            Quantity::parse("1Gi").unwrap(),
            vec![AccessMode::ReadWriteMany],
        )
        .with_annotation("storage.example.com/owner", "alice")
        .with_annotation("blank", "   ");

        assert_eq!(request.owner("storage.example.com/owner"), Some("alice"));
        assert_eq!(request.owner("blank"), None);
        assert_eq!(request.owner("missing"), None);
    }

    #[test]
    fn test_export_display() {
        let export = NfsExport {
            server: "10.0.0.5".to_string(),
            path: "/exports/pvs/pv-alice/volume".to_string(),
        };
        assert_eq!(export.to_string(), "10.0.0.5:/exports/pvs/pv-alice/volume");
    }
}
