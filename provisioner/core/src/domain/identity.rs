// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Identity Resolver Trait - Anti-Corruption Layer for the Directory Service
//!
//! Maps the owner named on a storage claim to the numeric identity that must
//! own the provisioned directory tree. The directory service is the source
//! of truth, so identities are resolved on every call and never cached.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Boxed cause carried by identity errors raised by concrete backends
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Numeric POSIX identity of a volume owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    pub uid: u32,
    pub gid: u32,
}

impl UserIdentity {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }
}

impl std::fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// Resolves owner names to numeric identities
///
/// Implementations are synchronous: a provision call runs start to finish on
/// one worker thread and the lookup blocks that thread.
pub trait IdentityResolver: Send + Sync {
    /// Resolve `username` to a `(uid, gid)` pair
    ///
    /// # Returns
    /// * `Ok(UserIdentity)` - identity of the first matching directory entry
    /// * `Err(IdentityError)` - unreachable service, no match or malformed attributes
    fn resolve(&self, username: &str) -> Result<UserIdentity, IdentityError>;
}

/// Hands a created filesystem entry over to a resolved identity
pub trait OwnershipApplier: Send + Sync {
    fn apply(&self, path: &Path, identity: UserIdentity) -> std::io::Result<()>;
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Failed to connect to directory service {server}")]
    Connection {
        server: String,
        #[source]
        source: BoxError,
    },

    #[error("Directory search under '{base_dn}' failed")]
    Search {
        base_dn: String,
        #[source]
        source: BoxError,
    },

    #[error("No directory entry found for user '{username}'")]
    NotFound { username: String },

    #[error("Directory entry for '{username}' has no '{attribute}' attribute")]
    MissingAttribute { username: String, attribute: String },

    #[error("Attribute '{attribute}' of '{username}' is not a valid id: '{value}'")]
    InvalidAttribute {
        username: String,
        attribute: String,
        value: String,
    },
}

/// Parse a directory attribute value into a numeric id
pub fn parse_id(username: &str, attribute: &str, value: &str) -> Result<u32, IdentityError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| IdentityError::InvalidAttribute {
            username: username.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("alice", "uidNumber", "1001").unwrap(), 1001);
        assert_eq!(parse_id("alice", "uidNumber", " 42 ").unwrap(), 42);
    }

    #[test]
    fn test_parse_id_rejects_non_numeric() {
        let err = parse_id("alice", "gidNumber", "staff").unwrap_err();
        assert!(matches!(
            err,
            IdentityError::InvalidAttribute { ref attribute, ref value, .. }
                if attribute == "gidNumber" && value == "staff"
        ));
        assert!(parse_id("alice", "uidNumber", "-1").is_err());
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(UserIdentity::new(1001, 100).to_string(), "1001:100");
    }
}
