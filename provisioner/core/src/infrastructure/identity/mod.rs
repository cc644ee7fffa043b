// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Identity Infrastructure Module
//!
//! Concrete implementations of the IdentityResolver trait.

pub mod ldap;

pub use ldap::LdapIdentityResolver;

use crate::domain::config::IdentityConfig;
use crate::domain::identity::{IdentityError, IdentityResolver, UserIdentity};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory function to create an identity resolver from configuration
pub fn create_identity_resolver(config: &IdentityConfig) -> Arc<dyn IdentityResolver> {
    match config {
        IdentityConfig::Ldap(settings) => Arc::new(LdapIdentityResolver::new(settings.clone())),
        IdentityConfig::Static { users } => Arc::new(StaticIdentityResolver::new(users.clone())),
    }
}

/// Fixed name → identity table, for development and tests
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    users: HashMap<String, UserIdentity>,
}

impl StaticIdentityResolver {
    pub fn new(users: HashMap<String, UserIdentity>) -> Self {
        Self { users }
    }

    pub fn with_user(mut self, username: impl Into<String>, identity: UserIdentity) -> Self {
        self.users.insert(username.into(), identity);
        self
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn resolve(&self, username: &str) -> Result<UserIdentity, IdentityError> {
        self.users
            .get(username)
            .copied()
            .ok_or_else(|| IdentityError::NotFound {
                username: username.to_string(),
            })
    }
}
