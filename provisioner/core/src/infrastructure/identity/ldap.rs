// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! LDAP Identity Resolver
//!
//! Resolves owner names to uid/gid through a subtree search against the
//! configured base DN. One connection per lookup; the connection is unbound
//! on every exit path.
//!
//! Only the first returned entry is used. Several matches mean ambiguous
//! directory data; this is logged and otherwise accepted.

use crate::domain::config::LdapSettings;
use crate::domain::identity::{parse_id, IdentityError, IdentityResolver, UserIdentity};
use ldap3::{ldap_escape, LdapConn, Scope, SearchEntry};
use std::collections::HashMap;
use tracing::{debug, warn};

pub struct LdapIdentityResolver {
    settings: LdapSettings,
}

impl LdapIdentityResolver {
    pub fn new(settings: LdapSettings) -> Self {
        Self { settings }
    }

    /// Connection URL for the configured server
    ///
    /// Bare `host:port` addresses are treated as plain `ldap://`.
    pub fn url(&self) -> String {
        if self.settings.server.contains("://") {
            self.settings.server.clone()
        } else {
            format!("ldap://{}", self.settings.server)
        }
    }

    /// Search filter for `username`: `(&(<user_filter>=<escaped username>))`
    pub fn filter(&self, username: &str) -> String {
        format!("(&({}={}))", self.settings.user_filter, ldap_escape(username))
    }

    /// Build the identity from the attributes of a directory entry
    fn identity_from_attrs(
        &self,
        username: &str,
        attrs: &HashMap<String, Vec<String>>,
    ) -> Result<UserIdentity, IdentityError> {
        let uid = attribute_value(attrs, &self.settings.uid_attribute).ok_or_else(|| {
            IdentityError::MissingAttribute {
                username: username.to_string(),
                attribute: self.settings.uid_attribute.clone(),
            }
        })?;
        let gid = attribute_value(attrs, &self.settings.gid_attribute).ok_or_else(|| {
            IdentityError::MissingAttribute {
                username: username.to_string(),
                attribute: self.settings.gid_attribute.clone(),
            }
        })?;

        Ok(UserIdentity::new(
            parse_id(username, &self.settings.uid_attribute, uid)?,
            parse_id(username, &self.settings.gid_attribute, gid)?,
        ))
    }
}

impl IdentityResolver for LdapIdentityResolver {
    fn resolve(&self, username: &str) -> Result<UserIdentity, IdentityError> {
        let url = self.url();
        let filter = self.filter(username);
        debug!(server = %url, base_dn = %self.settings.base_dn, filter = %filter, "Searching directory");

        let conn = LdapConn::new(&url).map_err(|e| IdentityError::Connection {
            server: self.settings.server.clone(),
            source: Box::new(e),
        })?;

        // Unbind whatever way this function returns
        let mut conn = scopeguard::guard(conn, |mut conn| {
            if let Err(e) = conn.unbind() {
                debug!(error = %e, "Failed to unbind directory connection");
            }
        });

        let attributes = vec![
            self.settings.uid_attribute.as_str(),
            self.settings.gid_attribute.as_str(),
        ];

        let (entries, _result) = conn
            .search(&self.settings.base_dn, Scope::Subtree, &filter, attributes)
            .and_then(|result| result.success())
            .map_err(|e| IdentityError::Search {
                base_dn: self.settings.base_dn.clone(),
                source: Box::new(e),
            })?;

        if entries.len() > 1 {
            warn!(
                username = %username,
                matches = entries.len(),
                "Multiple directory entries matched, using the first one"
            );
        }

        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::NotFound {
                username: username.to_string(),
            })?;

        let entry = SearchEntry::construct(entry);
        debug!(dn = %entry.dn, "Directory entry found");

        self.identity_from_attrs(username, &entry.attrs)
    }
}

/// First value of an attribute; attribute names compare case-insensitively
fn attribute_value<'a>(attrs: &'a HashMap<String, Vec<String>>, name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}
