// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod identity;
pub mod archive;
pub mod ownership;

pub use archive::TarGzExtractor;
pub use identity::{create_identity_resolver, LdapIdentityResolver, StaticIdentityResolver};
pub use ownership::UnixOwnership;
