// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the provisioner CLI

pub mod config;
pub mod identity;
pub mod output;
pub mod volume;

pub use self::config::ConfigCommand;
pub use self::identity::ResolveArgs;
pub use self::output::OutputFormat;
pub use self::volume::{DeleteArgs, ProvisionArgs};
