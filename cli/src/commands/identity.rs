// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Identity lookup command

use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;

use provisioner_core::domain::config::ProvisionerConfig;
use provisioner_core::infrastructure::create_identity_resolver;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Owner name to look up
    #[arg(value_name = "USERNAME")]
    pub username: String,
}

pub async fn resolve(args: ResolveArgs, config: ProvisionerConfig) -> Result<()> {
    let identity_config = config
        .spec
        .identity
        .as_ref()
        .ok_or_else(|| anyhow!("No identity source configured (spec.identity)"))?;
    let resolver = create_identity_resolver(identity_config);

    // Directory lookups block
    let username = args.username.clone();
    let identity = tokio::task::spawn_blocking(move || resolver.resolve(&username))
        .await
        .context("Identity lookup task failed")?
        .with_context(|| format!("Failed to resolve '{}'", args.username))?;

    println!(
        "{} uid={} gid={}",
        args.username.bold(),
        identity.uid,
        identity.gid
    );

    Ok(())
}
