// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume lifecycle commands
//!
//! Commands: provision, delete

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use provisioner_core::application::{ProvisionerService, StandardProvisionerService};
use provisioner_core::domain::config::{DeletePolicy, ProvisionerConfig};
use provisioner_core::domain::volume::{AccessMode, DeleteRequest, ProvisionRequest, Quantity};

use super::output::{load_descriptor, render, OutputFormat};

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Volume name assigned by the orchestrator
    #[arg(value_name = "VOLUME")]
    pub volume_name: String,

    /// Owner of the volume (sets the owner annotation)
    #[arg(short, long)]
    pub owner: String,

    /// Requested capacity, e.g. 5Gi
    #[arg(long, default_value = "1Gi")]
    pub capacity: Quantity,

    /// Access mode (repeatable): ReadWriteOnce, ReadOnlyMany, ReadWriteMany, ReadWriteOncePod
    #[arg(long = "access-mode", default_value = "ReadWriteMany")]
    pub access_modes: Vec<AccessMode>,

    /// Descriptor output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub output: OutputFormat,

    /// Also write the descriptor to this file (input for `delete`)
    #[arg(long, value_name = "FILE")]
    pub save: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Descriptor file written by `provision --save`
    #[arg(value_name = "DESCRIPTOR")]
    pub descriptor: PathBuf,
}

fn ensure_valid(config: &ProvisionerConfig) -> Result<()> {
    config
        .validate()
        .context("Configuration validation failed")
}

pub fn build_request(args: &ProvisionArgs, config: &ProvisionerConfig) -> ProvisionRequest {
    ProvisionRequest::new(
        args.volume_name.clone(),
        args.capacity.clone(),
        args.access_modes.clone(),
    )
    .with_annotation(config.spec.owner_annotation.clone(), args.owner.clone())
}

pub async fn provision(args: ProvisionArgs, config: ProvisionerConfig) -> Result<()> {
    ensure_valid(&config)?;
    let service = StandardProvisionerService::from_config(&config);

    let request = build_request(&args, &config);
    info!(volume = %request.volume_name, owner = %args.owner, "Provision requested");

    let descriptor = service
        .provision(request)
        .await
        .with_context(|| format!("Failed to provision volume '{}'", args.volume_name))?;

    let rendered = render(&descriptor, args.output)?;

    if let Some(path) = &args.save {
        std::fs::write(path, &rendered)
            .with_context(|| format!("Failed to write descriptor to {:?}", path))?;
        eprintln!(
            "{}",
            format!("✓ Descriptor saved: {}", path.display()).green()
        );
    }

    eprintln!(
        "{}",
        format!("✓ Volume {} exported at {}", descriptor.name, descriptor.export).green()
    );
    println!("{}", rendered);

    Ok(())
}

pub async fn delete(args: DeleteArgs, config: ProvisionerConfig) -> Result<()> {
    ensure_valid(&config)?;
    let descriptor = load_descriptor(&args.descriptor)?;
    let service = StandardProvisionerService::from_config(&config);

    let name = descriptor.name.clone();
    service
        .delete(DeleteRequest::new(descriptor))
        .await
        .with_context(|| format!("Failed to delete volume '{}'", name))?;

    match &config.spec.delete_policy {
        DeletePolicy::Retain => println!(
            "{}",
            format!("✓ Volume {} released, data retained", name).green()
        ),
        DeletePolicy::Archive { prefix } => println!(
            "{}",
            format!("✓ Volume {} released, data archived with prefix '{}'", name, prefix).green()
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ProvisionArgs,
    }

    #[test]
    fn test_provision_args_defaults() {
        let cli = TestCli::parse_from(["test", "pvc-1", "--owner", "alice"]);

        assert_eq!(cli.args.capacity.as_str(), "1Gi");
        assert_eq!(cli.args.access_modes, vec![AccessMode::ReadWriteMany]);
        assert_eq!(cli.args.output, OutputFormat::Yaml);
        assert!(cli.args.save.is_none());
    }

    #[test]
    fn test_build_request_sets_owner_annotation() {
        let cli = TestCli::parse_from([
            "test",
            "pvc-1",
            "--owner",
            "alice",
            "--capacity",
            "5Gi",
            "--access-mode",
            "RWO",
            "--access-mode",
            "ROX",
        ]);
        let config = ProvisionerConfig::default();

        let request = build_request(&cli.args, &config);

        assert_eq!(request.owner(&config.spec.owner_annotation), Some("alice"));
        assert_eq!(request.capacity.bytes(), 5 * 1024 * 1024 * 1024);
        assert_eq!(
            request.access_modes,
            vec![AccessMode::ReadWriteOnce, AccessMode::ReadOnlyMany]
        );
    }

    #[tokio::test]
    async fn test_provision_validates_the_given_config() {
        let cli = TestCli::parse_from(["test", "pvc-1", "--owner", "alice"]);
        let mut config = ProvisionerConfig::default();
        config.spec.data_directory = PathBuf::from("relative/data");

        let err = provision(cli.args, config).await.unwrap_err();

        assert!(format!("{:#}", err).contains("spec.data_directory"));
        assert!(!PathBuf::from("relative/data").exists());
    }

    #[test]
    fn test_invalid_capacity_rejected() {
        assert!(TestCli::try_parse_from(["test", "pvc-1", "--owner", "alice", "--capacity", "lots"]).is_err());
    }
}
