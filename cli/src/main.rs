// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # NFS User Provisioner CLI
//!
//! Operator entry point for the per-user NFS volume provisioner. The claim
//! watching controller drives the same workflows through
//! `ProvisionerService`; this binary runs them one at a time.
//!
//! ## Commands
//!
//! - `nfs-user-provisioner provision` - Allocate and seed a volume for an owner
//! - `nfs-user-provisioner delete` - Release a volume from its saved descriptor
//! - `nfs-user-provisioner resolve` - Look up an owner's uid/gid
//! - `nfs-user-provisioner config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use nfs_user_provisioner::commands::{self, ConfigCommand, DeleteArgs, ProvisionArgs, ResolveArgs};
use provisioner_core::domain::config::LogFormat;

/// Provision per-user NFS volumes from a seed archive
#[derive(Parser)]
#[command(name = "nfs-user-provisioner")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "PROVISIONER_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config file
    #[arg(long, global = true, env = "PROVISIONER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a volume for an owner
    #[command(name = "provision")]
    Provision(ProvisionArgs),

    /// Release a provisioned volume
    #[command(name = "delete")]
    Delete(DeleteArgs),

    /// Resolve an owner's uid/gid through the configured identity source
    #[command(name = "resolve")]
    Resolve(ResolveArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load once. Discovery messages go to a bootstrap subscriber because the
    // real one depends on the loaded logging settings.
    let loaded = commands::config::load(cli.config.clone(), cli.log_level.as_deref());

    let logging = loaded
        .as_ref()
        .map(|config| config.spec.logging.clone())
        .unwrap_or_default();
    let level = cli.log_level.unwrap_or(logging.level);
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        logging.format
    };
    init_logging(&level, format)?;

    match cli.command {
        Some(Commands::Provision(args)) => commands::volume::provision(args, loaded?).await,
        Some(Commands::Delete(args)) => commands::volume::delete(args, loaded?).await,
        Some(Commands::Resolve(args)) => commands::identity::resolve(args, loaded?).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, loaded, cli.config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.compact().init(),
    }

    Ok(())
}
