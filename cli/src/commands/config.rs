// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use provisioner_core::domain::config::{
    DeletePolicy, IdentityConfig, ProvisionerConfig, SeedConfig,
};

use super::output::{render, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective manifest instead of a summary
        #[arg(long, value_enum)]
        raw: Option<OutputFormat>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./provisioner-config.yaml)
        #[arg(short, long, default_value = "./provisioner-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

/// Loads the manifest once per invocation. Runs before the process-wide
/// subscriber exists, so discovery messages go to a temporary stderr one.
pub fn load(config_override: Option<PathBuf>, log_level: Option<&str>) -> Result<ProvisionerConfig> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level.unwrap_or("info")))
        .context("Failed to create log filter")?;
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::with_default(bootstrap, || {
        ProvisionerConfig::load_or_default(config_override)
    })
    .context("Failed to load configuration")
}

/// `loaded` is the invocation's manifest; an explicit `validate FILE` still
/// reads that file.
pub async fn handle_command(
    command: ConfigCommand,
    loaded: Result<ProvisionerConfig>,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, raw } => show(loaded?, config_override, paths, raw).await,
        ConfigCommand::Validate { file: Some(file) } => validate(load(Some(file), None)).await,
        ConfigCommand::Validate { file: None } => validate(loaded).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(
    config: ProvisionerConfig,
    config_override: Option<PathBuf>,
    show_paths: bool,
    raw: Option<OutputFormat>,
) -> Result<()> {

    if let Some(format) = raw {
        println!("{}", render(&config, format)?);
        return Ok(());
    }

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        for (i, path) in ProvisionerConfig::candidate_paths().iter().enumerate() {
            let marker = if path.exists() { "✓".green() } else { "-".dimmed() };
            println!("  {}. {} {}", i + 2, marker, path.display());
        }
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Provisioner:".bold());
    println!("  Name: {}", spec.provisioner_name);
    println!("  Owner annotation: {}", spec.owner_annotation);
    println!("  Data directory: {}", spec.data_directory.display());
    println!("  Layout: {:?}", spec.layout);
    println!();

    println!("{}", "Seeding:".bold());
    match &spec.seed {
        SeedConfig::Archive { path } => println!("  Archive: {}", path.display()),
        SeedConfig::Placeholders { entries } => {
            println!("  Placeholders: {}", entries.len());
            for entry in entries {
                println!(
                    "    - {} ({:?}, {:o})",
                    entry.path.display(),
                    entry.kind,
                    entry.effective_mode()
                );
            }
        }
        SeedConfig::Empty => println!("  {}", "(empty volumes)".dimmed()),
    }
    println!();

    println!("{}", "Export:".bold());
    println!("  Server: {}", spec.export.server);
    println!("  Path: {}", spec.export.path);
    println!();

    println!("{}", "Identity:".bold());
    match &spec.identity {
        Some(IdentityConfig::Ldap(ldap)) => {
            println!("  LDAP server: {}", ldap.server);
            println!("  Base DN: {}", ldap.base_dn);
            println!("  Filter attribute: {}", ldap.user_filter);
            println!("  uid / gid attributes: {} / {}", ldap.uid_attribute, ldap.gid_attribute);
        }
        Some(IdentityConfig::Static { users }) => {
            println!("  Static table: {} users", users.len());
        }
        None => println!("  {}", "(none, ownership is not changed)".dimmed()),
    }
    println!();

    println!("{}", "Delete policy:".bold());
    match &spec.delete_policy {
        DeletePolicy::Retain => println!("  Retain"),
        DeletePolicy::Archive { prefix } => println!("  Archive (prefix: {})", prefix),
    }
    println!();

    Ok(())
}

async fn validate(loaded: Result<ProvisionerConfig>) -> Result<()> {
    println!("Validating configuration...");

    let config = loaded?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = template(with_examples);

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn template(with_examples: bool) -> &'static str {
    if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid_manifests() {
        for with_examples in [false, true] {
            let config = ProvisionerConfig::from_yaml_str(template(with_examples)).unwrap();
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_example_template_covers_optional_sections() {
        let config = ProvisionerConfig::from_yaml_str(template(true)).unwrap();

        assert!(matches!(config.spec.identity, Some(IdentityConfig::Ldap(_))));
        assert!(matches!(config.spec.delete_policy, DeletePolicy::Archive { .. }));
    }

    #[test]
    fn test_load_explicit_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("provisioner-config.yaml");
        std::fs::write(&path, template(true)).unwrap();

        let config = load(Some(path), Some("warn")).unwrap();

        assert!(matches!(config.spec.identity, Some(IdentityConfig::Ldap(_))));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        assert!(load(Some(temp_dir.path().join("absent.yaml")), None).is_err());
    }

    #[tokio::test]
    async fn test_validate_checks_the_loaded_manifest() {
        let mut config = ProvisionerConfig::from_yaml_str(template(false)).unwrap();
        config.spec.provisioner_name = " ".to_string();

        let command = ConfigCommand::Validate { file: None };
        let err = handle_command(command, Ok(config), None).await.unwrap_err();

        assert!(format!("{:#}", err).contains("spec.provisioner_name"));
    }

    #[tokio::test]
    async fn test_generate_ignores_load_failure() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let output = temp_dir.path().join("provisioner-config.yaml");

        let command = ConfigCommand::Generate {
            output: output.clone(),
            examples: false,
        };
        handle_command(command, Err(anyhow::anyhow!("broken manifest")), None)
            .await
            .unwrap();

        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_generate_writes_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let output = temp_dir.path().join("provisioner-config.yaml");

        generate(output.clone(), false).await.unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert_eq!(written, template(false));
    }
}
