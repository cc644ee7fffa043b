// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Rendering and loading of volume descriptors

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::path::Path;

use provisioner_core::domain::volume::VolumeDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => serde_yaml::to_string(value).context("Failed to render YAML"),
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).context("Failed to render JSON")
        }
    }
}

/// Read a descriptor written by `provision --save`, as YAML or JSON
pub fn load_descriptor(path: &Path) -> Result<VolumeDescriptor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read descriptor {:?}", path))?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_str(&content).with_context(|| format!("Invalid descriptor {:?}", path))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid descriptor {:?}", path))
    }
}
