// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Provisioning vocabulary shared by the application and
//!   infrastructure layers

pub mod volume;
pub mod identity;
pub mod allocation;
pub mod archive;
pub mod config;
pub mod path_sanitizer;
