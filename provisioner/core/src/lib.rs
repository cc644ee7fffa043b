// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! NFS User-Volume Provisioner Core
//!
//! Materializes one directory tree per owner on a shared NFS export and
//! describes it as a mountable volume for the cluster orchestrator.
//!
//! # Architecture
//!
//! - **Domain:** volume request/descriptor types, identities, backing
//!   allocations, configuration manifest and the resolver/extractor traits
//! - **Application:** provisioning workflow, deprovisioner and the async
//!   service facade used by controllers
//! - **Infrastructure:** LDAP and static identity resolvers, tar.gz extractor

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
