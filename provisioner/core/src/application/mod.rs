// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod provisioning;
pub mod deprovisioning;
pub mod service;

// Re-export use cases for convenience
pub use provisioning::{ProvisioningWorkflow, ProvisionError};
pub use deprovisioning::{Deprovisioner, DeleteError};
pub use service::{ProvisionerService, StandardProvisionerService};
