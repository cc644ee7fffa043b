// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Async entry point for controllers running on a tokio runtime.
//!
//! The workflows block on directory lookups and disk I/O, so each call is
//! moved to the blocking pool.

use crate::application::deprovisioning::{DeleteError, Deprovisioner};
use crate::application::provisioning::{ProvisionError, ProvisioningWorkflow};
use crate::domain::config::ProvisionerConfig;
use crate::domain::volume::{DeleteRequest, ProvisionRequest, VolumeDescriptor};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ProvisionerService: Send + Sync {
    async fn provision(&self, request: ProvisionRequest) -> Result<VolumeDescriptor, ProvisionError>;

    async fn delete(&self, request: DeleteRequest) -> Result<(), DeleteError>;
}

pub struct StandardProvisionerService {
    workflow: Arc<ProvisioningWorkflow>,
    deprovisioner: Arc<Deprovisioner>,
}

impl StandardProvisionerService {
    pub fn new(workflow: Arc<ProvisioningWorkflow>, deprovisioner: Arc<Deprovisioner>) -> Self {
        Self {
            workflow,
            deprovisioner,
        }
    }

    pub fn from_config(config: &ProvisionerConfig) -> Self {
        Self::new(
            Arc::new(ProvisioningWorkflow::from_config(config)),
            Arc::new(Deprovisioner::new(&config.spec)),
        )
    }
}

#[async_trait]
impl ProvisionerService for StandardProvisionerService {
    async fn provision(&self, request: ProvisionRequest) -> Result<VolumeDescriptor, ProvisionError> {
        let workflow = self.workflow.clone();
        tokio::task::spawn_blocking(move || workflow.provision(&request))
            .await
            .map_err(|e| ProvisionError::Worker(e.to_string()))?
    }

    async fn delete(&self, request: DeleteRequest) -> Result<(), DeleteError> {
        let deprovisioner = self.deprovisioner.clone();
        tokio::task::spawn_blocking(move || deprovisioner.delete(&request))
            .await
            .map_err(|e| DeleteError::Worker(e.to_string()))?
    }
}
