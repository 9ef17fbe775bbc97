//! Workload materialization collaborator.

use std::collections::BTreeSet;

use async_trait::async_trait;
use kforge_api::{Integration, ObjectKey, Resource};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkloadError {
    #[error("workload backend unavailable: {0}")]
    Unavailable(String),
}

/// Observed state of a deployed integration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadStatus {
    pub deployed: bool,
    pub replicas: u32,
    pub ready_replicas: u32,
    /// Set when the workload failed irrecoverably.
    pub failure: Option<String>,
}

impl WorkloadStatus {
    pub fn is_healthy(&self) -> bool {
        self.deployed && self.failure.is_none() && self.ready_replicas >= self.replicas
    }
}

#[async_trait]
pub trait Workloads: Send + Sync {
    /// Materializes (or refreshes) the integration's workload.
    async fn deploy(&self, integration: &Integration) -> Result<(), WorkloadError>;

    async fn observe(&self, integration: &Integration) -> Result<WorkloadStatus, WorkloadError>;
}

/// Records deployments and reports every deployed integration as ready.
#[derive(Debug, Default)]
pub struct NoopWorkloads {
    deployed: Mutex<BTreeSet<ObjectKey>>,
}

impl NoopWorkloads {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn deployments(&self) -> usize {
        self.deployed.lock().await.len()
    }
}

#[async_trait]
impl Workloads for NoopWorkloads {
    async fn deploy(&self, integration: &Integration) -> Result<(), WorkloadError> {
        self.deployed.lock().await.insert(integration.key());
        Ok(())
    }

    async fn observe(&self, integration: &Integration) -> Result<WorkloadStatus, WorkloadError> {
        if !self.deployed.lock().await.contains(&integration.key()) {
            return Ok(WorkloadStatus::default());
        }
        let replicas = integration.spec.replicas.unwrap_or(1);
        Ok(WorkloadStatus {
            deployed: true,
            replicas,
            ready_replicas: replicas,
            failure: None,
        })
    }
}
