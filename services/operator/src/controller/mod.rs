//! Controllers: one phase table per reconciled kind.

pub mod build;
pub mod integration;
pub mod kit;

use kforge_api::{Build, Integration, IntegrationKit};

use crate::dispatch::Dispatcher;
use crate::error::DispatchError;

/// The three dispatchers of the operator.
#[derive(Debug)]
pub struct Controllers {
    pub integrations: Dispatcher<Integration>,
    pub kits: Dispatcher<IntegrationKit>,
    pub builds: Dispatcher<Build>,
}

impl Controllers {
    /// Builds and validates every phase table.
    pub fn new() -> Result<Self, DispatchError> {
        Ok(Self {
            integrations: integration::dispatcher()?,
            kits: kit::dispatcher()?,
            builds: build::dispatcher()?,
        })
    }
}

// Condition reasons shared by the controllers.
pub(crate) mod reason {
    pub const PLATFORM_AVAILABLE: &str = "IntegrationPlatformAvailable";
    pub const PLATFORM_NOT_AVAILABLE: &str = "IntegrationPlatformNotAvailable";
    pub const INITIALIZATION_FAILED: &str = "InitializationFailed";
    pub const KIT_AVAILABLE: &str = "IntegrationKitAvailable";
    pub const KIT_NOT_READY: &str = "IntegrationKitNotReady";
    pub const KIT_OUTDATED: &str = "IntegrationKitOutdated";
    pub const KIT_ERROR: &str = "IntegrationKitError";
    pub const BUILDING: &str = "Building";
    pub const DEPLOYMENT_AVAILABLE: &str = "DeploymentAvailable";
    pub const DEPLOYMENT_READY: &str = "DeploymentReady";
    pub const DEPLOYMENT_PROGRESSING: &str = "DeploymentProgressing";
    pub const WORKLOAD_FAILED: &str = "WorkloadFailed";
    pub const BUILD_ADMITTED: &str = "BuildAdmitted";
    pub const BUILD_WAITING: &str = "BuildWaiting";
}
