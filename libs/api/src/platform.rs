//! Integration platform: namespace-wide build defaults.
//!
//! The operator only reads platforms; creating and warming them is left to
//! other tooling.

use serde::{Deserialize, Serialize};

use crate::macros::define_phase;
use crate::meta::impl_resource;
use crate::{ObjectMeta, Phased};

define_phase! {
    PlatformPhase {
        #[default]
        None => "",
        Creating => "Creating",
        Warming => "Warming",
        Ready => "Ready",
        Error => "Error",
        Duplicate => "Duplicate",
    }
}

/// Where the build runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStrategy {
    /// In-process routine.
    #[default]
    Routine,
    /// Dedicated builder pod; needs the builder service account.
    Pod,
}

/// How the scheduler admits concurrent builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStrategy {
    /// At most one build running per namespace.
    #[default]
    Sequential,
    /// Builds start in creation order.
    Fifo,
    /// Builds wait for builds whose dependencies they can reuse.
    Dependencies,
}

/// Image publishing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStrategy {
    #[default]
    Jib,
    Spectrum,
    S2i,
}

impl PublishStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStrategy::Jib => "jib",
            PublishStrategy::Spectrum => "spectrum",
            PublishStrategy::S2i => "s2i",
        }
    }

    /// Whether the strategy needs the builder service account.
    pub fn needs_builder_account(&self) -> bool {
        matches!(self, PublishStrategy::S2i)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySpec {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default)]
    pub insecure: bool,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_running_builds() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformBuildSpec {
    #[serde(default)]
    pub build_strategy: BuildStrategy,
    #[serde(default)]
    pub order_strategy: OrderStrategy,
    #[serde(default)]
    pub publish_strategy: PublishStrategy,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_running_builds")]
    pub max_running_builds: u32,
    #[serde(default)]
    pub registry: RegistrySpec,
    #[serde(default)]
    pub base_image: String,
    #[serde(default)]
    pub runtime_version: String,
    #[serde(default)]
    pub runtime_provider: String,
    /// Retries allowed for failed builds before giving up.
    #[serde(default)]
    pub max_build_attempts: u32,
}

impl Default for PlatformBuildSpec {
    fn default() -> Self {
        Self {
            build_strategy: BuildStrategy::default(),
            order_strategy: OrderStrategy::default(),
            publish_strategy: PublishStrategy::default(),
            timeout_secs: default_timeout_secs(),
            max_running_builds: default_max_running_builds(),
            registry: RegistrySpec::default(),
            base_image: String::new(),
            runtime_version: String::new(),
            runtime_provider: String::new(),
            max_build_attempts: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSpec {
    #[serde(default)]
    pub build: PlatformBuildSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStatus {
    #[serde(default)]
    pub phase: PlatformPhase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationPlatform {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: PlatformSpec,
    #[serde(default)]
    pub status: PlatformStatus,
}

impl_resource!(IntegrationPlatform, "IntegrationPlatform");

impl IntegrationPlatform {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, name),
            spec: PlatformSpec::default(),
            status: PlatformStatus::default(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status.phase == PlatformPhase::Ready
    }

    pub fn build(&self) -> &PlatformBuildSpec {
        &self.spec.build
    }
}

impl Phased for IntegrationPlatform {
    type Phase = PlatformPhase;

    fn phase(&self) -> PlatformPhase {
        self.status.phase
    }

    fn set_phase(&mut self, phase: PlatformPhase) {
        self.status.phase = phase;
    }
}
