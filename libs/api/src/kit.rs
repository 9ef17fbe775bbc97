//! IntegrationKit: a reusable build artifact.

use std::fmt;

use kforge_reconcile::Digest;
use serde::{Deserialize, Serialize};

use crate::macros::define_phase;
use crate::meta::impl_resource;
use crate::{
    labels, ApiError, Artifact, Conditions, Failure, HasConditions, ObjectMeta, Phased,
    SourceSpec, Traits,
};

define_phase! {
    KitPhase {
        #[default]
        None => "",
        Initialization => "Initialization",
        WaitingForPlatform => "WaitingForPlatform",
        BuildSubmitted => "BuildSubmitted",
        BuildRunning => "BuildRunning",
        Ready => "Ready",
        Error => "Error",
    }
}

impl KitPhase {
    /// Whether the kit is on its way to `Ready`.
    pub fn is_building(&self) -> bool {
        matches!(
            self,
            KitPhase::Initialization
                | KitPhase::WaitingForPlatform
                | KitPhase::BuildSubmitted
                | KitPhase::BuildRunning
        )
    }
}

/// Governs whether a kit may be picked automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KitType {
    /// Created by the operator; reusable.
    Platform,
    /// Authored by a user; only used when referenced explicitly.
    User,
    /// Pre-built image registered from outside; reusable.
    External,
}

impl KitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KitType::Platform => "platform",
            KitType::User => "user",
            KitType::External => "external",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "platform" => Some(KitType::Platform),
            "user" => Some(KitType::User),
            "external" => Some(KitType::External),
            _ => None,
        }
    }

    pub fn is_reusable(&self) -> bool {
        matches!(self, KitType::Platform | KitType::External)
    }
}

impl fmt::Display for KitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitSpec {
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub traits: Traits,
    /// Only set for kits built ahead of time from sources.
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    /// Pre-built image of an external kit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitStatus {
    #[serde(default)]
    pub phase: KitPhase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_image: Option<String>,

    #[serde(default)]
    pub artifacts: Vec<Artifact>,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub runtime_version: String,

    #[serde(default)]
    pub runtime_provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,

    #[serde(default)]
    pub conditions: Conditions,
}

impl HasConditions for KitStatus {
    fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.conditions
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationKit {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: KitSpec,
    #[serde(default)]
    pub status: KitStatus,
}

impl_resource!(IntegrationKit, "IntegrationKit");

impl Phased for IntegrationKit {
    type Phase = KitPhase;

    fn phase(&self) -> KitPhase {
        self.status.phase
    }

    fn set_phase(&mut self, phase: KitPhase) {
        self.status.phase = phase;
    }
}

impl IntegrationKit {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, kind: KitType) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, name).with_label(labels::KIT_TYPE, kind.as_str()),
            spec: KitSpec::default(),
            status: KitStatus::default(),
        }
    }

    /// Kit type from its label. Unlabelled kits are treated as user kits.
    pub fn kit_type(&self) -> KitType {
        self.meta
            .label(labels::KIT_TYPE)
            .and_then(KitType::parse)
            .unwrap_or(KitType::User)
    }

    /// Declared build priority; zero when unset.
    pub fn priority(&self) -> Result<i64, ApiError> {
        match self.meta.label(labels::KIT_PRIORITY) {
            None => Ok(0),
            Some(value) => value.parse().map_err(|_| ApiError::InvalidLabel {
                label: labels::KIT_PRIORITY,
                value: value.to_string(),
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status.phase == KitPhase::Ready
    }

    /// Name of the Build producing this kit.
    pub fn build_name(&self) -> String {
        self.meta.name.clone()
    }
}
