//! Integration: the unit of work driven to a running workload.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kforge_reconcile::Digest;
use serde::{Deserialize, Serialize};

use crate::macros::define_phase;
use crate::meta::impl_resource;
use crate::{labels, Conditions, Failure, HasConditions, ObjectKey, ObjectMeta, Phased};

define_phase! {
    IntegrationPhase {
        #[default]
        None => "",
        WaitingForPlatform => "WaitingForPlatform",
        Initialization => "Initialization",
        BuildingKit => "BuildingKit",
        BuildSubmitted => "BuildSubmitted",
        BuildRunning => "BuildRunning",
        BuildComplete => "BuildComplete",
        Deploying => "Deploying",
        Running => "Running",
        Error => "Error",
        Deleting => "Deleting",
    }
}

// =============================================================================
// Spec
// =============================================================================

/// A named source snippet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl SourceSpec {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            language: None,
        }
    }
}

/// Configuration of a single trait, keyed by property.
pub type TraitConfig = BTreeMap<String, serde_json::Value>;

/// Trait configurations keyed by trait id.
pub type Traits = BTreeMap<String, TraitConfig>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationKind {
    Property,
    Env,
    ConfigMap,
    Secret,
}

/// A free-form configuration entry. Entries form a set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfigurationEntry {
    #[serde(rename = "type")]
    pub kind: ConfigurationKind,
    pub value: String,
}

/// Git repository an integration is built from directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,

    #[serde(default)]
    pub sources: Vec<SourceSpec>,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub traits: Traits,

    #[serde(default)]
    pub configuration: Vec<ConfigurationEntry>,

    /// User-selected kit; bypasses kit matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_kit: Option<ObjectKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSource>,
}

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationStatus {
    #[serde(default)]
    pub phase: IntegrationPhase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_kit: Option<ObjectKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Runnable artifact inside the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runnable: Option<String>,

    /// Resolved dependencies (spec dependencies plus trait contributions).
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub runtime_version: String,

    #[serde(default)]
    pub runtime_provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,

    #[serde(default)]
    pub conditions: Conditions,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialization_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_timestamp: Option<DateTime<Utc>>,
}

impl HasConditions for IntegrationStatus {
    fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.conditions
    }
}

// =============================================================================
// Integration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: IntegrationSpec,
    #[serde(default)]
    pub status: IntegrationStatus,
}

impl_resource!(Integration, "Integration");

impl Phased for Integration {
    type Phase = IntegrationPhase;

    fn phase(&self) -> IntegrationPhase {
        self.status.phase
    }

    fn set_phase(&mut self, phase: IntegrationPhase) {
        self.status.phase = phase;
    }
}

impl Integration {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, name),
            spec: IntegrationSpec::default(),
            status: IntegrationStatus::default(),
        }
    }

    /// Whether the integration builds its own image instead of using a kit.
    pub fn is_self_built(&self) -> bool {
        self.spec.git.is_some()
    }

    /// Whether the integration should stop once its own build completes.
    pub fn dont_run_after_build(&self) -> bool {
        self.meta.annotation(labels::DONT_RUN_AFTER_BUILD) == Some("true")
    }

    /// Name of the Build that builds this integration directly.
    pub fn build_name(&self) -> String {
        self.meta.name.clone()
    }

    pub fn is_being_deleted(&self) -> bool {
        self.meta.deletion_timestamp.is_some()
    }

    /// Resets build linkage so the integration is rebuilt from scratch.
    ///
    /// Platform availability and timestamps are kept.
    pub fn reset_for_rebuild(&mut self) {
        let status = &mut self.status;
        status.phase = IntegrationPhase::Initialization;
        status.integration_kit = None;
        status.image = None;
        status.runnable = None;
        status.failure = None;
        status.conditions = status
            .conditions
            .without(crate::ConditionType::KitAvailable)
            .without(crate::ConditionType::DeploymentAvailable)
            .without(crate::ConditionType::Ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConditionStatus, ConditionType, Phase};

    #[test]
    fn phases_serialize_by_wire_name() {
        let json = serde_json::to_string(&IntegrationPhase::BuildingKit).unwrap();
        assert_eq!(json, "\"BuildingKit\"");
        let none: IntegrationPhase = serde_json::from_str("\"\"").unwrap();
        assert_eq!(none, IntegrationPhase::None);
        assert_eq!(IntegrationPhase::None.to_string(), "None");
        assert_eq!(<IntegrationPhase as Phase>::ALL.len(), 11);
    }

    #[test]
    fn reset_clears_build_linkage() {
        let now = chrono::Utc::now();
        let mut it = Integration::new("ns", "it");
        it.status.phase = IntegrationPhase::Running;
        it.status.integration_kit = Some(ObjectKey::new("ns", "kit-1"));
        it.status.image = Some("img@sha".into());
        it.status.initialization_timestamp = Some(now);
        it.status
            .set_condition(ConditionType::PlatformAvailable, ConditionStatus::True, "Ok", "", now);
        it.status
            .set_condition(ConditionType::Ready, ConditionStatus::True, "Up", "", now);

        it.reset_for_rebuild();

        assert_eq!(it.status.phase, IntegrationPhase::Initialization);
        assert!(it.status.integration_kit.is_none());
        assert!(it.status.image.is_none());
        assert_eq!(it.status.initialization_timestamp, Some(now));
        assert!(it.status.conditions.is_true(ConditionType::PlatformAvailable));
        assert!(it.status.condition(ConditionType::Ready).is_none());
    }

    #[test]
    fn dont_run_after_build_reads_annotation() {
        let mut it = Integration::new("ns", "it");
        assert!(!it.dont_run_after_build());
        it.meta = it.meta.with_annotation(labels::DONT_RUN_AFTER_BUILD, "true");
        assert!(it.dont_run_after_build());
    }
}
