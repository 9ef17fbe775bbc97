//! Build: one request to materialize dependencies into an artifact.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::macros::define_phase;
use crate::meta::impl_resource;
use crate::{
    ApiError, BuildStrategy, Conditions, HasConditions, ObjectMeta, OrderStrategy, Phased,
    PublishStrategy, SourceSpec,
};

define_phase! {
    BuildPhase {
        #[default]
        None => "",
        Initialization => "Initialization",
        WaitingForPlatform => "WaitingForPlatform",
        Scheduling => "Scheduling",
        Pending => "Pending",
        Running => "Running",
        Succeeded => "Succeeded",
        Failed => "Failed",
        Interrupted => "Interrupted",
        Error => "Error",
    }
}

impl BuildPhase {
    /// Whether the build reached a terminal phase.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            BuildPhase::Succeeded | BuildPhase::Failed | BuildPhase::Interrupted | BuildPhase::Error
        )
    }

    /// Whether the build holds builder capacity.
    pub fn is_active(&self) -> bool {
        matches!(self, BuildPhase::Pending | BuildPhase::Running)
    }

    /// Whether the build waits for admission.
    pub fn is_scheduling(&self) -> bool {
        matches!(self, BuildPhase::Scheduling | BuildPhase::Initialization)
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// Per-task build configuration, resolved from the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfiguration {
    #[serde(default)]
    pub strategy: BuildStrategy,
    #[serde(default)]
    pub order_strategy: OrderStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderTask {
    pub name: String,
    #[serde(default)]
    pub base_image: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub runtime_version: String,
    #[serde(default)]
    pub configuration: BuildConfiguration,
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTask {
    pub name: String,
    pub strategy: PublishStrategy,
    #[serde(default)]
    pub registry: String,
    /// Target image reference, without digest.
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Builder(BuilderTask),
    Publish(PublishTask),
}

impl Task {
    pub fn name(&self) -> &str {
        match self {
            Task::Builder(t) => &t.name,
            Task::Publish(t) => &t.name,
        }
    }
}

// =============================================================================
// Failure
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecovery {
    pub attempt: u32,
    pub attempt_max: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub reason: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub recovery: FailureRecovery,
}

impl Failure {
    pub fn new(reason: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            reason: reason.into(),
            time,
            recovery: FailureRecovery::default(),
        }
    }

    /// Whether another recovery attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.recovery.attempt < self.recovery.attempt_max
    }

    /// Earliest instant the next attempt may start.
    ///
    /// Backoff doubles per attempt, starting at five seconds.
    pub fn next_attempt_at(&self) -> DateTime<Utc> {
        let last = self.recovery.attempt_time.unwrap_or(self.time);
        let exp = self.recovery.attempt.min(10);
        last + Duration::seconds(5 * (1i64 << exp))
    }
}

// =============================================================================
// Build
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub location: String,
    pub target: String,
    #[serde(default)]
    pub checksum: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Retries allowed when the build fails.
    #[serde(default)]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatus {
    #[serde(default)]
    pub phase: BuildPhase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Image digest reported by the publish step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_image: Option<String>,

    #[serde(default)]
    pub artifacts: Vec<Artifact>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,

    #[serde(default)]
    pub conditions: Conditions,
}

impl HasConditions for BuildStatus {
    fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.conditions
    }
}

impl BuildStatus {
    /// Image reference pinned by digest when one is known.
    pub fn pinned_image(&self) -> Option<String> {
        let image = self.image.as_deref()?;
        match self.digest.as_deref() {
            Some(digest) if !digest.is_empty() => {
                let repo = image.rsplit_once(':').map_or(image, |(repo, tag)| {
                    // A ':' inside the registry host is a port, not a tag.
                    if tag.contains('/') {
                        image
                    } else {
                        repo
                    }
                });
                Some(format!("{repo}@{digest}"))
            }
            _ => Some(image.to_string()),
        }
    }

    /// The single runnable artifact, if any.
    pub fn runnable(&self) -> Result<Option<&Artifact>, ApiError> {
        let runnable: Vec<&Artifact> = self
            .artifacts
            .iter()
            .filter(|a| a.target.ends_with(".jar") && a.id.starts_with("app-"))
            .collect();
        match runnable.len() {
            0 => Ok(None),
            1 => Ok(Some(runnable[0])),
            n => Err(ApiError::MultipleArtifacts(n)),
        }
    }

    /// Moves the build to `Failed` with `reason`, keeping recovery counters.
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>, attempt_max: u32) {
        let recovery = self
            .failure
            .as_ref()
            .map(|f| f.recovery.clone())
            .unwrap_or(FailureRecovery {
                attempt: 0,
                attempt_max,
                attempt_time: None,
            });
        self.phase = BuildPhase::Failed;
        self.failure = Some(Failure {
            reason: reason.into(),
            time: now,
            recovery,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: BuildSpec,
    #[serde(default)]
    pub status: BuildStatus,
}

impl_resource!(Build, "Build");

impl Phased for Build {
    type Phase = BuildPhase;

    fn phase(&self) -> BuildPhase {
        self.status.phase
    }

    fn set_phase(&mut self, phase: BuildPhase) {
        self.status.phase = phase;
    }
}

impl Build {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, name),
            spec: BuildSpec::default(),
            status: BuildStatus::default(),
        }
    }

    pub fn builder_task(&self) -> Option<&BuilderTask> {
        self.spec.tasks.iter().find_map(|t| match t {
            Task::Builder(b) => Some(b),
            Task::Publish(_) => None,
        })
    }

    /// Dependency set of the builder task.
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.builder_task()
            .map(|t| t.dependencies.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Runtime version of the builder task, empty when there is none.
    pub fn runtime_version(&self) -> &str {
        self.builder_task()
            .map_or("", |t| t.runtime_version.as_str())
    }

    pub fn configuration(&self) -> BuildConfiguration {
        self.builder_task()
            .map(|t| t.configuration.clone())
            .unwrap_or_default()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.spec
            .timeout_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(Duration::seconds)
    }

    pub fn is_finished(&self) -> bool {
        self.status.phase.is_finished()
    }
}
