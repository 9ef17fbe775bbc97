//! End-to-end integration lifecycle tests.
//!
//! Every test drives the controllers tick by tick over an in-memory store
//! and plays the role of the external builder where a build must progress.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use kforge_api::{
    Build, BuildPhase, ConditionStatus, ConditionType, GitSource, HasConditions, Integration,
    IntegrationKit, IntegrationPhase, IntegrationPlatform, KitPhase, KitType, ObjectKey,
    PlatformPhase, Resource, ServiceAccount,
};
use kforge_operator::digest::compute_digest;
use kforge_operator::store::LabelSelector;
use kforge_operator::workloads::{WorkloadError, WorkloadStatus, Workloads};
use kforge_operator::{Context, Controllers, TickOutcome};
use kforge_reconcile::{Clock, Digest, ManualClock};

const OPERATOR_NS: &str = "kforge-system";
const NS: &str = "apps";

struct Harness {
    ctx: Context,
    controllers: Controllers,
    clock: Arc<ManualClock>,
}

impl Harness {
    async fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let ctx = Context::in_memory(clock.clone(), OPERATOR_NS);

        let mut platform = IntegrationPlatform::new(OPERATOR_NS, "kforge");
        platform.status.phase = PlatformPhase::Ready;
        platform.spec.build.registry.address = "registry.local:5000".to_string();
        ctx.store.create(&platform).await.unwrap();

        Self {
            ctx,
            controllers: Controllers::new().unwrap(),
            clock,
        }
    }

    async fn integration(&self, name: &str) -> Integration {
        self.ctx
            .store
            .require(&ObjectKey::new(NS, name))
            .await
            .unwrap()
    }

    async fn tick_integration(&self, name: &str) -> TickOutcome<IntegrationPhase> {
        self.controllers
            .integrations
            .tick(&self.ctx, &ObjectKey::new(NS, name))
            .await
            .unwrap()
    }

    /// Ticks until the integration stops changing.
    async fn settle_integration(&self, name: &str) -> IntegrationPhase {
        for _ in 0..10 {
            if !self.tick_integration(name).await.is_write() {
                break;
            }
        }
        self.integration(name).await.status.phase
    }

    async fn settle_kit(&self, key: &ObjectKey) -> KitPhase {
        for _ in 0..10 {
            let outcome = self.controllers.kits.tick(&self.ctx, key).await.unwrap();
            if !outcome.is_write() {
                break;
            }
        }
        let kit: IntegrationKit = self.ctx.store.require(key).await.unwrap();
        kit.status.phase
    }

    async fn settle_build(&self, key: &ObjectKey) -> BuildPhase {
        for _ in 0..10 {
            let outcome = self.controllers.builds.tick(&self.ctx, key).await.unwrap();
            if !outcome.is_write() {
                break;
            }
        }
        let build: Build = self.ctx.store.require(key).await.unwrap();
        build.status.phase
    }

    /// Reports a build result the way an external builder would.
    async fn complete_build(&self, key: &ObjectKey, image: &str, digest: &str) {
        let mut build: Build = self.ctx.store.require(key).await.unwrap();
        build.status.phase = BuildPhase::Succeeded;
        build.status.image = Some(image.to_string());
        build.status.digest = Some(digest.to_string());
        self.ctx.store.update(&build).await.unwrap();
    }

    async fn fail_build(&self, key: &ObjectKey, reason: &str) {
        let mut build: Build = self.ctx.store.require(key).await.unwrap();
        build.status.fail(reason, self.clock.now(), 0);
        self.ctx.store.update(&build).await.unwrap();
    }

    async fn builds(&self) -> Vec<Build> {
        self.ctx
            .store
            .list(Some(NS), &LabelSelector::all())
            .await
            .unwrap()
    }

    async fn kits(&self) -> Vec<IntegrationKit> {
        self.ctx
            .store
            .list(Some(NS), &LabelSelector::all())
            .await
            .unwrap()
    }
}

fn self_built(name: &str) -> Integration {
    let mut it = Integration::new(NS, name);
    it.spec.git = Some(GitSource {
        url: "https://git.local/acme/orders.git".to_string(),
        branch: Some("main".to_string()),
        commit: None,
    });
    it.spec.dependencies = vec!["camel:timer".to_string(), "camel:log".to_string()];
    it
}

fn kit_built(name: &str) -> Integration {
    let mut it = Integration::new(NS, name);
    it.spec.dependencies = vec!["camel:timer".to_string(), "camel:log".to_string()];
    it
}

/// Brings a self-built integration to `BuildSubmitted`.
async fn submitted(h: &Harness, name: &str) {
    h.ctx.store.create(&self_built(name)).await.unwrap();
    h.tick_integration(name).await; // platform setup
    h.tick_integration(name).await; // initialize
    assert_eq!(
        h.integration(name).await.status.phase,
        IntegrationPhase::BuildSubmitted
    );
}

/// Brings a self-built integration to `Running` on a pinned image.
async fn running(h: &Harness, name: &str) {
    submitted(h, name).await;
    h.tick_integration(name).await;
    h.complete_build(&ObjectKey::new(NS, name), "img:tag", "abc123")
        .await;
    assert_eq!(h.settle_integration(name).await, IntegrationPhase::Running);
}

/// Reports every workload as deployed, failing while `failure` is set.
#[derive(Default)]
struct FlakyWorkloads {
    failure: Mutex<Option<String>>,
}

impl FlakyWorkloads {
    fn set_failure(&self, failure: Option<&str>) {
        *self.failure.lock().unwrap() = failure.map(str::to_string);
    }
}

#[async_trait]
impl Workloads for FlakyWorkloads {
    async fn deploy(&self, _integration: &Integration) -> Result<(), WorkloadError> {
        Ok(())
    }

    async fn observe(&self, integration: &Integration) -> Result<WorkloadStatus, WorkloadError> {
        let replicas = integration.spec.replicas.unwrap_or(1);
        Ok(WorkloadStatus {
            deployed: true,
            replicas,
            ready_replicas: replicas,
            failure: self.failure.lock().unwrap().clone(),
        })
    }
}

#[tokio::test]
async fn test_build_submitted_creates_one_owned_build() {
    let h = Harness::new().await;
    submitted(&h, "orders").await;

    let outcome = h.tick_integration("orders").await;
    assert_eq!(
        outcome,
        TickOutcome::Written {
            from: IntegrationPhase::BuildSubmitted,
            to: IntegrationPhase::BuildRunning,
        }
    );

    let builds = h.builds().await;
    assert_eq!(builds.len(), 1);
    let owner = builds[0].meta.controller_owner().unwrap();
    assert_eq!(owner.kind, Integration::KIND);
    assert_eq!(owner.name, "orders");
    assert_eq!(builds[0].status.phase, BuildPhase::Initialization);

    // Builder prerequisites exist in the namespace.
    let sa: Option<ServiceAccount> = h
        .ctx
        .store
        .get(&ObjectKey::new(NS, kforge_api::BUILDER_SERVICE_ACCOUNT))
        .await
        .unwrap();
    assert!(sa.is_some());
}

#[tokio::test]
async fn test_succeeded_build_pins_image_and_deploys() {
    let h = Harness::new().await;
    submitted(&h, "orders").await;
    h.tick_integration("orders").await;

    h.complete_build(&ObjectKey::new(NS, "orders"), "img:tag", "abc123")
        .await;
    let outcome = h.tick_integration("orders").await;
    assert_eq!(
        outcome,
        TickOutcome::Written {
            from: IntegrationPhase::BuildRunning,
            to: IntegrationPhase::Deploying,
        }
    );
    assert_eq!(
        h.integration("orders").await.status.image.as_deref(),
        Some("img@abc123")
    );

    assert_eq!(h.settle_integration("orders").await, IntegrationPhase::Running);
    let it = h.integration("orders").await;
    assert!(it.status.conditions.is_true(ConditionType::Ready));
    assert!(it.status.conditions.is_true(ConditionType::DeploymentAvailable));
}

#[tokio::test]
async fn test_failed_build_moves_integration_to_error() {
    let h = Harness::new().await;
    submitted(&h, "orders").await;
    h.tick_integration("orders").await;

    h.fail_build(&ObjectKey::new(NS, "orders"), "build failed").await;
    h.tick_integration("orders").await;

    let it = h.integration("orders").await;
    assert_eq!(it.status.phase, IntegrationPhase::Error);
    let ready = it.status.condition(ConditionType::Ready).unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.message, "build failed");
}

#[tokio::test]
async fn test_dont_run_after_build_stops_at_build_complete() {
    let h = Harness::new().await;
    let mut it = self_built("orders");
    it.meta = it
        .meta
        .with_annotation(kforge_api::labels::DONT_RUN_AFTER_BUILD, "true");
    h.ctx.store.create(&it).await.unwrap();
    h.tick_integration("orders").await;
    h.tick_integration("orders").await;
    h.tick_integration("orders").await;

    h.complete_build(&ObjectKey::new(NS, "orders"), "img:tag", "abc123")
        .await;
    assert_eq!(
        h.settle_integration("orders").await,
        IntegrationPhase::BuildComplete
    );
}

#[tokio::test]
async fn test_digest_drift_resets_running_integration() {
    let h = Harness::new().await;
    let mut it = kit_built("orders");
    it.status.phase = IntegrationPhase::Running;
    it.status.digest = Some(Digest::from_string("sha256:stale"));
    it.status.integration_kit = Some(ObjectKey::new(NS, "kit-old"));
    it.status.image = Some("registry.local:5000/apps/kit-old@sha256:1".to_string());
    h.ctx.store.create(&it).await.unwrap();

    let outcome = h.tick_integration("orders").await;
    assert_eq!(
        outcome,
        TickOutcome::Written {
            from: IntegrationPhase::Running,
            to: IntegrationPhase::Initialization,
        }
    );
    let it = h.integration("orders").await;
    assert!(it.status.integration_kit.is_none());
    assert!(it.status.image.is_none());
}

#[tokio::test]
async fn test_invalid_spec_on_running_integration_stays_in_error() {
    let h = Harness::new().await;
    running(&h, "orders").await;

    let mut it = h.integration("orders").await;
    it.spec.traits.insert("bogus".to_string(), Default::default());
    h.ctx.store.update(&it).await.unwrap();

    assert_eq!(
        h.tick_integration("orders").await,
        TickOutcome::Written {
            from: IntegrationPhase::Running,
            to: IntegrationPhase::Initialization,
        }
    );
    assert_eq!(
        h.tick_integration("orders").await,
        TickOutcome::Written {
            from: IntegrationPhase::Initialization,
            to: IntegrationPhase::Error,
        }
    );
    let it = h.integration("orders").await;
    assert_eq!(
        it.status.failure.as_ref().unwrap().reason,
        "unknown trait 'bogus'"
    );
    assert!(it.status.integration_kit.is_none());
    assert!(it.status.image.is_none());
    // The previous deployment keeps serving.
    assert!(h.ctx.workloads.observe(&it).await.unwrap().is_healthy());

    for _ in 0..2 {
        assert_eq!(
            h.tick_integration("orders").await,
            TickOutcome::Unchanged {
                phase: IntegrationPhase::Error
            }
        );
    }
    let it = h.integration("orders").await;
    assert!(it.status.failure.is_some());
    let ready = it.status.condition(ConditionType::Ready).unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, "InitializationFailed");
}

#[tokio::test]
async fn test_spec_change_moves_error_integration_to_initialization() {
    let h = Harness::new().await;
    submitted(&h, "orders").await;
    h.tick_integration("orders").await;
    h.fail_build(&ObjectKey::new(NS, "orders"), "build failed").await;
    h.tick_integration("orders").await;
    assert_eq!(h.integration("orders").await.status.phase, IntegrationPhase::Error);

    let mut it = h.integration("orders").await;
    it.spec.dependencies.push("camel:http".to_string());
    h.ctx.store.update(&it).await.unwrap();

    assert_eq!(
        h.tick_integration("orders").await,
        TickOutcome::Written {
            from: IntegrationPhase::Error,
            to: IntegrationPhase::Initialization,
        }
    );
    assert_eq!(
        h.tick_integration("orders").await,
        TickOutcome::Written {
            from: IntegrationPhase::Initialization,
            to: IntegrationPhase::BuildSubmitted,
        }
    );
    assert!(h.integration("orders").await.status.failure.is_none());
}

#[tokio::test]
async fn test_error_with_unchanged_spec_stays_in_error() {
    let h = Harness::new().await;
    let mut it = self_built("orders");
    it.status.phase = IntegrationPhase::Error;
    it.status.image = Some("img@abc123".to_string());
    it.status.digest = Some(compute_digest(&it));
    it.status.set_condition(
        ConditionType::Ready,
        ConditionStatus::False,
        "BuildFailed",
        "build failed",
        h.clock.now(),
    );
    h.ctx.store.create(&it).await.unwrap();
    // An older deployment of the same integration is healthy.
    h.ctx.workloads.deploy(&it).await.unwrap();

    let before = h.integration("orders").await;
    for _ in 0..2 {
        assert_eq!(
            h.tick_integration("orders").await,
            TickOutcome::Unchanged {
                phase: IntegrationPhase::Error
            }
        );
    }
    let after = h.integration("orders").await;
    assert_eq!(before.meta.resource_version, after.meta.resource_version);
}

#[tokio::test]
async fn test_workload_failure_recovers_when_workload_heals() {
    let mut h = Harness::new().await;
    let workloads = Arc::new(FlakyWorkloads::default());
    h.ctx = h.ctx.clone().with_workloads(workloads.clone());
    running(&h, "orders").await;

    workloads.set_failure(Some("CrashLoopBackOff"));
    assert_eq!(
        h.tick_integration("orders").await,
        TickOutcome::Written {
            from: IntegrationPhase::Running,
            to: IntegrationPhase::Error,
        }
    );
    let it = h.integration("orders").await;
    assert_eq!(
        it.status.condition(ConditionType::Ready).unwrap().reason,
        "WorkloadFailed"
    );

    workloads.set_failure(None);
    assert_eq!(
        h.tick_integration("orders").await,
        TickOutcome::Written {
            from: IntegrationPhase::Error,
            to: IntegrationPhase::Running,
        }
    );
    let it = h.integration("orders").await;
    assert!(it.status.failure.is_none());
    assert!(it.status.conditions.is_true(ConditionType::Ready));
}

#[tokio::test]
async fn test_kit_lifecycle_and_reuse() {
    let h = Harness::new().await;
    h.ctx.store.create(&kit_built("orders")).await.unwrap();

    // Platform setup, initialization, then a platform kit is created.
    h.settle_integration("orders").await;
    let it = h.integration("orders").await;
    assert_eq!(it.status.phase, IntegrationPhase::BuildingKit);
    let kit_key = it.status.integration_kit.clone().unwrap();
    assert_eq!(
        it.status.condition(ConditionType::KitAvailable).unwrap().status,
        ConditionStatus::False
    );

    assert_eq!(h.settle_kit(&kit_key).await, KitPhase::BuildRunning);
    let build_key = ObjectKey::new(NS, kit_key.name.clone());
    assert_eq!(h.settle_build(&build_key).await, BuildPhase::Pending);

    h.complete_build(&build_key, "registry.local:5000/apps/kit:latest", "sha256:feed")
        .await;
    assert_eq!(h.settle_kit(&kit_key).await, KitPhase::Ready);

    assert_eq!(h.settle_integration("orders").await, IntegrationPhase::Running);
    let it = h.integration("orders").await;
    assert_eq!(
        it.status.image.as_deref(),
        Some("registry.local:5000/apps/kit@sha256:feed")
    );

    // A second integration with the same needs reuses the Ready kit.
    h.ctx.store.create(&kit_built("billing")).await.unwrap();
    assert_eq!(h.settle_integration("billing").await, IntegrationPhase::Running);
    assert_eq!(
        h.integration("billing").await.status.integration_kit,
        Some(kit_key)
    );
    assert_eq!(h.kits().await.len(), 1);
}

#[tokio::test]
async fn test_failed_kit_build_fails_integration_and_kit_retries() {
    let h = Harness::new().await;
    h.ctx.store.create(&kit_built("orders")).await.unwrap();
    h.settle_integration("orders").await;
    let kit_key = h
        .integration("orders")
        .await
        .status
        .integration_kit
        .unwrap();
    h.settle_kit(&kit_key).await;

    let build_key = ObjectKey::new(NS, kit_key.name.clone());
    h.fail_build(&build_key, "dependency resolution failed").await;
    assert_eq!(h.settle_kit(&kit_key).await, KitPhase::Error);

    assert_eq!(h.settle_integration("orders").await, IntegrationPhase::Error);
    let it = h.integration("orders").await;
    let ready = it.status.condition(ConditionType::Ready).unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert!(ready.message.contains("dependency resolution failed"));

    // After the backoff the kit resubmits a fresh build.
    h.clock.advance(chrono::Duration::seconds(6));
    assert_eq!(h.settle_kit(&kit_key).await, KitPhase::BuildRunning);
    let kit: IntegrationKit = h.ctx.store.require(&kit_key).await.unwrap();
    assert_eq!(kit.status.failure.unwrap().recovery.attempt, 1);
    let build: Build = h.ctx.store.require(&build_key).await.unwrap();
    assert_eq!(build.status.phase, BuildPhase::Initialization);
}

#[tokio::test]
async fn test_external_kit_is_ready_without_build() {
    let h = Harness::new().await;
    let mut kit = IntegrationKit::new(NS, "prebuilt", KitType::External);
    kit.spec.image = Some("registry.local:5000/apps/prebuilt:1.0".to_string());
    h.ctx.store.create(&kit).await.unwrap();

    assert_eq!(h.settle_kit(&kit.key()).await, KitPhase::Ready);
    assert!(h.builds().await.is_empty());
}

#[tokio::test]
async fn test_second_tick_on_settled_integration_writes_nothing() {
    let h = Harness::new().await;
    submitted(&h, "orders").await;
    h.tick_integration("orders").await;
    h.complete_build(&ObjectKey::new(NS, "orders"), "img:tag", "abc123")
        .await;
    assert_eq!(h.settle_integration("orders").await, IntegrationPhase::Running);

    let before = h.integration("orders").await;
    for _ in 0..2 {
        assert_eq!(
            h.tick_integration("orders").await,
            TickOutcome::Unchanged {
                phase: IntegrationPhase::Running
            }
        );
    }
    let after = h.integration("orders").await;
    assert_eq!(before.meta.resource_version, after.meta.resource_version);
}

#[tokio::test]
async fn test_delete_collects_builds_and_is_idempotent() {
    let h = Harness::new().await;
    submitted(&h, "orders").await;
    h.tick_integration("orders").await;
    assert_eq!(h.builds().await.len(), 1);

    let key = ObjectKey::new(NS, "orders");
    assert!(h.ctx.store.delete::<Integration>(&key).await.unwrap());
    // The finalizer keeps the object around until the controller runs.
    assert!(h.integration("orders").await.is_being_deleted());

    h.tick_integration("orders").await;
    assert!(h.builds().await.is_empty());
    assert!(h.ctx.store.get::<Integration>(&key).await.unwrap().is_none());

    assert_eq!(h.tick_integration("orders").await, TickOutcome::Missing);
}

#[tokio::test]
async fn test_integration_waits_for_platform() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let ctx = Context::in_memory(clock, OPERATOR_NS);
    let controllers = Controllers::new().unwrap();
    let key = ObjectKey::new(NS, "orders");
    ctx.store.create(&kit_built("orders")).await.unwrap();

    controllers.integrations.tick(&ctx, &key).await.unwrap();
    let it: Integration = ctx.store.require(&key).await.unwrap();
    assert_eq!(it.status.phase, IntegrationPhase::WaitingForPlatform);
    assert!(!it.status.conditions.is_true(ConditionType::PlatformAvailable));

    // Still waiting: nothing to write.
    assert_eq!(
        controllers.integrations.tick(&ctx, &key).await.unwrap(),
        TickOutcome::Unchanged {
            phase: IntegrationPhase::WaitingForPlatform
        }
    );

    let mut platform = IntegrationPlatform::new(NS, "local");
    platform.status.phase = PlatformPhase::Ready;
    ctx.store.create(&platform).await.unwrap();

    controllers.integrations.tick(&ctx, &key).await.unwrap();
    let it: Integration = ctx.store.require(&key).await.unwrap();
    assert_eq!(it.status.phase, IntegrationPhase::Initialization);
    assert_eq!(it.status.platform.as_deref(), Some("local"));
}
