//! Build admission, timeout and recovery tests.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use kforge_api::{
    Build, BuildPhase, BuilderTask, ConditionStatus, ConditionType, HasConditions,
    IntegrationPlatform, ObjectKey, OrderStrategy, PlatformPhase, Task,
};
use kforge_operator::controller::build::BUILD_TIMEOUT;
use kforge_operator::{Context, Controllers, TickOutcome};
use kforge_reconcile::{Clock, ManualClock};
use rstest::rstest;

const NS: &str = "apps";

struct Harness {
    ctx: Context,
    controllers: Controllers,
    clock: Arc<ManualClock>,
}

impl Harness {
    async fn new(order: OrderStrategy, max_running: u32) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap(),
        ));
        let ctx = Context::in_memory(clock.clone(), "kforge-system");

        let mut platform = IntegrationPlatform::new(NS, "kforge");
        platform.status.phase = PlatformPhase::Ready;
        platform.spec.build.order_strategy = order;
        platform.spec.build.max_running_builds = max_running;
        platform.spec.build.timeout_secs = 60;
        ctx.store.create(&platform).await.unwrap();

        Self {
            ctx,
            controllers: Controllers::new().unwrap(),
            clock,
        }
    }

    /// Stores a scheduling build; creation order follows call order.
    async fn scheduling(&self, name: &str, deps: &[&str]) -> ObjectKey {
        let mut build = Build::new(NS, name);
        build.spec.tasks = vec![Task::Builder(BuilderTask {
            name: "builder".into(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        })];
        build.spec.timeout_secs = Some(60);
        build.status.phase = BuildPhase::Scheduling;
        self.ctx.store.create(&build).await.unwrap();
        self.clock.advance(Duration::seconds(1));
        ObjectKey::new(NS, name)
    }

    async fn tick(&self, key: &ObjectKey) -> TickOutcome<BuildPhase> {
        self.controllers.builds.tick(&self.ctx, key).await.unwrap()
    }

    async fn build(&self, key: &ObjectKey) -> Build {
        self.ctx.store.require(key).await.unwrap()
    }

    async fn set_phase(&self, key: &ObjectKey, phase: BuildPhase) {
        let mut build = self.build(key).await;
        build.status.phase = phase;
        self.ctx.store.update(&build).await.unwrap();
    }
}

#[tokio::test]
async fn test_identical_builds_run_one_after_the_other() {
    let h = Harness::new(OrderStrategy::Dependencies, 3).await;
    let first = h.scheduling("first", &["a", "b", "c"]).await;
    let second = h.scheduling("second", &["a", "b", "c"]).await;

    // The later build waits for the earlier identical one.
    h.tick(&second).await;
    let waiting = h.build(&second).await;
    assert_eq!(waiting.status.phase, BuildPhase::Scheduling);
    let scheduled = waiting
        .status
        .condition(ConditionType::BuildScheduled)
        .unwrap();
    assert_eq!(scheduled.status, ConditionStatus::False);
    assert!(scheduled.message.contains("first"));

    // The earlier one does not wait for the later.
    assert_eq!(
        h.tick(&first).await,
        TickOutcome::Written {
            from: BuildPhase::Scheduling,
            to: BuildPhase::Pending,
        }
    );

    h.tick(&second).await;
    assert_eq!(h.build(&second).await.status.phase, BuildPhase::Scheduling);

    h.set_phase(&first, BuildPhase::Succeeded).await;
    h.tick(&second).await;
    assert_eq!(h.build(&second).await.status.phase, BuildPhase::Pending);
}

#[tokio::test]
async fn test_partial_overlap_never_waits_both_ways() {
    let h = Harness::new(OrderStrategy::Dependencies, 3).await;
    let left = h.scheduling("left", &["a", "b", "c", "d"]).await;
    let right = h.scheduling("right", &["a", "b", "c", "e"]).await;

    h.tick(&left).await;
    h.tick(&right).await;

    let admitted = [h.build(&left).await, h.build(&right).await]
        .iter()
        .filter(|b| b.status.phase == BuildPhase::Pending)
        .count();
    assert!(admitted >= 1);
}

#[tokio::test]
async fn test_subset_build_is_waited_for() {
    let h = Harness::new(OrderStrategy::Dependencies, 3).await;
    let small = h.scheduling("small", &["a", "b", "c"]).await;
    let large = h.scheduling("large", &["a", "b", "c", "d"]).await;

    h.tick(&large).await;
    assert_eq!(h.build(&large).await.status.phase, BuildPhase::Scheduling);

    h.tick(&small).await;
    assert_eq!(h.build(&small).await.status.phase, BuildPhase::Pending);
}

#[tokio::test]
async fn test_dissimilar_builds_run_in_parallel() {
    let h = Harness::new(OrderStrategy::Dependencies, 3).await;
    let one = h.scheduling("one", &["a", "b"]).await;
    let two = h.scheduling("two", &["x", "y"]).await;

    h.tick(&one).await;
    h.tick(&two).await;
    assert_eq!(h.build(&one).await.status.phase, BuildPhase::Pending);
    assert_eq!(h.build(&two).await.status.phase, BuildPhase::Pending);
}

#[rstest]
#[case::sequential(OrderStrategy::Sequential, 3, BuildPhase::Scheduling)]
#[case::fifo(OrderStrategy::Fifo, 3, BuildPhase::Pending)]
#[case::limit(OrderStrategy::Fifo, 1, BuildPhase::Scheduling)]
#[tokio::test]
async fn test_order_strategies(
    #[case] order: OrderStrategy,
    #[case] max_running: u32,
    #[case] expected: BuildPhase,
) {
    let h = Harness::new(order, max_running).await;
    let first = h.scheduling("first", &["a"]).await;
    let second = h.scheduling("second", &["z"]).await;

    h.tick(&first).await;
    assert_eq!(h.build(&first).await.status.phase, BuildPhase::Pending);

    h.tick(&second).await;
    assert_eq!(h.build(&second).await.status.phase, expected);
}

#[tokio::test]
async fn test_fifo_waits_for_earlier_scheduling_build() {
    let h = Harness::new(OrderStrategy::Fifo, 3).await;
    let first = h.scheduling("first", &["a"]).await;
    let second = h.scheduling("second", &["b"]).await;

    h.tick(&second).await;
    assert_eq!(h.build(&second).await.status.phase, BuildPhase::Scheduling);

    h.tick(&first).await;
    h.tick(&second).await;
    assert_eq!(h.build(&second).await.status.phase, BuildPhase::Pending);
}

#[tokio::test]
async fn test_waiting_build_is_not_rewritten() {
    let h = Harness::new(OrderStrategy::Sequential, 3).await;
    let first = h.scheduling("first", &["a"]).await;
    let second = h.scheduling("second", &["b"]).await;
    h.tick(&first).await;
    h.tick(&second).await;

    assert_eq!(
        h.tick(&second).await,
        TickOutcome::Unchanged {
            phase: BuildPhase::Scheduling
        }
    );
}

#[tokio::test]
async fn test_running_build_times_out() {
    let h = Harness::new(OrderStrategy::Sequential, 3).await;
    let key = h.scheduling("slow", &["a"]).await;
    h.tick(&key).await;
    h.set_phase(&key, BuildPhase::Running).await;

    h.clock.advance(Duration::seconds(30));
    assert_eq!(
        h.tick(&key).await,
        TickOutcome::Unchanged {
            phase: BuildPhase::Running
        }
    );

    h.clock.advance(Duration::seconds(31));
    h.tick(&key).await;
    let build = h.build(&key).await;
    assert_eq!(build.status.phase, BuildPhase::Interrupted);
    assert_eq!(build.status.failure.unwrap().reason, BUILD_TIMEOUT);
}

#[tokio::test]
async fn test_failed_build_recovers_with_backoff_then_errors() {
    let h = Harness::new(OrderStrategy::Sequential, 3).await;
    let key = h.scheduling("flaky", &["a"]).await;

    let mut build = h.build(&key).await;
    build.status.fail("compilation error", h.clock.now(), 1);
    h.ctx.store.update(&build).await.unwrap();

    // Backoff not elapsed yet.
    assert_eq!(
        h.tick(&key).await,
        TickOutcome::Unchanged {
            phase: BuildPhase::Failed
        }
    );

    h.clock.advance(Duration::seconds(6));
    h.tick(&key).await;
    let build = h.build(&key).await;
    assert_eq!(build.status.phase, BuildPhase::Initialization);
    assert_eq!(build.status.failure.as_ref().unwrap().recovery.attempt, 1);

    // Fails again with the single attempt spent.
    let mut build = build;
    build.status.fail("compilation error", h.clock.now(), 1);
    h.ctx.store.update(&build).await.unwrap();
    h.tick(&key).await;
    assert_eq!(h.build(&key).await.status.phase, BuildPhase::Error);
}
