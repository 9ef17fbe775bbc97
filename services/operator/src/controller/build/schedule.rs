use async_trait::async_trait;
use kforge_api::{
    Build, BuildPhase, ConditionStatus, ConditionType, HasConditions, OrderStrategy, Resource,
};
use tracing::{debug, info};

use crate::admission::{active_builds, has_matching_build, has_scheduled_builds_before};
use crate::context::Context;
use crate::controller::reason;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;
use crate::store::LabelSelector;

/// Admits a scheduling build according to the platform's order strategy.
///
/// Every strategy honours the platform's `max_running_builds`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Schedule;

#[async_trait]
impl Action<Build> for Schedule {
    fn name(&self) -> &'static str {
        "schedule"
    }

    async fn handle(&self, ctx: &Context, build: &Build) -> Result<Outcome<Build>, ReconcileError> {
        let Some(platform) = ctx.platform_for(build.namespace()).await? else {
            let mut target = build.clone();
            target.status.phase = BuildPhase::WaitingForPlatform;
            return Ok(Outcome::Updated(target));
        };
        let config = platform.build();

        // Snapshot of this tick; decisions are recomputed on the next one.
        let pool: Vec<Build> = ctx
            .store
            .list(Some(build.namespace()), &LabelSelector::all())
            .await?;

        let running = active_builds(build, &pool);
        let wait_reason = if config.max_running_builds > 0
            && running >= config.max_running_builds as usize
        {
            Some(format!(
                "{running} builds running, limit is {}",
                config.max_running_builds
            ))
        } else {
            match config.order_strategy {
                OrderStrategy::Sequential if running > 0 => {
                    Some("another build is running".to_string())
                }
                OrderStrategy::Fifo if has_scheduled_builds_before(build, &pool) => {
                    Some("an earlier build is waiting".to_string())
                }
                OrderStrategy::Dependencies => has_matching_build(build, &pool)
                    .map(|b| format!("waiting for build {} with matching dependencies", b.name())),
                _ => None,
            }
        };

        let now = ctx.now();
        let mut target = build.clone();
        match wait_reason {
            Some(message) => {
                debug!(build = %build.name(), %message, "build not admitted");
                target.status.set_condition(
                    ConditionType::BuildScheduled,
                    ConditionStatus::False,
                    reason::BUILD_WAITING,
                    message,
                    now,
                );
            }
            None => {
                info!(build = %build.name(), strategy = ?config.order_strategy, "build admitted");
                target.status.set_condition(
                    ConditionType::BuildScheduled,
                    ConditionStatus::True,
                    reason::BUILD_ADMITTED,
                    "",
                    now,
                );
                target.status.started_at = Some(now);
                target.status.phase = BuildPhase::Pending;
            }
        }
        Ok(Outcome::Updated(target))
    }
}
