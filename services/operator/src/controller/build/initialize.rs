use async_trait::async_trait;
use kforge_api::{Build, BuildPhase, ConditionStatus, ConditionType, HasConditions, Resource};

use crate::context::Context;
use crate::controller::reason;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;

#[derive(Debug, Clone, Copy, Default)]
pub struct InitializeBuild;

#[async_trait]
impl Action<Build> for InitializeBuild {
    fn name(&self) -> &'static str {
        "initialize"
    }

    async fn handle(&self, ctx: &Context, build: &Build) -> Result<Outcome<Build>, ReconcileError> {
        let now = ctx.now();
        let mut target = build.clone();

        match ctx.platform_for(build.namespace()).await? {
            Some(platform) => {
                target.status.set_condition(
                    ConditionType::PlatformAvailable,
                    ConditionStatus::True,
                    reason::PLATFORM_AVAILABLE,
                    platform.name(),
                    now,
                );
                target.status.phase = BuildPhase::Scheduling;
            }
            None => {
                target.status.set_condition(
                    ConditionType::PlatformAvailable,
                    ConditionStatus::False,
                    reason::PLATFORM_NOT_AVAILABLE,
                    "no ready platform",
                    now,
                );
                target.status.phase = BuildPhase::WaitingForPlatform;
            }
        }
        Ok(Outcome::Updated(target))
    }
}
