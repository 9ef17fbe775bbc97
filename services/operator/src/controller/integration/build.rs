use async_trait::async_trait;
use kforge_api::{
    Build, BuildPhase, ConditionStatus, ConditionType, HasConditions, Integration,
    IntegrationPhase, ObjectKey, Resource,
};
use tracing::{info, warn};

use super::fail;
use crate::admission::{new_build, submit_build};
use crate::context::Context;
use crate::controller::reason;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;
use crate::expander::Target;

/// Builds a self-built integration directly, without a kit.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildAction;

#[async_trait]
impl Action<Integration> for BuildAction {
    fn name(&self) -> &'static str {
        "build"
    }

    async fn handle(
        &self,
        ctx: &Context,
        it: &Integration,
    ) -> Result<Outcome<Integration>, ReconcileError> {
        match it.status.phase {
            IntegrationPhase::BuildSubmitted => submit(ctx, it).await,
            IntegrationPhase::BuildRunning => observe(ctx, it).await,
            _ => Ok(Outcome::Unchanged),
        }
    }
}

async fn submit(ctx: &Context, it: &Integration) -> Result<Outcome<Integration>, ReconcileError> {
    let key = ObjectKey::new(it.namespace(), it.build_name());
    if let Some(existing) = ctx.store.get::<Build>(&key).await? {
        if existing.status.phase == BuildPhase::Running {
            info!(build = %key, "previous build still running, waiting");
            return Ok(Outcome::Unchanged);
        }
    }

    let Some(platform) = ctx.platform_for(it.namespace()).await? else {
        let mut target = it.clone();
        target.status.phase = IntegrationPhase::WaitingForPlatform;
        return Ok(Outcome::Updated(target));
    };
    let env = ctx.expander.apply(Target::Integration(it), &platform)?;
    let build = new_build(&key.name, Integration::KIND, &it.meta, &env, &platform);
    submit_build(ctx, &build).await?;

    let mut target = it.clone();
    target.status.phase = IntegrationPhase::BuildRunning;
    Ok(Outcome::Updated(target))
}

async fn observe(ctx: &Context, it: &Integration) -> Result<Outcome<Integration>, ReconcileError> {
    let now = ctx.now();
    let mut target = it.clone();
    let key = ObjectKey::new(it.namespace(), it.build_name());

    let Some(build) = ctx.store.get::<Build>(&key).await? else {
        warn!(build = %key, "build vanished, resubmitting");
        target.status.phase = IntegrationPhase::BuildSubmitted;
        return Ok(Outcome::Updated(target));
    };

    let phase = build.status.phase;
    match phase {
        BuildPhase::Succeeded => {
            target.status.image = build.status.pinned_image();
            target.status.runnable = build.status.runnable()?.map(|a| a.target.clone());
            target.status.phase = if it.dont_run_after_build() {
                IntegrationPhase::BuildComplete
            } else {
                IntegrationPhase::Deploying
            };
            info!(image = ?target.status.image, "build succeeded");
        }
        BuildPhase::Failed if build.status.failure.as_ref().is_some_and(|f| f.can_retry()) => {
            // The build controller retries it.
            set_building(&mut target, phase, now);
        }
        BuildPhase::Failed | BuildPhase::Error | BuildPhase::Interrupted => {
            let message = build
                .status
                .failure
                .as_ref()
                .map(|f| f.reason.clone())
                .unwrap_or_else(|| format!("build {}", phase.as_str().to_lowercase()));
            warn!(build = %key, %phase, reason = %message, "build did not succeed");
            fail(&mut target, &format!("Build{phase}"), message, now);
            target.status.failure = build.status.failure.clone().or(target.status.failure);
        }
        _ => set_building(&mut target, phase, now),
    }

    Ok(Outcome::Updated(target))
}

fn set_building(target: &mut Integration, phase: BuildPhase, now: chrono::DateTime<chrono::Utc>) {
    target.status.set_condition(
        ConditionType::Ready,
        ConditionStatus::False,
        reason::BUILDING,
        format!("build is {phase}"),
        now,
    );
}
