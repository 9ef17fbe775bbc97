use async_trait::async_trait;
use kforge_api::{Build, BuildPhase, Failure, IntegrationKit, KitPhase, ObjectKey, Resource};
use tracing::{info, warn};

use super::KIT_RECOVERY_ATTEMPTS;
use crate::admission::{new_build, submit_build};
use crate::context::Context;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;
use crate::expander::Target;

/// Submits the kit's Build and mirrors its result.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildKitImage;

#[async_trait]
impl Action<IntegrationKit> for BuildKitImage {
    fn name(&self) -> &'static str {
        "build"
    }

    async fn handle(
        &self,
        ctx: &Context,
        kit: &IntegrationKit,
    ) -> Result<Outcome<IntegrationKit>, ReconcileError> {
        let key = ObjectKey::new(kit.namespace(), kit.build_name());
        let build = ctx.store.get::<Build>(&key).await?;

        match kit.status.phase {
            KitPhase::BuildSubmitted => submit(ctx, kit, build).await,
            KitPhase::BuildRunning => Ok(observe(ctx, kit, build)),
            _ => Ok(Outcome::Unchanged),
        }
    }
}

async fn submit(
    ctx: &Context,
    kit: &IntegrationKit,
    existing: Option<Build>,
) -> Result<Outcome<IntegrationKit>, ReconcileError> {
    // A failed build still retried by the build controller is left alone.
    let resubmit = existing.as_ref().map_or(true, |b| {
        b.is_finished()
            && !(b.status.phase == BuildPhase::Failed
                && b.status.failure.as_ref().is_some_and(|f| f.can_retry()))
    });

    if resubmit {
        let Some(platform) = ctx.platform_for(kit.namespace()).await? else {
            let mut target = kit.clone();
            target.status.phase = KitPhase::WaitingForPlatform;
            return Ok(Outcome::Updated(target));
        };
        let env = ctx.expander.apply(Target::Kit(kit), &platform)?;
        let build = new_build(
            &kit.build_name(),
            IntegrationKit::KIND,
            &kit.meta,
            &env,
            &platform,
        );
        submit_build(ctx, &build).await?;
    }

    let mut target = kit.clone();
    target.status.phase = KitPhase::BuildRunning;
    Ok(Outcome::Updated(target))
}

fn observe(
    ctx: &Context,
    kit: &IntegrationKit,
    build: Option<Build>,
) -> Outcome<IntegrationKit> {
    let mut target = kit.clone();
    let Some(build) = build else {
        warn!(kit = %kit.name(), "kit build vanished, resubmitting");
        target.status.phase = KitPhase::BuildSubmitted;
        return Outcome::Updated(target);
    };

    let status = &mut target.status;
    match build.status.phase {
        BuildPhase::Succeeded => {
            status.image = build.status.pinned_image();
            status.base_image = build.status.base_image.clone();
            status.artifacts = build.status.artifacts.clone();
            status.failure = None;
            status.phase = KitPhase::Ready;
            info!(kit = %kit.name(), image = ?status.image, "kit ready");
        }
        BuildPhase::Failed if build.status.failure.as_ref().is_some_and(|f| f.can_retry()) => {
            return Outcome::Unchanged;
        }
        phase @ (BuildPhase::Failed | BuildPhase::Error | BuildPhase::Interrupted) => {
            let previous = status.failure.as_ref().map(|f| f.recovery.clone());
            let mut failure = build
                .status
                .failure
                .clone()
                .unwrap_or_else(|| Failure::new(format!("build {phase}"), ctx.now()));
            failure.recovery = previous.unwrap_or_default();
            failure.recovery.attempt_max = KIT_RECOVERY_ATTEMPTS;
            warn!(kit = %kit.name(), reason = %failure.reason, "kit build failed");
            status.failure = Some(failure);
            status.phase = KitPhase::Error;
        }
        _ => return Outcome::Unchanged,
    }

    Outcome::Updated(target)
}
