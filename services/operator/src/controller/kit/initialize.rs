use async_trait::async_trait;
use kforge_api::{
    ConditionStatus, ConditionType, HasConditions, IntegrationKit, KitPhase, KitType, Resource,
    OPERATOR_VERSION,
};
use tracing::info;

use crate::context::Context;
use crate::controller::reason;
use crate::digest::compute_kit_digest;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;

#[derive(Debug, Clone, Copy, Default)]
pub struct InitializeKit;

#[async_trait]
impl Action<IntegrationKit> for InitializeKit {
    fn name(&self) -> &'static str {
        "initialize"
    }

    async fn handle(
        &self,
        ctx: &Context,
        kit: &IntegrationKit,
    ) -> Result<Outcome<IntegrationKit>, ReconcileError> {
        let now = ctx.now();
        let mut target = kit.clone();

        let Some(platform) = ctx.platform_for(kit.namespace()).await? else {
            target.status.set_condition(
                ConditionType::PlatformAvailable,
                ConditionStatus::False,
                reason::PLATFORM_NOT_AVAILABLE,
                "no ready platform",
                now,
            );
            target.status.phase = KitPhase::WaitingForPlatform;
            return Ok(Outcome::Updated(target));
        };

        let status = &mut target.status;
        status.set_condition(
            ConditionType::PlatformAvailable,
            ConditionStatus::True,
            reason::PLATFORM_AVAILABLE,
            platform.name(),
            now,
        );
        status.platform = Some(platform.name().to_string());
        if status.version.is_empty() {
            status.version = OPERATOR_VERSION.to_string();
        }
        if status.runtime_version.is_empty() {
            status.runtime_version = platform.build().runtime_version.clone();
        }
        if status.runtime_provider.is_empty() {
            status.runtime_provider = platform.build().runtime_provider.clone();
        }
        status.digest = Some(compute_kit_digest(kit));

        match (&kit.kit_type(), &kit.spec.image) {
            (KitType::External, Some(image)) => {
                info!(image = %image, "external kit registered");
                status.image = Some(image.clone());
                status.phase = KitPhase::Ready;
            }
            _ => status.phase = KitPhase::BuildSubmitted,
        }

        Ok(Outcome::Updated(target))
    }
}
