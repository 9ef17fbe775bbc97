use async_trait::async_trait;
use kforge_api::{
    labels, ConditionStatus, ConditionType, HasConditions, Integration, IntegrationPhase,
    Resource,
};
use tracing::debug;

use crate::context::Context;
use crate::controller::reason;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;

/// Waits for a Ready platform, then hands over to initialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformSetup;

#[async_trait]
impl Action<Integration> for PlatformSetup {
    fn name(&self) -> &'static str {
        "platform-setup"
    }

    async fn handle(
        &self,
        ctx: &Context,
        it: &Integration,
    ) -> Result<Outcome<Integration>, ReconcileError> {
        let now = ctx.now();
        let mut target = it.clone();
        target.meta.add_finalizer(labels::INTEGRATION_FINALIZER);

        match ctx.platform_for(it.namespace()).await? {
            Some(platform) => {
                target.status.platform = Some(platform.name().to_string());
                target.status.set_condition(
                    ConditionType::PlatformAvailable,
                    ConditionStatus::True,
                    reason::PLATFORM_AVAILABLE,
                    platform.name(),
                    now,
                );
                target.status.phase = IntegrationPhase::Initialization;
            }
            None => {
                debug!("no ready platform, waiting");
                target.status.set_condition(
                    ConditionType::PlatformAvailable,
                    ConditionStatus::False,
                    reason::PLATFORM_NOT_AVAILABLE,
                    format!(
                        "no ready platform in namespace {} or {}",
                        it.namespace(),
                        ctx.operator_namespace
                    ),
                    now,
                );
                target.status.phase = IntegrationPhase::WaitingForPlatform;
            }
        }

        Ok(Outcome::Updated(target))
    }
}
