use async_trait::async_trait;
use kforge_api::{
    ConditionStatus, ConditionType, HasConditions, Integration, IntegrationPhase, Resource,
};
use tracing::info;

use crate::context::Context;
use crate::controller::reason;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;

/// Materializes the workload of a built integration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deploy;

#[async_trait]
impl Action<Integration> for Deploy {
    fn name(&self) -> &'static str {
        "deploy"
    }

    async fn handle(
        &self,
        ctx: &Context,
        it: &Integration,
    ) -> Result<Outcome<Integration>, ReconcileError> {
        if it.status.integration_kit.is_none() && it.status.image.is_none() {
            return Err(ReconcileError::NothingToDeploy(it.key()));
        }

        ctx.workloads.deploy(it).await?;

        let now = ctx.now();
        let mut target = it.clone();
        target.status.set_condition(
            ConditionType::DeploymentAvailable,
            ConditionStatus::True,
            reason::DEPLOYMENT_AVAILABLE,
            "",
            now,
        );
        if target.status.deployment_timestamp.is_none() {
            target.status.deployment_timestamp = Some(now);
        }
        target.status.phase = IntegrationPhase::Running;

        info!(image = ?it.status.image, "integration deployed");
        Ok(Outcome::Updated(target))
    }
}
