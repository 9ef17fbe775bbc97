use async_trait::async_trait;
use kforge_api::{
    ConditionStatus, ConditionType, HasConditions, Integration, IntegrationPhase, Resource,
    OPERATOR_VERSION,
};
use tracing::{info, warn};

use super::fail_with_error;
use crate::context::Context;
use crate::controller::reason;
use crate::digest::compute_digest;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;
use crate::expander::Target;

/// Resolves the build inputs of an integration and records its digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Initialize;

#[async_trait]
impl Action<Integration> for Initialize {
    fn name(&self) -> &'static str {
        "initialize"
    }

    async fn handle(
        &self,
        ctx: &Context,
        it: &Integration,
    ) -> Result<Outcome<Integration>, ReconcileError> {
        let now = ctx.now();
        let mut target = it.clone();

        let Some(platform) = ctx.platform_for(it.namespace()).await? else {
            target.status.set_condition(
                ConditionType::PlatformAvailable,
                ConditionStatus::False,
                reason::PLATFORM_NOT_AVAILABLE,
                "platform is no longer ready",
                now,
            );
            target.status.phase = IntegrationPhase::WaitingForPlatform;
            return Ok(Outcome::Updated(target));
        };

        let status = &mut target.status;
        // Recorded before expansion so a failed spec is retried once it changes.
        status.digest = Some(compute_digest(it));
        status.version = OPERATOR_VERSION.to_string();
        status.runtime_version = platform.build().runtime_version.clone();
        status.runtime_provider = platform.build().runtime_provider.clone();
        status.platform = Some(platform.name().to_string());
        status.replicas = it.spec.replicas;
        if status.initialization_timestamp.is_none() {
            status.initialization_timestamp = Some(now);
        }

        let env = match ctx.expander.apply(Target::Integration(it), &platform) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "integration initialization failed");
                fail_with_error(&mut target, reason::INITIALIZATION_FAILED, &e, now);
                return Ok(Outcome::Updated(target));
            }
        };

        let status = &mut target.status;
        status.dependencies = env.dependencies;
        status.failure = None;
        if let Some(kit) = &it.spec.integration_kit {
            status.integration_kit = Some(kit.clone());
        }
        status.phase = if it.is_self_built() {
            IntegrationPhase::BuildSubmitted
        } else {
            IntegrationPhase::BuildingKit
        };

        info!(
            digest = %status.digest.as_ref().map(|d| d.as_str()).unwrap_or_default(),
            dependencies = status.dependencies.len(),
            "integration initialized"
        );
        Ok(Outcome::Updated(target))
    }
}
