use async_trait::async_trait;
use kforge_api::{IntegrationKit, KitPhase, Resource};
use tracing::info;

use crate::context::Context;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;

/// Resubmits failed kits until their recovery attempts run out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorRecovery;

#[async_trait]
impl Action<IntegrationKit> for ErrorRecovery {
    fn name(&self) -> &'static str {
        "error-recovery"
    }

    async fn handle(
        &self,
        ctx: &Context,
        kit: &IntegrationKit,
    ) -> Result<Outcome<IntegrationKit>, ReconcileError> {
        let Some(failure) = &kit.status.failure else {
            return Ok(Outcome::Unchanged);
        };
        if !failure.can_retry() {
            return Ok(Outcome::Unchanged);
        }
        let now = ctx.now();
        if now < failure.next_attempt_at() {
            return Ok(Outcome::Unchanged);
        }

        let mut target = kit.clone();
        if let Some(failure) = target.status.failure.as_mut() {
            failure.recovery.attempt += 1;
            failure.recovery.attempt_time = Some(now);
            info!(
                kit = %kit.name(),
                attempt = failure.recovery.attempt,
                max = failure.recovery.attempt_max,
                "retrying kit build"
            );
        }
        target.status.phase = KitPhase::BuildSubmitted;
        Ok(Outcome::Updated(target))
    }
}
