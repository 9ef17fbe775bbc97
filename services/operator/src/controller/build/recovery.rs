use async_trait::async_trait;
use kforge_api::{Build, BuildPhase};
use tracing::info;

use crate::context::Context;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;

/// Retries failed builds with backoff; gives up with `Error` once the
/// attempts are spent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recovery;

#[async_trait]
impl Action<Build> for Recovery {
    fn name(&self) -> &'static str {
        "recovery"
    }

    async fn handle(&self, ctx: &Context, build: &Build) -> Result<Outcome<Build>, ReconcileError> {
        let mut target = build.clone();

        let retryable = build.status.failure.as_ref().filter(|f| f.can_retry());
        let Some(failure) = retryable else {
            info!(build = %build.meta.name, "no recovery attempts left");
            target.status.phase = BuildPhase::Error;
            return Ok(Outcome::Updated(target));
        };

        let now = ctx.now();
        if now < failure.next_attempt_at() {
            return Ok(Outcome::Unchanged);
        }

        if let Some(failure) = target.status.failure.as_mut() {
            failure.recovery.attempt += 1;
            failure.recovery.attempt_time = Some(now);
            info!(
                build = %build.meta.name,
                attempt = failure.recovery.attempt,
                max = failure.recovery.attempt_max,
                "recovering failed build"
            );
        }
        target.status.phase = BuildPhase::Initialization;
        target.status.started_at = None;
        target.status.image = None;
        target.status.digest = None;
        target.status.artifacts.clear();
        Ok(Outcome::Updated(target))
    }
}
