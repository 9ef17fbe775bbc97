use async_trait::async_trait;
use kforge_api::{Build, BuildPhase, Failure};
use tracing::warn;

use crate::context::Context;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;

/// Reason recorded on builds exceeding their timeout.
pub const BUILD_TIMEOUT: &str = "build timeout";

/// Interrupts admitted builds running past their timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorBuild;

#[async_trait]
impl Action<Build> for MonitorBuild {
    fn name(&self) -> &'static str {
        "monitor"
    }

    async fn handle(&self, ctx: &Context, build: &Build) -> Result<Outcome<Build>, ReconcileError> {
        let (Some(started), Some(timeout)) = (build.status.started_at, build.timeout()) else {
            return Ok(Outcome::Unchanged);
        };
        let now = ctx.now();
        if now <= started + timeout {
            return Ok(Outcome::Unchanged);
        }

        warn!(
            build = %build.meta.name,
            elapsed_secs = (now - started).num_seconds(),
            "build timed out"
        );
        let mut target = build.clone();
        target.status.phase = BuildPhase::Interrupted;
        target.status.failure = Some(Failure::new(BUILD_TIMEOUT, now));
        Ok(Outcome::Updated(target))
    }
}
