use async_trait::async_trait;
use kforge_api::{labels, Integration, IntegrationPhase, Resource};
use tracing::info;

use crate::context::Context;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;

/// Collects owned objects and releases the integration's finalizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Delete;

#[async_trait]
impl Action<Integration> for Delete {
    fn name(&self) -> &'static str {
        "delete"
    }

    async fn handle(
        &self,
        ctx: &Context,
        it: &Integration,
    ) -> Result<Outcome<Integration>, ReconcileError> {
        let collected = ctx.gc.delete_owned_by(Integration::KIND, &it.key()).await?;
        if collected > 0 {
            info!(collected, "owned objects deleted");
        }

        let mut target = it.clone();
        target.status.phase = IntegrationPhase::Deleting;
        target.meta.remove_finalizer(labels::INTEGRATION_FINALIZER);
        Ok(Outcome::Updated(target))
    }
}
