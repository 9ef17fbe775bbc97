use async_trait::async_trait;
use kforge_api::{
    ConditionStatus, ConditionType, HasConditions, Integration, IntegrationKit, IntegrationPhase,
    Resource,
};
use tracing::info;

use super::fail;
use crate::context::Context;
use crate::controller::reason;
use crate::digest::compute_digest;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;
use crate::kits::{find_priority_upgrade, reusable_kits};

/// Watches steady-state integrations: drift, kit upgrades and workload health.
#[derive(Debug, Clone, Copy, Default)]
pub struct Monitor;

#[async_trait]
impl Action<Integration> for Monitor {
    fn name(&self) -> &'static str {
        "monitor"
    }

    async fn handle(
        &self,
        ctx: &Context,
        it: &Integration,
    ) -> Result<Outcome<Integration>, ReconcileError> {
        let now = ctx.now();
        let mut target = it.clone();

        let digest = compute_digest(it);
        if it.status.digest.as_ref() != Some(&digest) {
            info!(
                previous = ?it.status.digest,
                current = %digest,
                "integration spec changed, rebuilding"
            );
            target.reset_for_rebuild();
            return Ok(Outcome::Updated(target));
        }

        if it.status.integration_kit.is_none() && it.status.image.is_none() {
            if it.status.phase == IntegrationPhase::Error {
                return Ok(Outcome::Unchanged);
            }
            return Err(ReconcileError::NothingToDeploy(it.key()));
        }
        // Only a workload failure can clear on its own; anything else waits for a spec change.
        if it.status.phase == IntegrationPhase::Error && !failed_on_workload(it) {
            return Ok(Outcome::Unchanged);
        }

        if it.status.phase == IntegrationPhase::Running {
            if let Some(kit_key) = &it.status.integration_kit {
                let current: IntegrationKit =
                    ctx.store
                        .get(kit_key)
                        .await?
                        .ok_or_else(|| ReconcileError::MissingKit {
                            integration: it.key(),
                            kit: kit_key.clone(),
                        })?;
                let pool = reusable_kits(&ctx.store, it.namespace()).await?;
                if let Some(better) = find_priority_upgrade(it, &current, &pool)? {
                    info!(from = %current.name(), to = %better.name(), "switching to higher priority kit");
                    target.status.integration_kit = Some(better.key());
                    target.status.image = better.status.image.clone();
                    target.status.set_condition(
                        ConditionType::KitAvailable,
                        ConditionStatus::True,
                        reason::KIT_AVAILABLE,
                        better.name(),
                        now,
                    );
                    target.status.phase = IntegrationPhase::Deploying;
                    return Ok(Outcome::Updated(target));
                }
            }
        }

        let workload = ctx.workloads.observe(it).await?;
        if !workload.deployed {
            return Ok(Outcome::Unchanged);
        }
        target.status.replicas = Some(workload.replicas);

        if let Some(message) = &workload.failure {
            fail(&mut target, reason::WORKLOAD_FAILED, message.clone(), now);
            return Ok(Outcome::Updated(target));
        }

        if workload.is_healthy() {
            target.status.set_condition(
                ConditionType::Ready,
                ConditionStatus::True,
                reason::DEPLOYMENT_READY,
                format!("{}/{} ready replicas", workload.ready_replicas, workload.replicas),
                now,
            );
            if target.status.ready_timestamp.is_none() {
                target.status.ready_timestamp = Some(now);
            }
            if target.status.phase == IntegrationPhase::Error {
                info!("workload healthy again, leaving error");
                target.status.phase = IntegrationPhase::Running;
                target.status.failure = None;
            }
        } else {
            target.status.set_condition(
                ConditionType::Ready,
                ConditionStatus::False,
                reason::DEPLOYMENT_PROGRESSING,
                format!("{}/{} ready replicas", workload.ready_replicas, workload.replicas),
                now,
            );
        }

        Ok(Outcome::Updated(target))
    }
}

fn failed_on_workload(it: &Integration) -> bool {
    it.status
        .condition(ConditionType::Ready)
        .map_or(false, |c| c.reason == reason::WORKLOAD_FAILED)
}
