use async_trait::async_trait;
use kforge_api::{
    ConditionStatus, ConditionType, HasConditions, Integration, IntegrationKit, IntegrationPhase,
    KitPhase, KitType, Resource,
};
use tracing::info;

use super::fail;
use crate::context::Context;
use crate::controller::reason;
use crate::dispatch::{Action, Outcome};
use crate::error::ReconcileError;
use crate::kits::{find_reusable_kit, new_platform_kit, reusable_kits};

/// Attaches a kit to the integration: the one already referenced, a
/// reusable one, or a newly created platform kit.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildKit;

#[async_trait]
impl Action<Integration> for BuildKit {
    fn name(&self) -> &'static str {
        "build-kit"
    }

    async fn handle(
        &self,
        ctx: &Context,
        it: &Integration,
    ) -> Result<Outcome<Integration>, ReconcileError> {
        let now = ctx.now();
        let mut target = it.clone();

        if let Some(kit_key) = &it.status.integration_kit {
            let kit: IntegrationKit =
                ctx.store
                    .get(kit_key)
                    .await?
                    .ok_or_else(|| ReconcileError::MissingKit {
                        integration: it.key(),
                        kit: kit_key.clone(),
                    })?;

            // Only the version is rechecked: the kit was matched once already.
            if kit.kit_type() == KitType::Platform && kit.status.version != it.status.version {
                info!(kit = %kit.name(), "attached kit built by another operator version, detaching");
                target.status.integration_kit = None;
                target.status.set_condition(
                    ConditionType::KitAvailable,
                    ConditionStatus::False,
                    reason::KIT_OUTDATED,
                    format!("kit {} has version {}", kit.name(), kit.status.version),
                    now,
                );
                return Ok(Outcome::Updated(target));
            }

            apply_kit(&mut target, &kit, now);
            return Ok(Outcome::Updated(target));
        }

        let pool = reusable_kits(&ctx.store, it.namespace()).await?;
        if let Some(kit) = find_reusable_kit(it, &pool)? {
            info!(kit = %kit.name(), phase = %kit.status.phase, "reusing kit");
            target.status.integration_kit = Some(kit.key());
            apply_kit(&mut target, kit, now);
            return Ok(Outcome::Updated(target));
        }

        let kit = new_platform_kit(it, ctx.expander.kit_traits(&it.spec.traits));
        let kit = ctx.store.create(&kit).await?;
        info!(kit = %kit.name(), "no reusable kit, platform kit created");
        target.status.integration_kit = Some(kit.key());
        apply_kit(&mut target, &kit, now);
        Ok(Outcome::Updated(target))
    }
}

/// Mirrors the attached kit's phase onto the integration.
fn apply_kit(target: &mut Integration, kit: &IntegrationKit, now: chrono::DateTime<chrono::Utc>) {
    match kit.status.phase {
        KitPhase::Ready => {
            target.status.image = kit.status.image.clone();
            target.status.set_condition(
                ConditionType::KitAvailable,
                ConditionStatus::True,
                reason::KIT_AVAILABLE,
                kit.name(),
                now,
            );
            target.status.phase = IntegrationPhase::Deploying;
        }
        KitPhase::Error => {
            let cause = kit
                .status
                .failure
                .as_ref()
                .map(|f| f.reason.clone())
                .unwrap_or_else(|| "kit build failed".to_string());
            let message = format!("kit {}: {}", kit.name(), cause);
            target.status.set_condition(
                ConditionType::KitAvailable,
                ConditionStatus::False,
                reason::KIT_ERROR,
                message.clone(),
                now,
            );
            fail(target, reason::KIT_ERROR, message, now);
        }
        phase => {
            target.status.set_condition(
                ConditionType::KitAvailable,
                ConditionStatus::False,
                reason::KIT_NOT_READY,
                format!("kit {} is {}", kit.name(), phase),
                now,
            );
        }
    }
}
