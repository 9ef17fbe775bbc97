//! Kit matching and reuse.
//!
//! A kit is reusable by an integration when it was built for the same
//! operator and runtime, has as many dependencies, carries no trait the
//! integration did not ask for and, for kits built from sources, the same
//! sources.
//!
//! The dependency check only compares list lengths. Two different sets of
//! equal size pass it; this is a known approximation kept for compatibility.

use std::cmp::Reverse;

use kforge_api::{
    labels, ApiError, Integration, IntegrationKit, KitPhase, KitType, ObjectKey, Resource,
    SourceSpec, Traits, OPERATOR_VERSION,
};
use kforge_id::KitId;

use crate::store::{LabelSelector, Store, StoreError};

/// Selects kits eligible for automatic reuse.
pub fn reusable_selector() -> LabelSelector {
    LabelSelector::all().within(
        labels::KIT_TYPE,
        [KitType::Platform.as_str(), KitType::External.as_str()],
    )
}

/// Lists the reusable kits of `namespace`.
pub async fn reusable_kits(store: &Store, namespace: &str) -> Result<Vec<IntegrationKit>, StoreError> {
    store.list(Some(namespace), &reusable_selector()).await
}

/// Whether every trait of `kit` is requested by the integration with the
/// same value for every key the kit configures.
pub fn traits_are_subset(kit: &Traits, integration: &Traits) -> bool {
    kit.iter().all(|(id, kit_cfg)| {
        integration.get(id).is_some_and(|it_cfg| {
            kit_cfg
                .iter()
                .all(|(key, value)| it_cfg.get(key) == Some(value))
        })
    })
}

fn sorted_sources(sources: &[SourceSpec]) -> Vec<&SourceSpec> {
    let mut out: Vec<&SourceSpec> = sources.iter().collect();
    out.sort();
    out
}

/// Whether `kit` can serve `integration`.
pub fn integration_matches(integration: &Integration, kit: &IntegrationKit) -> bool {
    let status = &integration.status;

    if !kit.kit_type().is_reusable() || kit.status.phase == KitPhase::Error {
        return false;
    }
    if kit.status.version != status.version
        || kit.status.runtime_provider != status.runtime_provider
        || kit.status.runtime_version != status.runtime_version
    {
        return false;
    }
    if kit.spec.dependencies.len() != status.dependencies.len() {
        return false;
    }
    if !traits_are_subset(&kit.spec.traits, &integration.spec.traits) {
        return false;
    }
    if !kit.spec.sources.is_empty()
        && sorted_sources(&kit.spec.sources) != sorted_sources(&integration.spec.sources)
    {
        return false;
    }
    true
}

/// Picks the best kit of `pool` for `integration`.
///
/// Ready kits beat kits still building; then higher priority wins; then the
/// earliest created.
pub fn find_reusable_kit<'a>(
    integration: &Integration,
    pool: &'a [IntegrationKit],
) -> Result<Option<&'a IntegrationKit>, ApiError> {
    let mut ranked = Vec::new();
    for kit in pool.iter().filter(|k| integration_matches(integration, k)) {
        ranked.push((Reverse(kit.is_ready()), Reverse(kit.priority()?), kit));
    }
    ranked.sort_by(|a, b| {
        (a.0, a.1, a.2.meta.ordering_key()).cmp(&(b.0, b.1, b.2.meta.ordering_key()))
    });
    Ok(ranked.into_iter().next().map(|(_, _, kit)| kit))
}

/// A Ready kit of `pool` with a strictly higher priority than `current`.
pub fn find_priority_upgrade<'a>(
    integration: &Integration,
    current: &IntegrationKit,
    pool: &'a [IntegrationKit],
) -> Result<Option<&'a IntegrationKit>, ApiError> {
    let current_priority = current.priority()?;
    let Some(best) = find_reusable_kit(integration, pool)? else {
        return Ok(None);
    };
    if best.is_ready() && best.meta.name != current.meta.name && best.priority()? > current_priority {
        return Ok(Some(best));
    }
    Ok(None)
}

/// A new platform kit carrying the integration's dependencies and the given
/// kit-influencing traits.
pub fn new_platform_kit(integration: &Integration, traits: Traits) -> IntegrationKit {
    let name = KitId::new().to_string();
    let mut kit = IntegrationKit::new(integration.namespace(), name, KitType::Platform);
    let status = &integration.status;

    let meta = &mut kit.meta;
    meta.labels.insert(labels::CREATOR_KIND.into(), Integration::KIND.into());
    meta.labels.insert(labels::CREATOR_NAME.into(), integration.name().into());
    meta.labels.insert(labels::CREATOR_NAMESPACE.into(), integration.namespace().into());
    meta.labels.insert(
        labels::CREATOR_VERSION.into(),
        integration.meta.resource_version.to_string(),
    );
    meta.labels.insert(labels::RUNTIME_VERSION.into(), status.runtime_version.clone());
    meta.labels.insert(labels::RUNTIME_PROVIDER.into(), status.runtime_provider.clone());

    kit.spec.dependencies = status.dependencies.clone();
    kit.spec.traits = traits;
    kit.status.phase = KitPhase::Initialization;
    kit.status.version = if status.version.is_empty() {
        OPERATOR_VERSION.to_string()
    } else {
        status.version.clone()
    };
    kit.status.runtime_version = status.runtime_version.clone();
    kit.status.runtime_provider = status.runtime_provider.clone();
    kit
}

/// Integrations referencing `kit` through their status.
pub fn references_kit(integration: &Integration, kit: &ObjectKey) -> bool {
    integration.status.integration_kit.as_ref() == Some(kit)
}
