//! Build admission and deduplication.
//!
//! [`has_matching_build`] decides whether a build should wait for another one
//! instead of running alongside it. The policy is approximate on purpose: a
//! candidate sharing most of the requested dependencies is worth waiting for,
//! one missing at least half of them is not.
//!
//! Waiting never blocks. A build that found a match stays in `Scheduling`
//! and is re-evaluated on the next tick.

use std::collections::BTreeSet;

use kforge_api::{
    labels, Build, BuildPhase, Integration, IntegrationPlatform, ObjectMeta, Resource, Role,
    RoleBinding, ServiceAccount,
};
use tracing::{debug, info};

use crate::context::Context;
use crate::error::ReconcileError;
use crate::expander::Environment;
use crate::store::StoreError;

/// Finds a build that `build` should wait for.
///
/// `pool` holds the builds of the same namespace; `build` itself, finished
/// builds and builds for another runtime version are skipped. A
/// `Pending`/`Running` candidate matches immediately. Among candidates still scheduling, the one sharing the most
/// dependencies wins, earliest created first.
///
/// A scheduling candidate only matches when waiting for it is acyclic:
/// - identical dependencies: only if it was created before `build`
/// - partial overlap: only if its dependencies are a subset of `build`'s
///
/// The subset requirement is narrower than plain partial overlap: a
/// scheduling candidate bringing dependencies `build` does not need is never
/// waited on, even when it covers more than half of them.
pub fn has_matching_build<'a>(build: &Build, pool: &'a [Build]) -> Option<&'a Build> {
    let required = build.dependencies();
    if required.is_empty() {
        return None;
    }

    let mut candidates: Vec<&Build> = pool
        .iter()
        .filter(|b| {
            b.meta.name != build.meta.name
                && !b.is_finished()
                && b.runtime_version() == build.runtime_version()
        })
        .collect();
    candidates.sort_by(|a, b| a.meta.ordering_key().cmp(&b.meta.ordering_key()));

    let mut best: Option<(&Build, usize)> = None;
    for candidate in candidates {
        let provided = candidate.dependencies();
        let missing = required.difference(&provided).count();
        let complete = missing == 0;

        // Too dissimilar: building independently is cheaper.
        if !complete && missing >= required.len() / 2 {
            continue;
        }

        let phase = candidate.status.phase;
        if phase.is_active() {
            debug!(candidate = %candidate.meta.name, %phase, "active build matches");
            return Some(candidate);
        }
        if !phase.is_scheduling() {
            continue;
        }

        let matched = if complete && provided.len() == required.len() {
            candidate.meta.ordering_key() < build.meta.ordering_key()
        } else if !complete {
            provided.is_subset(&required)
        } else {
            false
        };
        if !matched {
            continue;
        }

        let common = common_dependencies(build, candidate).len();
        if best.map_or(true, |(_, c)| common > c) {
            best = Some((candidate, common));
        }
    }

    best.map(|(b, _)| b)
}

/// Whether a build created before `build` is still waiting for admission.
pub fn has_scheduled_builds_before(build: &Build, pool: &[Build]) -> bool {
    pool.iter().any(|b| {
        b.meta.name != build.meta.name
            && b.status.phase.is_scheduling()
            && b.meta.ordering_key() < build.meta.ordering_key()
    })
}

/// Number of builds holding builder capacity, excluding `build`.
pub fn active_builds(build: &Build, pool: &[Build]) -> usize {
    pool.iter()
        .filter(|b| b.meta.name != build.meta.name && b.status.phase.is_active())
        .count()
}

/// Assembles the Build for an owner from its expanded environment.
pub fn new_build(
    name: &str,
    owner_kind: &'static str,
    owner: &ObjectMeta,
    env: &Environment,
    platform: &IntegrationPlatform,
) -> Build {
    let mut build = Build::new(owner.namespace.clone(), name);
    build.meta.labels = labels::creator_labels(&owner.labels);
    let owner_label = if owner_kind == <Integration as Resource>::KIND {
        labels::INTEGRATION
    } else {
        labels::KIT
    };
    build
        .meta
        .labels
        .insert(owner_label.to_string(), owner.name.clone());
    build.meta.set_controller_owner(owner_kind, &owner.name);
    build.spec.tasks = env.tasks.clone();
    build.spec.timeout_secs = Some(platform.build().timeout_secs);
    build.spec.max_attempts = platform.build().max_build_attempts;
    build.status.phase = BuildPhase::Initialization;
    build
}

/// Creates the builder service account, role and binding when absent.
pub async fn ensure_builder_rbac(ctx: &Context, namespace: &str) -> Result<(), StoreError> {
    let created = [
        ctx.store
            .create_if_absent(&ServiceAccount::builder(namespace))
            .await?,
        ctx.store.create_if_absent(&Role::builder(namespace)).await?,
        ctx.store
            .create_if_absent(&RoleBinding::builder(namespace))
            .await?,
    ];
    if created.iter().any(|c| *c) {
        info!(namespace, "builder RBAC prerequisites created");
    }
    Ok(())
}

/// Replaces any build with the same name by `build`.
///
/// There is at most one live Build per name: the previous one is deleted
/// before the new one is created.
pub async fn submit_build(ctx: &Context, build: &Build) -> Result<Build, ReconcileError> {
    ensure_builder_rbac(ctx, &build.meta.namespace).await?;

    let key = build.meta.key();
    if ctx.store.delete::<Build>(&key).await? {
        debug!(build = %key, "previous build deleted");
    }
    let created = ctx.store.create(build).await?;
    info!(build = %key, "build submitted");
    Ok(created)
}

/// Dependencies shared by two builds.
fn common_dependencies<'a>(a: &'a Build, b: &Build) -> BTreeSet<&'a str> {
    let other = b.dependencies();
    a.dependencies()
        .into_iter()
        .filter(|d| other.contains(d))
        .collect()
}
