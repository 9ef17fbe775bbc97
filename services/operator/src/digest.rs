//! Drift detection digests.
//!
//! The digest covers what affects the built artifact: sources, dependencies,
//! trait configuration, configuration entries, the git origin and an
//! explicitly selected kit. Replicas are not covered: scaling never
//! triggers a rebuild.

use std::collections::BTreeSet;

use kforge_api::{Integration, IntegrationKit};
use kforge_reconcile::Digest;
use serde_json::json;

/// Bumped whenever the digest layout changes, forcing a rebuild.
pub const DIGEST_VERSION: u32 = 1;

/// Computes the build digest of an integration.
///
/// Dependencies and configuration entries are sets: order and duplicates
/// do not matter. Sources are keyed by name.
pub fn compute_digest(integration: &Integration) -> Digest {
    let spec = &integration.spec;

    let mut sources = spec.sources.clone();
    sources.sort();
    let dependencies: BTreeSet<&str> = spec.dependencies.iter().map(String::as_str).collect();
    let configuration: BTreeSet<_> = spec.configuration.iter().collect();

    Digest::from_json(&json!({
        "version": DIGEST_VERSION,
        "sources": sources,
        "dependencies": dependencies,
        "traits": spec.traits,
        "configuration": configuration,
        "git": spec.git,
        "kit": spec.integration_kit,
    }))
}

/// Computes the digest of a kit's build inputs.
pub fn compute_kit_digest(kit: &IntegrationKit) -> Digest {
    let spec = &kit.spec;

    let mut sources = spec.sources.clone();
    sources.sort();
    let dependencies: BTreeSet<&str> = spec.dependencies.iter().map(String::as_str).collect();

    Digest::from_json(&json!({
        "version": DIGEST_VERSION,
        "sources": sources,
        "dependencies": dependencies,
        "traits": spec.traits,
        "image": spec.image,
    }))
}
