//! Trait expansion: turns a target into its build pipeline.

use std::collections::BTreeSet;

use kforge_api::{
    BuildConfiguration, BuilderTask, Integration, IntegrationKit, IntegrationPlatform,
    PublishTask, Resource, Task, TraitConfig, Traits,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpandError {
    #[error("unknown trait '{0}'")]
    UnknownTrait(String),

    #[error("invalid configuration for trait '{trait_id}': {reason}")]
    InvalidTraitConfig { trait_id: String, reason: String },
}

/// What the expander is asked to build.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Integration(&'a Integration),
    Kit(&'a IntegrationKit),
}

impl Target<'_> {
    fn name(&self) -> &str {
        match self {
            Target::Integration(it) => it.name(),
            Target::Kit(kit) => kit.name(),
        }
    }

    fn namespace(&self) -> &str {
        match self {
            Target::Integration(it) => it.namespace(),
            Target::Kit(kit) => kit.namespace(),
        }
    }
}

/// Expanded pipeline for a target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// Ordered build tasks.
    pub tasks: Vec<Task>,
    /// Resolved dependencies, sorted and unique.
    pub dependencies: Vec<String>,
    /// Name of the platform the expansion used.
    pub platform: String,
}

pub trait TraitExpander: Send + Sync {
    fn apply(
        &self,
        target: Target<'_>,
        platform: &IntegrationPlatform,
    ) -> Result<Environment, ExpandError>;

    /// Whether a trait's configuration affects the built artifact.
    fn influences_kit(&self, trait_id: &str) -> bool;

    /// Keeps only the traits that affect the built artifact.
    fn kit_traits(&self, traits: &Traits) -> Traits {
        traits
            .iter()
            .filter(|(id, _)| self.influences_kit(id))
            .map(|(id, cfg)| (id.clone(), cfg.clone()))
            .collect()
    }
}

/// Built-in trait catalog: `(id, influences kit)`.
const CATALOG: &[(&str, bool)] = &[
    ("builder", true),
    ("camel", true),
    ("quarkus", true),
    ("registry", true),
    ("container", false),
    ("deployment", false),
    ("health", false),
    ("jvm", false),
    ("mount", false),
    ("service", false),
];

/// Expander over the built-in catalog.
///
/// Traits may contribute extra dependencies through a `dependencies` list.
#[derive(Debug, Clone, Default)]
pub struct DefaultExpander;

impl DefaultExpander {
    fn trait_dependencies(trait_id: &str, config: &TraitConfig) -> Result<Vec<String>, ExpandError> {
        let Some(value) = config.get("dependencies") else {
            return Ok(Vec::new());
        };
        let invalid = || ExpandError::InvalidTraitConfig {
            trait_id: trait_id.to_string(),
            reason: "dependencies must be a list of strings".to_string(),
        };
        value
            .as_array()
            .ok_or_else(invalid)?
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(invalid))
            .collect()
    }

    fn resolve(
        &self,
        declared: &[String],
        traits: &Traits,
    ) -> Result<Vec<String>, ExpandError> {
        let mut deps: BTreeSet<String> = declared.iter().cloned().collect();
        for (id, config) in traits {
            if !CATALOG.iter().any(|(known, _)| known == id) {
                return Err(ExpandError::UnknownTrait(id.clone()));
            }
            deps.extend(Self::trait_dependencies(id, config)?);
        }
        Ok(deps.into_iter().collect())
    }
}

impl TraitExpander for DefaultExpander {
    fn apply(
        &self,
        target: Target<'_>,
        platform: &IntegrationPlatform,
    ) -> Result<Environment, ExpandError> {
        let (dependencies, sources) = match target {
            Target::Integration(it) => (
                self.resolve(&it.spec.dependencies, &it.spec.traits)?,
                if it.is_self_built() {
                    it.spec.sources.clone()
                } else {
                    Vec::new()
                },
            ),
            Target::Kit(kit) => (
                self.resolve(&kit.spec.dependencies, &kit.spec.traits)?,
                kit.spec.sources.clone(),
            ),
        };

        let build = platform.build();
        let registry = build.registry.address.trim_end_matches('/');
        let repository = build
            .registry
            .organization
            .as_deref()
            .unwrap_or(target.namespace());
        let image_name = format!("kforge-{}", target.name());
        let image = if registry.is_empty() {
            format!("{repository}/{image_name}:latest")
        } else {
            format!("{registry}/{repository}/{image_name}:latest")
        };

        let builder = BuilderTask {
            name: "builder".to_string(),
            base_image: build.base_image.clone(),
            dependencies: dependencies.clone(),
            runtime_version: build.runtime_version.clone(),
            configuration: BuildConfiguration {
                strategy: build.build_strategy,
                order_strategy: build.order_strategy,
            },
            sources,
        };
        let publish = PublishTask {
            name: build.publish_strategy.as_str().to_string(),
            strategy: build.publish_strategy,
            registry: registry.to_string(),
            image,
        };

        Ok(Environment {
            tasks: vec![Task::Builder(builder), Task::Publish(publish)],
            dependencies,
            platform: platform.name().to_string(),
        })
    }

    fn influences_kit(&self, trait_id: &str) -> bool {
        CATALOG
            .iter()
            .any(|(id, influences)| *id == trait_id && *influences)
    }
}
