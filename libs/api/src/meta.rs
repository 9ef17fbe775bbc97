//! Object metadata shared by every resource.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use kforge_id::ResourceVersion;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// =============================================================================
// Keys and references
// =============================================================================

/// Namespaced name of a resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Owner reference; a controller owner is collected together with its
/// dependents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub controller: bool,
}

// =============================================================================
// ObjectMeta
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,

    /// Optimistic concurrency token, assigned by the store.
    #[serde(default)]
    pub resource_version: ResourceVersion,

    /// Assigned by the store on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    /// Set when deletion was requested while finalizers are pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Total order over objects of a kind: creation time, then name.
    ///
    /// Objects not yet stored sort after every stored one.
    pub fn ordering_key(&self) -> (bool, Option<DateTime<Utc>>, &str) {
        (
            self.creation_timestamp.is_none(),
            self.creation_timestamp,
            self.name.as_str(),
        )
    }

    pub fn controller_owner(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }

    /// Replaces any existing controller reference with one to `kind/name`.
    pub fn set_controller_owner(&mut self, kind: &str, name: &str) {
        self.owner_references.retain(|r| !r.controller);
        self.owner_references.push(OwnerReference {
            kind: kind.to_string(),
            name: name.to_string(),
            controller: true,
        });
    }

    pub fn is_controlled_by(&self, kind: &str, name: &str) -> bool {
        self.controller_owner()
            .is_some_and(|r| r.kind == kind && r.name == name)
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    pub fn add_finalizer(&mut self, finalizer: &str) {
        if !self.has_finalizer(finalizer) {
            self.finalizers.push(finalizer.to_string());
        }
    }

    pub fn remove_finalizer(&mut self, finalizer: &str) {
        self.finalizers.retain(|f| f != finalizer);
    }
}

// =============================================================================
// Resource traits
// =============================================================================

/// A storable resource.
pub trait Resource:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Kind name, also used in owner references.
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> ObjectKey {
        self.meta().key()
    }

    fn name(&self) -> &str {
        &self.meta().name
    }

    fn namespace(&self) -> &str {
        &self.meta().namespace
    }
}

/// A closed set of lifecycle phases.
pub trait Phase: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    const ALL: &'static [Self];
}

/// A resource driven through phases by a controller.
pub trait Phased: Resource {
    type Phase: Phase;

    fn phase(&self) -> Self::Phase;
    fn set_phase(&mut self, phase: Self::Phase);
}

/// Implements [`Resource`] for a struct with a `meta: ObjectMeta` field.
macro_rules! impl_resource {
    ($ty:ty, $kind:literal) => {
        impl $crate::Resource for $ty {
            const KIND: &'static str = $kind;

            fn meta(&self) -> &$crate::ObjectMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::ObjectMeta {
                &mut self.meta
            }
        }
    };
}

pub(crate) use impl_resource;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ordering_key_sorts_by_time_then_name() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 1).unwrap();

        let mut a = ObjectMeta::new("ns", "b");
        a.creation_timestamp = Some(t0);
        let mut b = ObjectMeta::new("ns", "a");
        b.creation_timestamp = Some(t1);
        let mut c = ObjectMeta::new("ns", "a");
        c.creation_timestamp = Some(t0);
        let unstored = ObjectMeta::new("ns", "0");

        let mut metas = [&unstored, &b, &a, &c];
        metas.sort_by(|x, y| x.ordering_key().cmp(&y.ordering_key()));
        let names: Vec<_> = metas.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "a", "0"]);
        assert_eq!(metas[0].creation_timestamp, Some(t0));
    }

    #[test]
    fn controller_owner_is_replaced() {
        let mut meta = ObjectMeta::new("ns", "build-1");
        meta.set_controller_owner("IntegrationKit", "kit-a");
        meta.set_controller_owner("Integration", "it");

        assert_eq!(meta.owner_references.len(), 1);
        assert!(meta.is_controlled_by("Integration", "it"));
        assert!(!meta.is_controlled_by("IntegrationKit", "kit-a"));
    }

    #[test]
    fn finalizers_are_deduplicated() {
        let mut meta = ObjectMeta::new("ns", "it");
        meta.add_finalizer("f");
        meta.add_finalizer("f");
        assert_eq!(meta.finalizers, vec!["f".to_string()]);
        meta.remove_finalizer("f");
        assert!(!meta.has_finalizer("f"));
    }
}
