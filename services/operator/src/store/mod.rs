//! Resource store abstraction.
//!
//! The operator reads whole objects, mutates the status it owns and writes
//! them back. Writes are guarded by the object's resource version: an update
//! carrying a stale version is rejected with [`StoreError::Conflict`].

mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use kforge_api::{ObjectKey, ObjectMeta, Resource};
use kforge_id::ResourceVersion;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

pub use memory::MemoryStore;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: &'static str, key: ObjectKey },

    /// Optimistic concurrency violation.
    #[error("{kind} {key} was modified: expected version {expected}, found {actual}")]
    Conflict {
        kind: &'static str,
        key: ObjectKey,
        expected: ResourceVersion,
        actual: ResourceVersion,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

// =============================================================================
// Selectors
// =============================================================================

/// Label selector: equality requirements plus set-membership requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    equals: BTreeMap<String, String>,
    within: BTreeMap<String, BTreeSet<String>>,
}

impl LabelSelector {
    /// Selector matching everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    /// Requires the label to be present with one of `values`.
    pub fn within<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.within
            .insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.equals
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
            && self
                .within
                .iter()
                .all(|(k, set)| labels.get(k).is_some_and(|v| set.contains(v)))
    }
}

// =============================================================================
// Watch events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchChange {
    Added,
    Modified,
    Deleted,
}

/// Notification published after every committed write.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: &'static str,
    pub change: WatchChange,
    pub meta: ObjectMeta,
}

// =============================================================================
// Store trait
// =============================================================================

/// Untyped storage backend. Objects are JSON documents with a `meta` field.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(&self, kind: &'static str, key: &ObjectKey) -> Result<Option<Value>, StoreError>;

    /// Lists objects of `kind`, in every namespace when `namespace` is `None`.
    async fn list(
        &self,
        kind: &'static str,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<Value>, StoreError>;

    /// Stores a new object; assigns its first version and creation time.
    async fn create(&self, kind: &'static str, object: Value) -> Result<Value, StoreError>;

    /// Replaces an object if its version is current.
    async fn update(&self, kind: &'static str, object: Value) -> Result<Value, StoreError>;

    /// Deletes an object, or marks it when finalizers are pending.
    ///
    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, kind: &'static str, key: &ObjectKey) -> Result<bool, StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;
}

/// Typed handle over a [`ResourceStore`].
#[derive(Clone)]
pub struct Store {
    inner: Arc<dyn ResourceStore>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    pub fn new(inner: Arc<dyn ResourceStore>) -> Self {
        Self { inner }
    }

    pub async fn get<R: Resource>(&self, key: &ObjectKey) -> Result<Option<R>, StoreError> {
        match self.inner.get(R::KIND, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Like [`Store::get`], failing with `NotFound` when absent.
    pub async fn require<R: Resource>(&self, key: &ObjectKey) -> Result<R, StoreError> {
        self.get(key).await?.ok_or_else(|| StoreError::NotFound {
            kind: R::KIND,
            key: key.clone(),
        })
    }

    pub async fn list<R: Resource>(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<R>, StoreError> {
        self.inner
            .list(R::KIND, namespace, selector)
            .await?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .collect()
    }

    pub async fn create<R: Resource>(&self, object: &R) -> Result<R, StoreError> {
        let stored = self
            .inner
            .create(R::KIND, serde_json::to_value(object)?)
            .await?;
        Ok(serde_json::from_value(stored)?)
    }

    pub async fn update<R: Resource>(&self, object: &R) -> Result<R, StoreError> {
        let stored = self
            .inner
            .update(R::KIND, serde_json::to_value(object)?)
            .await?;
        Ok(serde_json::from_value(stored)?)
    }

    pub async fn delete<R: Resource>(&self, key: &ObjectKey) -> Result<bool, StoreError> {
        self.inner.delete(R::KIND, key).await
    }

    /// Creates `object` unless one with the same key exists.
    ///
    /// Returns `true` when the object was created.
    pub async fn create_if_absent<R: Resource>(&self, object: &R) -> Result<bool, StoreError> {
        if self.get::<R>(&object.key()).await?.is_some() {
            return Ok(false);
        }
        match self.create(object).await {
            Ok(_) => Ok(true),
            Err(StoreError::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.inner.subscribe()
    }
}
