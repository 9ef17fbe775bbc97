//! Cascading deletion of owned objects.

use async_trait::async_trait;
use kforge_api::{Build, ObjectKey, Resource};
use tracing::debug;

use crate::store::{LabelSelector, Store, StoreError};

#[async_trait]
pub trait GarbageCollector: Send + Sync {
    /// Deletes every object controlled by `owner_kind/owner`.
    ///
    /// Returns how many objects were deleted. Safe to repeat.
    async fn delete_owned_by(
        &self,
        owner_kind: &'static str,
        owner: &ObjectKey,
    ) -> Result<usize, StoreError>;
}

/// Collects Builds controlled by the owner.
#[derive(Debug, Clone)]
pub struct StoreGarbageCollector {
    store: Store,
}

impl StoreGarbageCollector {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl GarbageCollector for StoreGarbageCollector {
    async fn delete_owned_by(
        &self,
        owner_kind: &'static str,
        owner: &ObjectKey,
    ) -> Result<usize, StoreError> {
        let builds: Vec<Build> = self
            .store
            .list(Some(&owner.namespace), &LabelSelector::all())
            .await?;

        let mut deleted = 0;
        for build in builds
            .iter()
            .filter(|b| b.meta.is_controlled_by(owner_kind, &owner.name))
        {
            if self.store.delete::<Build>(&build.key()).await? {
                deleted += 1;
            }
        }
        debug!(owner = %owner, deleted, "owned builds collected");
        Ok(deleted)
    }
}
