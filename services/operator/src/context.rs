//! Shared handles passed to every action.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kforge_api::{IntegrationPlatform, Resource};
use kforge_reconcile::{Clock, SystemClock};

use crate::expander::{DefaultExpander, TraitExpander};
use crate::gc::{GarbageCollector, StoreGarbageCollector};
use crate::store::{LabelSelector, MemoryStore, Store, StoreError};
use crate::workloads::{NoopWorkloads, Workloads};

/// Collaborators of a reconcile tick.
#[derive(Clone)]
pub struct Context {
    pub store: Store,
    pub clock: Arc<dyn Clock>,
    pub expander: Arc<dyn TraitExpander>,
    pub workloads: Arc<dyn Workloads>,
    pub gc: Arc<dyn GarbageCollector>,
    /// Namespace holding the fallback platform.
    pub operator_namespace: String,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("operator_namespace", &self.operator_namespace)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Context over an in-memory store with the built-in collaborators.
    pub fn in_memory(clock: Arc<dyn Clock>, operator_namespace: impl Into<String>) -> Self {
        let store = Store::new(Arc::new(MemoryStore::new(clock.clone())));
        Self {
            gc: Arc::new(StoreGarbageCollector::new(store.clone())),
            store,
            clock,
            expander: Arc::new(DefaultExpander),
            workloads: Arc::new(NoopWorkloads::new()),
            operator_namespace: operator_namespace.into(),
        }
    }

    /// Same as [`Context::in_memory`] on the system clock.
    pub fn system(operator_namespace: impl Into<String>) -> Self {
        Self::in_memory(Arc::new(SystemClock), operator_namespace)
    }

    pub fn with_workloads(mut self, workloads: Arc<dyn Workloads>) -> Self {
        self.workloads = workloads;
        self
    }

    pub fn with_expander(mut self, expander: Arc<dyn TraitExpander>) -> Self {
        self.expander = expander;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The current platform for `namespace`.
    ///
    /// A Ready platform of the namespace wins over one of the operator
    /// namespace. Platforms that are not Ready are ignored.
    pub async fn platform_for(
        &self,
        namespace: &str,
    ) -> Result<Option<IntegrationPlatform>, StoreError> {
        if let Some(pl) = self.ready_platform_in(namespace).await? {
            return Ok(Some(pl));
        }
        if namespace == self.operator_namespace {
            return Ok(None);
        }
        self.ready_platform_in(&self.operator_namespace).await
    }

    async fn ready_platform_in(
        &self,
        namespace: &str,
    ) -> Result<Option<IntegrationPlatform>, StoreError> {
        let mut platforms: Vec<IntegrationPlatform> = self
            .store
            .list(Some(namespace), &LabelSelector::all())
            .await?;
        platforms.retain(IntegrationPlatform::is_ready);
        platforms.sort_by(|a, b| a.meta().ordering_key().cmp(&b.meta().ordering_key()));
        Ok(platforms.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kforge_api::PlatformPhase;

    async fn put_platform(ctx: &Context, ns: &str, name: &str, phase: PlatformPhase) {
        let mut pl = IntegrationPlatform::new(ns, name);
        pl.status.phase = phase;
        ctx.store.create(&pl).await.unwrap();
    }

    #[tokio::test]
    async fn local_ready_platform_wins() {
        let ctx = Context::system("kforge");
        put_platform(&ctx, "kforge", "global", PlatformPhase::Ready).await;
        put_platform(&ctx, "team", "local", PlatformPhase::Ready).await;

        let pl = ctx.platform_for("team").await.unwrap().unwrap();
        assert_eq!(pl.name(), "local");
    }

    #[tokio::test]
    async fn falls_back_to_operator_namespace() {
        let ctx = Context::system("kforge");
        put_platform(&ctx, "kforge", "global", PlatformPhase::Ready).await;
        put_platform(&ctx, "team", "local", PlatformPhase::Warming).await;

        let pl = ctx.platform_for("team").await.unwrap().unwrap();
        assert_eq!(pl.name(), "global");
        assert!(ctx.platform_for("empty").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn no_ready_platform() {
        let ctx = Context::system("kforge");
        put_platform(&ctx, "kforge", "global", PlatformPhase::Creating).await;
        assert!(ctx.platform_for("team").await.unwrap().is_none());
    }
}
