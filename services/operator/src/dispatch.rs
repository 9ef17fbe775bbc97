//! Phase action dispatcher.
//!
//! Each controller owns a [`PhaseTable`]: a static map from every phase of
//! its resource to exactly one [`Action`]. A tick loads the entity, runs the
//! action routed for its phase and commits the result:
//!
//! - [`Outcome::Unchanged`], or an update equal to the input: nothing is
//!   written
//! - [`Outcome::Updated`]: the whole object is written back, guarded by its
//!   resource version
//! - a version conflict, raised by the action or the final write, turns the
//!   tick into [`TickOutcome::Requeue`] and nothing is retried in place

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kforge_api::{ObjectKey, Phase, Phased};
use kforge_id::RequestId;
use tracing::{debug, info, instrument, warn};

use crate::context::Context;
use crate::error::{DispatchError, ReconcileError};
use crate::store::StoreError;

/// Result of an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<E> {
    /// Leave the entity exactly as read.
    Unchanged,
    /// Persist this version of the entity.
    Updated(E),
}

/// One phase's transition logic.
#[async_trait]
pub trait Action<E: Phased>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &Context, entity: &E) -> Result<Outcome<E>, ReconcileError>;
}

/// Predicate routing an entity to an action regardless of its phase.
pub type Preempt<E> = fn(&E) -> bool;

/// Validated mapping from phases to actions.
pub struct PhaseTable<E: Phased> {
    actions: Vec<Arc<dyn Action<E>>>,
    routes: HashMap<E::Phase, usize>,
    preempt: Option<(Preempt<E>, usize)>,
}

impl<E: Phased> std::fmt::Debug for PhaseTable<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.actions.iter().map(|a| a.name()).collect();
        f.debug_struct("PhaseTable")
            .field("kind", &E::KIND)
            .field("actions", &names)
            .finish()
    }
}

pub struct PhaseTableBuilder<E: Phased> {
    actions: Vec<Arc<dyn Action<E>>>,
    routes: Vec<(E::Phase, usize)>,
    preempt: Option<(Preempt<E>, usize)>,
}

impl<E: Phased> PhaseTable<E> {
    pub fn builder() -> PhaseTableBuilder<E> {
        PhaseTableBuilder {
            actions: Vec::new(),
            routes: Vec::new(),
            preempt: None,
        }
    }

    /// The action for `entity`.
    pub fn select(&self, entity: &E) -> Option<&Arc<dyn Action<E>>> {
        if let Some((when, idx)) = self.preempt {
            if when(entity) {
                return self.actions.get(idx);
            }
        }
        self.routes
            .get(&entity.phase())
            .and_then(|idx| self.actions.get(*idx))
    }
}

impl<E: Phased> PhaseTableBuilder<E> {
    /// Routes `phases` to `action`.
    pub fn route(mut self, phases: &[E::Phase], action: impl Action<E> + 'static) -> Self {
        let idx = self.actions.len();
        self.actions.push(Arc::new(action));
        self.routes.extend(phases.iter().map(|p| (*p, idx)));
        self
    }

    /// Routes entities matching `when` to the most recently added action,
    /// ahead of phase routing.
    pub fn preempt_last(mut self, when: Preempt<E>) -> Self {
        if let Some(idx) = self.actions.len().checked_sub(1) {
            self.preempt = Some((when, idx));
        }
        self
    }

    /// Validates that every phase is routed exactly once.
    pub fn build(self) -> Result<PhaseTable<E>, DispatchError> {
        let mut routes: HashMap<E::Phase, usize> = HashMap::new();
        for (phase, idx) in &self.routes {
            if let Some(first) = routes.insert(*phase, *idx) {
                return Err(DispatchError::Overlap {
                    phase: phase.to_string(),
                    first: self.actions[first].name(),
                    second: self.actions[*idx].name(),
                });
            }
        }
        if let Some(missing) = <E::Phase as Phase>::ALL
            .iter()
            .find(|p| !routes.contains_key(p))
        {
            return Err(DispatchError::Unrouted(missing.to_string()));
        }
        Ok(PhaseTable {
            actions: self.actions,
            routes,
            preempt: self.preempt,
        })
    }
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome<P> {
    /// The entity no longer exists.
    Missing,
    /// Nothing was written.
    Unchanged { phase: P },
    /// A new version was committed.
    Written { from: P, to: P },
    /// A concurrent write won; retry from a fresh read.
    Requeue,
}

impl<P> TickOutcome<P> {
    pub fn is_write(&self) -> bool {
        matches!(self, TickOutcome::Written { .. })
    }
}

/// Runs ticks for one resource kind.
#[derive(Debug)]
pub struct Dispatcher<E: Phased> {
    table: PhaseTable<E>,
}

impl<E: Phased> Dispatcher<E> {
    pub fn new(table: PhaseTable<E>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PhaseTable<E> {
        &self.table
    }

    /// Loads `key` and reconciles it once.
    #[instrument(skip(self, ctx), fields(kind = E::KIND, key = %key, request_id = %RequestId::new()))]
    pub async fn tick(
        &self,
        ctx: &Context,
        key: &ObjectKey,
    ) -> Result<TickOutcome<E::Phase>, ReconcileError> {
        match ctx.store.get::<E>(key).await? {
            Some(entity) => self.reconcile(ctx, &entity).await,
            None => {
                debug!("object gone, nothing to reconcile");
                Ok(TickOutcome::Missing)
            }
        }
    }

    /// Reconciles an already loaded entity once.
    pub async fn reconcile(
        &self,
        ctx: &Context,
        entity: &E,
    ) -> Result<TickOutcome<E::Phase>, ReconcileError> {
        let from = entity.phase();
        let Some(action) = self.table.select(entity) else {
            warn!(phase = %from, "no action routed for phase");
            return Ok(TickOutcome::Unchanged { phase: from });
        };
        debug!(action = action.name(), phase = %from, "invoking action");

        let target = match action.handle(ctx, entity).await {
            Ok(Outcome::Updated(target)) if target != *entity => target,
            Ok(_) => return Ok(TickOutcome::Unchanged { phase: from }),
            Err(e) if e.is_conflict() => {
                debug!(action = action.name(), error = %e, "conflict during action, requeueing");
                return Ok(TickOutcome::Requeue);
            }
            Err(e) => return Err(e),
        };

        match ctx.store.update(&target).await {
            Ok(_) => {}
            Err(e @ StoreError::Conflict { .. }) => {
                debug!(error = %e, "stale write rejected, requeueing");
                return Ok(TickOutcome::Requeue);
            }
            Err(e) => return Err(e.into()),
        }

        let to = target.phase();
        if to != from {
            info!(phase_from = %from, phase_to = %to, "state transition");
        }
        Ok(TickOutcome::Written { from, to })
    }
}

/// Action that never changes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

#[async_trait]
impl<E: Phased> Action<E> for Noop {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn handle(&self, _ctx: &Context, _entity: &E) -> Result<Outcome<E>, ReconcileError> {
        Ok(Outcome::Unchanged)
    }
}
