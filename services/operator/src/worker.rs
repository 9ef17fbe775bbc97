//! Reconcile worker.
//!
//! Requests flow through an mpsc queue drained by a fixed number of tasks.
//! They come from three sources:
//!
//! - store watch events, fanned out to the objects that depend on the change
//! - a periodic resync of every object
//! - requeues: conflicting ticks (bounded by a [`RetryTracker`]) and builds
//!   that are waiting on time or capacity
//!
//! Waiting is never blocking: a tick that decides "not yet" returns and the
//! object is reconsidered on the next request for it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kforge_api::{
    Build, BuildPhase, Integration, IntegrationKit, IntegrationPhase, IntegrationPlatform,
    KitPhase, ObjectKey, Resource,
};
use kforge_reconcile::{RetryTracker, DEFAULT_MAX_RETRIES, DEFAULT_RESYNC_INTERVAL, DEFAULT_RETRY_WINDOW};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::context::Context;
use crate::controller::Controllers;
use crate::dispatch::TickOutcome;
use crate::error::ReconcileError;
use crate::kits::references_kit;
use crate::store::{LabelSelector, StoreError, WatchChange, WatchEvent};

const QUEUE_CAPACITY: usize = 4096;

/// Delay before re-examining builds waiting for admission or recovery.
pub const DEFAULT_REQUEUE_AFTER: Duration = Duration::from_secs(5);

/// One object to reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Request {
    Integration(ObjectKey),
    Kit(ObjectKey),
    Build(ObjectKey),
}

impl Request {
    pub fn key(&self) -> &ObjectKey {
        match self {
            Request::Integration(k) | Request::Kit(k) | Request::Build(k) => k,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Integration(k) => write!(f, "Integration/{k}"),
            Request::Kit(k) => write!(f, "IntegrationKit/{k}"),
            Request::Build(k) => write!(f, "Build/{k}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub resync_interval: Duration,
    pub requeue_after: Duration,
    pub max_conflict_retries: u32,
    pub retry_window: Duration,
    pub workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            requeue_after: DEFAULT_REQUEUE_AFTER,
            max_conflict_retries: DEFAULT_MAX_RETRIES,
            retry_window: DEFAULT_RETRY_WINDOW,
            workers: 4,
        }
    }
}

/// What processing a request asks for next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Done,
    /// Process the same request again after the delay.
    RequeueAfter(Duration),
}

pub struct Worker {
    ctx: Context,
    controllers: Controllers,
    config: WorkerConfig,
    retries: Mutex<RetryTracker>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Worker {
    pub fn new(ctx: Context, controllers: Controllers, config: WorkerConfig) -> Self {
        let retries = RetryTracker::new(config.max_conflict_retries, config.retry_window);
        Self {
            ctx,
            controllers,
            config,
            retries: Mutex::new(retries),
        }
    }

    /// Runs until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            workers = self.config.workers,
            resync_secs = self.config.resync_interval.as_secs(),
            "Starting reconcile worker"
        );

        let (tx, rx) = mpsc::channel::<Request>(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        let mut events = self.ctx.store.subscribe();

        let mut handles = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers.max(1) {
            let worker = self.clone();
            let rx = rx.clone();
            let tx = tx.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                worker.drain(id, rx, tx, shutdown).await;
            }));
        }

        let mut interval = tokio::time::interval(self.config.resync_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.resync().await {
                        Ok(requests) => enqueue(&tx, requests).await,
                        Err(e) => error!(error = %e, "resync failed"),
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => match self.fan_out(&event).await {
                        Ok(requests) => enqueue(&tx, requests).await,
                        Err(e) => error!(error = %e, "watch fan-out failed"),
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "watch lagged, resyncing");
                        interval.reset_immediately();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("watch closed");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reconcile worker shutting down");
                        break;
                    }
                }
            }
        }

        drop(tx);
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked");
            }
        }
    }

    async fn drain(
        self: Arc<Self>,
        id: usize,
        rx: Arc<Mutex<mpsc::Receiver<Request>>>,
        tx: mpsc::Sender<Request>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let request = tokio::select! {
                request = async { rx.lock().await.recv().await } => request,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() { break } else { continue }
                }
            };
            let Some(request) = request else { break };

            match self.process(&request).await {
                Ok(Next::Done) => {}
                Ok(Next::RequeueAfter(delay)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(request).await;
                    });
                }
                Err(e) => error!(worker = id, request = %request, error = %e, "reconcile failed"),
            }
        }
        debug!(worker = id, "worker task stopped");
    }

    /// Processes one request.
    pub async fn process(&self, request: &Request) -> Result<Next, ReconcileError> {
        let c = &self.controllers;
        let ctx = &self.ctx;
        let (requeue, waiting) = match request {
            Request::Integration(key) => {
                let outcome = c.integrations.tick(ctx, key).await?;
                (outcome == TickOutcome::Requeue, false)
            }
            Request::Kit(key) => {
                let outcome = c.kits.tick(ctx, key).await?;
                let waiting = matches!(
                    outcome,
                    TickOutcome::Unchanged { phase: KitPhase::Error }
                        | TickOutcome::Written { to: KitPhase::Error, .. }
                );
                (outcome == TickOutcome::Requeue, waiting)
            }
            Request::Build(key) => {
                let outcome = c.builds.tick(ctx, key).await?;
                let waiting = match outcome {
                    TickOutcome::Unchanged { phase } | TickOutcome::Written { to: phase, .. } => {
                        matches!(
                            phase,
                            BuildPhase::Scheduling
                                | BuildPhase::Failed
                                | BuildPhase::Pending
                                | BuildPhase::Running
                        )
                    }
                    _ => false,
                };
                (outcome == TickOutcome::Requeue, waiting)
            }
        };

        let id = request.to_string();
        let mut retries = self.retries.lock().await;
        if requeue {
            if retries.record_failure(&id) {
                warn!(request = %request, "conflict retries exhausted, waiting for next event");
                retries.clear(&id);
                return Ok(Next::Done);
            }
            debug!(request = %request, "conflict, requeueing");
            return Ok(Next::RequeueAfter(Duration::ZERO));
        }
        retries.clear(&id);
        drop(retries);

        if waiting {
            return Ok(Next::RequeueAfter(self.config.requeue_after));
        }
        Ok(Next::Done)
    }

    /// Requests for every stored object.
    pub async fn resync(&self) -> Result<Vec<Request>, StoreError> {
        let store = &self.ctx.store;
        let all = LabelSelector::all();
        let mut requests = Vec::new();
        requests.extend(
            store
                .list::<Integration>(None, &all)
                .await?
                .iter()
                .map(|o| Request::Integration(o.key())),
        );
        requests.extend(
            store
                .list::<IntegrationKit>(None, &all)
                .await?
                .iter()
                .map(|o| Request::Kit(o.key())),
        );
        requests.extend(
            store
                .list::<Build>(None, &all)
                .await?
                .iter()
                .map(|o| Request::Build(o.key())),
        );
        self.retries.lock().await.prune();
        Ok(requests)
    }

    /// Requests triggered by a store change.
    pub async fn fan_out(&self, event: &WatchEvent) -> Result<Vec<Request>, StoreError> {
        let store = &self.ctx.store;
        let meta = &event.meta;
        let key = meta.key();
        let deleted = event.change == WatchChange::Deleted;
        let mut requests = Vec::new();

        match event.kind {
            k if k == Integration::KIND => {
                if !deleted {
                    requests.push(Request::Integration(key));
                }
            }
            k if k == IntegrationKit::KIND => {
                if !deleted {
                    requests.push(Request::Kit(key.clone()));
                }
                let integrations: Vec<Integration> =
                    store.list(Some(&meta.namespace), &LabelSelector::all()).await?;
                requests.extend(
                    integrations
                        .iter()
                        .filter(|it| references_kit(it, &key))
                        .map(|it| Request::Integration(it.key())),
                );
            }
            k if k == Build::KIND => {
                if !deleted {
                    requests.push(Request::Build(key.clone()));
                }
                if let Some(owner) = meta.controller_owner() {
                    let owner_key = ObjectKey::new(meta.namespace.clone(), owner.name.clone());
                    if owner.kind == Integration::KIND {
                        requests.push(Request::Integration(owner_key));
                    } else if owner.kind == IntegrationKit::KIND {
                        requests.push(Request::Kit(owner_key));
                    }
                }
                // Capacity may have been freed for builds waiting on admission.
                let builds: Vec<Build> =
                    store.list(Some(&meta.namespace), &LabelSelector::all()).await?;
                requests.extend(
                    builds
                        .iter()
                        .filter(|b| b.meta.name != meta.name && b.status.phase == BuildPhase::Scheduling)
                        .map(|b| Request::Build(b.key())),
                );
            }
            k if k == IntegrationPlatform::KIND => {
                // A platform in the operator namespace serves every namespace.
                let namespace = (meta.namespace != self.ctx.operator_namespace)
                    .then_some(meta.namespace.as_str());
                let all = LabelSelector::all();
                let integrations: Vec<Integration> = store.list(namespace, &all).await?;
                requests.extend(
                    integrations
                        .iter()
                        .filter(|it| {
                            matches!(
                                it.status.phase,
                                IntegrationPhase::None | IntegrationPhase::WaitingForPlatform
                            )
                        })
                        .map(|it| Request::Integration(it.key())),
                );
                let kits: Vec<IntegrationKit> = store.list(namespace, &all).await?;
                requests.extend(
                    kits.iter()
                        .filter(|k| k.status.phase == KitPhase::WaitingForPlatform)
                        .map(|k| Request::Kit(k.key())),
                );
                let builds: Vec<Build> = store.list(namespace, &all).await?;
                requests.extend(
                    builds
                        .iter()
                        .filter(|b| b.status.phase == BuildPhase::WaitingForPlatform)
                        .map(|b| Request::Build(b.key())),
                );
            }
            _ => {}
        }

        requests.sort();
        requests.dedup();
        Ok(requests)
    }
}

async fn enqueue(tx: &mpsc::Sender<Request>, requests: Vec<Request>) {
    for request in requests {
        if tx.send(request).await.is_err() {
            return;
        }
    }
}
