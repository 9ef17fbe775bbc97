//! In-memory resource store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kforge_api::{ObjectKey, ObjectMeta};
use kforge_id::ResourceVersion;
use kforge_reconcile::Clock;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::{LabelSelector, ResourceStore, StoreError, WatchChange, WatchEvent};

const WATCH_CAPACITY: usize = 1024;

type Slot = (&'static str, ObjectKey);

/// Store keeping every object as a JSON document in memory.
///
/// Creation timestamps come from the injected clock.
pub struct MemoryStore {
    objects: RwLock<BTreeMap<Slot, Value>>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<WatchEvent>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            clock,
            events,
        }
    }

    fn publish(&self, kind: &'static str, change: WatchChange, meta: ObjectMeta) {
        // No subscribers is fine.
        let _ = self.events.send(WatchEvent { kind, change, meta });
    }
}

fn read_meta(object: &Value) -> Result<ObjectMeta, StoreError> {
    let meta = object.get("meta").cloned().unwrap_or(Value::Null);
    Ok(serde_json::from_value(meta)?)
}

fn write_meta(object: &mut Value, meta: &ObjectMeta) -> Result<(), StoreError> {
    let meta = serde_json::to_value(meta)?;
    if let Value::Object(map) = object {
        map.insert("meta".to_string(), meta);
    }
    Ok(())
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, kind: &'static str, key: &ObjectKey) -> Result<Option<Value>, StoreError> {
        let objects = self.objects.read().await;
        Ok(objects.get(&(kind, key.clone())).cloned())
    }

    async fn list(
        &self,
        kind: &'static str,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<Value>, StoreError> {
        let objects = self.objects.read().await;
        let mut out = Vec::new();
        for ((k, key), object) in objects.iter() {
            if *k != kind || namespace.is_some_and(|ns| ns != key.namespace) {
                continue;
            }
            if selector.matches(&read_meta(object)?.labels) {
                out.push(object.clone());
            }
        }
        Ok(out)
    }

    async fn create(&self, kind: &'static str, mut object: Value) -> Result<Value, StoreError> {
        let mut meta = read_meta(&object)?;
        let key = meta.key();

        let mut objects = self.objects.write().await;
        if objects.contains_key(&(kind, key.clone())) {
            return Err(StoreError::AlreadyExists { kind, key });
        }

        meta.resource_version = ResourceVersion::FIRST;
        meta.creation_timestamp = Some(self.clock.now());
        meta.deletion_timestamp = None;
        write_meta(&mut object, &meta)?;

        objects.insert((kind, key.clone()), object.clone());
        drop(objects);

        debug!(kind, key = %key, "object created");
        self.publish(kind, WatchChange::Added, meta);
        Ok(object)
    }

    async fn update(&self, kind: &'static str, mut object: Value) -> Result<Value, StoreError> {
        let mut meta = read_meta(&object)?;
        let key = meta.key();
        let slot = (kind, key.clone());

        let mut objects = self.objects.write().await;
        let Some(current) = objects.get(&slot) else {
            return Err(StoreError::NotFound { kind, key });
        };
        let current_meta = read_meta(current)?;
        if current_meta.resource_version != meta.resource_version {
            return Err(StoreError::Conflict {
                kind,
                key,
                expected: meta.resource_version,
                actual: current_meta.resource_version,
            });
        }

        meta.creation_timestamp = current_meta.creation_timestamp;
        meta.deletion_timestamp = current_meta.deletion_timestamp;
        meta.resource_version = current_meta.resource_version.next();
        write_meta(&mut object, &meta)?;

        if meta.deletion_timestamp.is_some() && meta.finalizers.is_empty() {
            objects.remove(&slot);
            drop(objects);
            debug!(kind, key = %key, "last finalizer removed, object deleted");
            self.publish(kind, WatchChange::Deleted, meta);
            return Ok(object);
        }

        objects.insert(slot, object.clone());
        drop(objects);
        self.publish(kind, WatchChange::Modified, meta);
        Ok(object)
    }

    async fn delete(&self, kind: &'static str, key: &ObjectKey) -> Result<bool, StoreError> {
        let slot = (kind, key.clone());
        let mut objects = self.objects.write().await;
        let Some(current) = objects.get_mut(&slot) else {
            return Ok(false);
        };
        let mut meta = read_meta(current)?;

        if meta.finalizers.is_empty() {
            objects.remove(&slot);
            drop(objects);
            debug!(kind, key = %key, "object deleted");
            self.publish(kind, WatchChange::Deleted, meta);
            return Ok(true);
        }

        if meta.deletion_timestamp.is_none() {
            meta.deletion_timestamp = Some(self.clock.now());
            meta.resource_version = meta.resource_version.next();
            write_meta(current, &meta)?;
            drop(objects);
            debug!(kind, key = %key, "object marked for deletion");
            self.publish(kind, WatchChange::Modified, meta);
        }
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
