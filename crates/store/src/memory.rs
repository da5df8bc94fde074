//! In-memory store with optimistic concurrency and finalizer-aware deletion.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use tether_core::{
    LabelSelector, ObjectKey, Resource, StoreClient, StoreError, Uid, WatchEvent, WatchSource,
};
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::debug;

type Result<T> = std::result::Result<T, StoreError>;

/// Characters used for generated name suffixes. No vowels, so suffixes never
/// spell words.
const SUFFIX_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";
const SUFFIX_LEN: usize = 5;
const WATCH_CAPACITY: usize = 1024;

/// Kind of write issued against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    Create,
    Update,
    UpdateStatus,
    Delete,
}

impl std::fmt::Display for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::UpdateStatus => write!(f, "update status of"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One attempted write, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub op: WriteOp,
    pub key: ObjectKey,
    /// Identity the write was issued as; `None` for the store's own client.
    pub identity: Option<String>,
    pub succeeded: bool,
}

/// Which identities may write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WritePolicy {
    #[default]
    AllowAll,
    /// Only the listed impersonated identities may write.
    AllowOnly(BTreeSet<String>),
}

impl WritePolicy {
    fn permits(&self, identity: Option<&str>) -> bool {
        match self {
            Self::AllowAll => true,
            Self::AllowOnly(allowed) => identity.is_some_and(|id| allowed.contains(id)),
        }
    }
}

struct Shared<R: Resource> {
    objects: RwLock<BTreeMap<ObjectKey, R>>,
    version: AtomicU64,
    events: broadcast::Sender<WatchEvent<R>>,
    policy: RwLock<WritePolicy>,
    writes: RwLock<Vec<WriteRecord>>,
    faults: Mutex<Vec<(WriteOp, StoreError)>>,
}

/// In-memory store for one kind of object.
///
/// Clones share state. Handles returned by
/// [`with_identity`](StoreClient::with_identity) share state too and tag
/// their writes with the identity.
pub struct InMemoryStore<R: Resource> {
    shared: Arc<Shared<R>>,
    identity: Option<String>,
}

impl<R: Resource> Clone for InMemoryStore<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            identity: self.identity.clone(),
        }
    }
}

impl<R: Resource> Default for InMemoryStore<R> {
    fn default() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                objects: RwLock::new(BTreeMap::new()),
                version: AtomicU64::new(0),
                events,
                policy: RwLock::new(WritePolicy::AllowAll),
                writes: RwLock::new(Vec::new()),
                faults: Mutex::new(Vec::new()),
            }),
            identity: None,
        }
    }
}

impl<R: Resource> InMemoryStore<R> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Identity this handle writes as.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Replace the write policy.
    pub async fn set_write_policy(&self, policy: WritePolicy) {
        *self.shared.policy.write().await = policy;
    }

    /// Fail the next write of kind `op` with `error`.
    pub async fn fail_next(&self, op: WriteOp, error: StoreError) {
        self.shared.faults.lock().await.push((op, error));
    }

    /// Every write attempted so far.
    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.shared.writes.read().await.clone()
    }

    /// Forget the write history.
    pub async fn clear_writes(&self) {
        self.shared.writes.write().await.clear();
    }

    /// All stored objects in key order.
    pub async fn objects(&self) -> Vec<R> {
        self.shared.objects.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.shared.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shared.objects.read().await.is_empty()
    }

    fn next_version(&self) -> u64 {
        self.shared.version.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    fn publish(&self, event: WatchEvent<R>) {
        // No subscribers is fine.
        self.shared.events.send(event).ok();
    }

    /// Record the attempt and apply policy and injected faults.
    async fn admit(&self, op: WriteOp, key: &ObjectKey) -> Result<()> {
        let verdict = self.check_policy(op, key).await;
        let verdict = match verdict {
            Ok(()) => self.take_fault(op).await.map_or(Ok(()), Err),
            Err(e) => Err(e),
        };
        if verdict.is_err() {
            self.record(op, key, false).await;
        }
        verdict
    }

    async fn check_policy(&self, op: WriteOp, key: &ObjectKey) -> Result<()> {
        if self.shared.policy.read().await.permits(self.identity.as_deref()) {
            return Ok(());
        }
        Err(StoreError::forbidden(
            self.identity.as_deref().unwrap_or("<store client>"),
            op.to_string(),
            R::kind(),
            key.to_string(),
        ))
    }

    async fn take_fault(&self, op: WriteOp) -> Option<StoreError> {
        let mut faults = self.shared.faults.lock().await;
        let position = faults.iter().position(|(o, _)| *o == op)?;
        Some(faults.remove(position).1)
    }

    async fn record(&self, op: WriteOp, key: &ObjectKey, succeeded: bool) {
        self.shared.writes.write().await.push(WriteRecord {
            op,
            key: key.clone(),
            identity: self.identity.clone(),
            succeeded,
        });
    }

    async fn finish<T>(&self, op: WriteOp, key: &ObjectKey, result: Result<T>) -> Result<T> {
        self.record(op, key, result.is_ok()).await;
        result
    }

    fn check_preconditions(stored: &R, incoming: &R) -> Result<()> {
        let key = stored.meta().key();
        let wanted = incoming.meta().resource_version;
        let actual = stored.meta().resource_version;
        if wanted != 0 && wanted != actual {
            return Err(StoreError::conflict(
                R::kind(),
                key.to_string(),
                format!("resource version {wanted} is stale, stored version is {actual}"),
            ));
        }
        if let (Some(wanted), Some(actual)) = (incoming.meta().uid, stored.meta().uid) {
            if wanted != actual {
                return Err(StoreError::conflict(
                    R::kind(),
                    key.to_string(),
                    format!("uid {wanted} does not match stored uid {actual}"),
                ));
            }
        }
        Ok(())
    }

    fn insert_created(&self, objects: &mut BTreeMap<ObjectKey, R>, obj: &R) -> Result<R> {
        let mut next = obj.clone();
        next.take_status(&R::default());
        let meta = next.meta_mut();
        if meta.name.is_empty() {
            let prefix = meta.generate_name.clone().ok_or_else(|| {
                StoreError::invalid(R::kind(), "name or generate_name is required")
            })?;
            meta.name = format!("{prefix}{}", random_suffix());
        }
        let key = meta.key();
        if objects.contains_key(&key) {
            return Err(StoreError::already_exists(R::kind(), key.to_string()));
        }
        meta.uid = Some(Uid::new());
        meta.resource_version = self.next_version();
        meta.creation_timestamp = Some(Utc::now());
        meta.deletion_timestamp = None;
        meta.store = None;

        objects.insert(key, next.clone());
        self.publish(WatchEvent::Added(next.clone()));
        Ok(next)
    }

    fn apply_update(&self, objects: &mut BTreeMap<ObjectKey, R>, obj: &R) -> Result<R> {
        let key = obj.meta().key();
        let stored = objects
            .get(&key)
            .ok_or_else(|| StoreError::not_found(R::kind(), key.to_string()))?;
        Self::check_preconditions(stored, obj)?;

        let deleting = stored.meta().is_deletion_requested();
        if deleting
            && obj
                .meta()
                .finalizers
                .iter()
                .any(|f| !stored.meta().has_finalizer(f))
        {
            return Err(StoreError::invalid(
                R::kind(),
                format!("cannot add finalizers to '{key}' while it is being deleted"),
            ));
        }

        let mut next = obj.clone();
        next.take_status(stored);
        let meta = next.meta_mut();
        meta.uid = stored.meta().uid;
        meta.creation_timestamp = stored.meta().creation_timestamp;
        meta.deletion_timestamp = stored.meta().deletion_timestamp;
        meta.resource_version = self.next_version();
        meta.store = None;

        if deleting && next.meta().finalizers.is_empty() {
            objects.remove(&key);
            debug!(kind = R::kind(), %key, "Last finalizer removed, object deleted");
            self.publish(WatchEvent::Deleted(next.clone()));
            return Ok(next);
        }

        objects.insert(key, next.clone());
        self.publish(WatchEvent::Modified(next.clone()));
        Ok(next)
    }

    fn apply_status(&self, objects: &mut BTreeMap<ObjectKey, R>, obj: &R) -> Result<R> {
        let key = obj.meta().key();
        let stored = objects
            .get(&key)
            .ok_or_else(|| StoreError::not_found(R::kind(), key.to_string()))?;
        Self::check_preconditions(stored, obj)?;

        let mut next = stored.clone();
        next.take_status(obj);
        next.meta_mut().resource_version = self.next_version();

        objects.insert(key, next.clone());
        self.publish(WatchEvent::Modified(next.clone()));
        Ok(next)
    }

    fn apply_delete(&self, objects: &mut BTreeMap<ObjectKey, R>, obj: &R) -> Result<()> {
        let key = obj.meta().key();
        let stored = objects
            .get(&key)
            .ok_or_else(|| StoreError::not_found(R::kind(), key.to_string()))?;
        Self::check_preconditions(stored, obj)?;

        if stored.meta().finalizers.is_empty() {
            if let Some(removed) = objects.remove(&key) {
                self.publish(WatchEvent::Deleted(removed));
            }
            return Ok(());
        }

        if stored.meta().is_deletion_requested() {
            return Ok(());
        }
        let mut next = stored.clone();
        let meta = next.meta_mut();
        meta.deletion_timestamp = Some(Utc::now());
        meta.resource_version = self.next_version();
        debug!(kind = R::kind(), %key, "Deletion requested, waiting on finalizers");
        objects.insert(key, next.clone());
        self.publish(WatchEvent::Modified(next));
        Ok(())
    }
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .filter_map(|_| SUFFIX_ALPHABET.choose(&mut rng))
        .map(|&b| char::from(b))
        .collect()
}

fn key_of(namespace: Option<&str>, name: &str) -> ObjectKey {
    ObjectKey {
        namespace: namespace.map(ToOwned::to_owned),
        name: name.to_owned(),
    }
}

#[async_trait]
impl<R: Resource> StoreClient<R> for InMemoryStore<R> {
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<R>> {
        let objects = self.shared.objects.read().await;
        Ok(objects.get(&key_of(namespace, name)).cloned())
    }

    async fn list(&self, namespace: Option<&str>, selector: &LabelSelector) -> Result<Vec<R>> {
        let objects = self.shared.objects.read().await;
        Ok(objects
            .values()
            .filter(|o| namespace.is_none_or(|ns| o.meta().namespace.as_deref() == Some(ns)))
            .filter(|o| selector.matches(&o.meta().labels))
            .cloned()
            .collect())
    }

    async fn create(&self, obj: &R) -> Result<R> {
        let requested = obj.meta().key();
        self.admit(WriteOp::Create, &requested).await?;
        let result = {
            let mut objects = self.shared.objects.write().await;
            self.insert_created(&mut objects, obj)
        };
        let key = result.as_ref().map_or(requested, |o| o.meta().key());
        self.finish(WriteOp::Create, &key, result).await
    }

    async fn update(&self, obj: &R) -> Result<R> {
        let key = obj.meta().key();
        self.admit(WriteOp::Update, &key).await?;
        let result = {
            let mut objects = self.shared.objects.write().await;
            self.apply_update(&mut objects, obj)
        };
        self.finish(WriteOp::Update, &key, result).await
    }

    async fn update_status(&self, obj: &R) -> Result<R> {
        let key = obj.meta().key();
        self.admit(WriteOp::UpdateStatus, &key).await?;
        let result = {
            let mut objects = self.shared.objects.write().await;
            self.apply_status(&mut objects, obj)
        };
        self.finish(WriteOp::UpdateStatus, &key, result).await
    }

    async fn delete(&self, obj: &R) -> Result<()> {
        let key = obj.meta().key();
        self.admit(WriteOp::Delete, &key).await?;
        let result = {
            let mut objects = self.shared.objects.write().await;
            self.apply_delete(&mut objects, obj)
        };
        self.finish(WriteOp::Delete, &key, result).await
    }

    fn with_identity(&self, identity: &str) -> Arc<dyn StoreClient<R>> {
        Arc::new(Self {
            shared: Arc::clone(&self.shared),
            identity: Some(identity.to_owned()),
        })
    }
}

impl<R: Resource> WatchSource<R> for InMemoryStore<R> {
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent<R>> {
        self.shared.events.subscribe()
    }
}
