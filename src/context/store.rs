//! In-memory registry of conversation contexts with one async lock per key.

use crate::context::storage::ContextStorage;
use crate::context::types::{Context, ConversationId};
use crate::error::{Result, TricksterError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Process-scoped registry of live contexts, backed by [`ContextStorage`].
///
/// Callers that read-modify-write a context take its [`ContextLease`] via
/// [`lock`](Self::lock) for the whole span. Locks are per key, so unrelated
/// conversations never wait on each other. The map guards are synchronous
/// and are never held across an `.await`.
#[derive(Debug)]
pub struct ContextStore {
    storage: ContextStorage,
    contexts: RwLock<HashMap<ConversationId, Context>>,
    locks: Mutex<HashMap<ConversationId, KeyLock>>,
}

impl ContextStore {
    /// Load every readable record from `storage`.
    ///
    /// # Errors
    ///
    /// Fails only if the record directory exists but cannot be listed.
    pub fn open(storage: ContextStorage) -> Result<Self> {
        let report = storage.load_all()?;
        let contexts: HashMap<ConversationId, Context> = report
            .contexts
            .into_iter()
            .map(|c| (c.conversation_id, c))
            .collect();
        let locks = contexts
            .keys()
            .map(|key| (*key, KeyLock::default()))
            .collect();
        info!(
            loaded = contexts.len(),
            skipped = report.skipped.len(),
            "contexts loaded from {}",
            storage.dir().display()
        );
        Ok(Self {
            storage,
            contexts: RwLock::new(contexts),
            locks: Mutex::new(locks),
        })
    }

    /// Snapshot of the context for `key`.
    #[must_use]
    pub fn get(&self, key: ConversationId) -> Option<Context> {
        self.read_contexts().get(&key).cloned()
    }

    /// Persist `context`, then upsert it in memory.
    ///
    /// Prefer [`ContextLease::put`] when the write depends on a prior read.
    ///
    /// # Errors
    ///
    /// Returns the storage error; memory is left untouched in that case.
    pub async fn put(&self, context: Context) -> Result<()> {
        self.storage.save(&context).await?;
        let key = context.conversation_id;
        self.write_contexts().insert(key, context);
        self.key_lock(key);
        Ok(())
    }

    /// Snapshots of every context matching `predicate`, ordered by key.
    pub fn find(&self, predicate: impl Fn(&Context) -> bool) -> Vec<Context> {
        let mut found: Vec<Context> = self
            .read_contexts()
            .values()
            .filter(|c| predicate(c))
            .cloned()
            .collect();
        found.sort_by_key(|c| c.conversation_id);
        found
    }

    /// Delete `key` from storage and memory.
    ///
    /// The key's lock entry is kept so that a concurrent waiter and any later
    /// re-creation of the same key still share one lock.
    ///
    /// # Errors
    ///
    /// Returns the storage error; memory is left untouched in that case.
    pub async fn remove(&self, key: ConversationId) -> Result<()> {
        self.storage.delete(key).await?;
        self.write_contexts().remove(&key);
        debug!(conversation = key, "context removed");
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_contexts().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for exclusive access to `key`. Released when the lease drops.
    pub async fn lock(&self, key: ConversationId) -> ContextLease<'_> {
        let guard = self.key_lock(key).lock_owned().await;
        ContextLease {
            store: self,
            key,
            _guard: guard,
        }
    }

    fn key_lock(&self, key: ConversationId) -> KeyLock {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(key).or_default())
    }

    fn read_contexts(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ConversationId, Context>> {
        match self.contexts.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_contexts(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ConversationId, Context>> {
        match self.contexts.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[cfg(test)]
    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<ConversationId, KeyLock>> {
        match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Exclusive access to one conversation's context.
///
/// Holding the lease is the only sanctioned way to read-modify-write a
/// context. The lock is released on drop, on every exit path.
pub struct ContextLease<'a> {
    store: &'a ContextStore,
    key: ConversationId,
    _guard: OwnedMutexGuard<()>,
}

impl ContextLease<'_> {
    #[must_use]
    pub fn key(&self) -> ConversationId {
        self.key
    }

    /// Current state of the leased context.
    #[must_use]
    pub fn current(&self) -> Option<Context> {
        self.store.get(self.key)
    }

    /// Persist and publish `context` under the leased key.
    ///
    /// # Errors
    ///
    /// [`TricksterError::Storage`] on a key mismatch or a failed write.
    pub async fn put(&self, context: Context) -> Result<()> {
        if context.conversation_id != self.key {
            return Err(TricksterError::Storage(format!(
                "lease for {} cannot write context {}",
                self.key, context.conversation_id
            )));
        }
        self.store.put(context).await
    }

    /// Delete the leased context.
    ///
    /// # Errors
    ///
    /// Propagates the storage error.
    pub async fn remove(&self) -> Result<()> {
        self.store.remove(self.key).await
    }
}
