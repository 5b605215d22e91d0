//! In-flight request registry
//!
//! Maps a cache key to the shared future of the retrieval currently running
//! for it, so concurrent callers for the same key await one operation instead
//! of issuing their own. A registered operation removes its own entry when it
//! settles, whether it succeeded or failed, and is driven to completion on the
//! runtime even if every caller stops waiting.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Cloneable handle to a pending retrieval
pub type SharedResult<T> = Shared<BoxFuture<'static, T>>;

struct Slot<T: Clone> {
    id: u64,
    future: SharedResult<T>,
}

/// Registry of pending retrievals keyed by cache key
pub struct InflightRegistry<T: Clone> {
    slots: Arc<Mutex<HashMap<String, Slot<T>>>>,
    next_id: Arc<AtomicU64>,
}

impl<T: Clone> Clone for InflightRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T: Clone> Default for InflightRegistry<T> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<T: Clone> fmt::Debug for InflightRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InflightRegistry")
            .field("keys", &slots.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<T> InflightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a retrieval is pending for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Handle to the pending retrieval for `key`, if any
    pub fn get(&self, key: &str) -> Option<SharedResult<T>> {
        self.lock().get(key).map(|slot| slot.future.clone())
    }

    /// Number of pending retrievals
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers `future` as the pending retrieval for `key`
    ///
    /// Replaces any retrieval already registered under the key; the replaced
    /// one keeps running but no longer deregisters anything.
    pub fn register<F>(&self, key: &str, future: F) -> SharedResult<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let shared = {
            let mut slots = self.lock();
            self.insert(&mut slots, key, future)
        };
        drive(shared.clone());
        shared
    }

    /// Returns the pending retrieval for `key`, or registers one built by
    /// `make` if there is none
    ///
    /// The check and the registration happen under one lock, so two callers
    /// can never both become the leader for a key.
    ///
    /// # Returns
    /// The shared handle and `true` if this call registered it
    pub fn join_or_register<F, M>(&self, key: &str, make: M) -> (SharedResult<T>, bool)
    where
        F: Future<Output = T> + Send + 'static,
        M: FnOnce() -> F,
    {
        let shared = {
            let mut slots = self.lock();
            if let Some(slot) = slots.get(key) {
                debug!(cache_key = %key, "Joining in-flight request");
                return (slot.future.clone(), false);
            }
            self.insert(&mut slots, key, make())
        };
        drive(shared.clone());
        (shared, true)
    }

    fn insert<F>(
        &self,
        slots: &mut HashMap<String, Slot<T>>,
        key: &str,
        future: F,
    ) -> SharedResult<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.slots);
        let owned_key = key.to_string();

        let shared = async move {
            let output = future.await;
            let mut slots = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.get(&owned_key).is_some_and(|slot| slot.id == id) {
                slots.remove(&owned_key);
            }
            output
        }
        .boxed()
        .shared();

        slots.insert(
            key.to_string(),
            Slot {
                id,
                future: shared.clone(),
            },
        );
        shared
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Polls the retrieval to completion even if all callers drop their handles
fn drive<T>(shared: SharedResult<T>)
where
    T: Clone + Send + Sync + 'static,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            shared.await;
        });
    }
}
