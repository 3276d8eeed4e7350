use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

type StoredValue = Box<dyn Any + Send + Sync>;

/// Type-erased per-context value map guarded by a read/write lock.
///
/// One store is owned by the context that initialized it and shared by every
/// clone of that context. The lock is held only for the duration of a map
/// read or write, never across I/O.
#[derive(Default)]
pub struct ValueStore {
    values: RwLock<HashMap<String, StoredValue>>,
}

impl ValueStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, StoredValue>> {
        match self.values.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, StoredValue>> {
        match self.values.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Any + Send + Sync + Clone,
    {
        self.read()
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    fn set(&self, key: String, value: StoredValue) {
        self.write().insert(key, value);
    }
}

impl std::fmt::Debug for ValueStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ValueStore")
            .field("len", &self.read().len())
            .finish()
    }
}

/// Shared read-only store backing reads against contexts that never called
/// [`Context::init`] or [`Context::with_value`]. Constructed once with
/// process lifetime; never written.
fn fallback_store() -> &'static ValueStore {
    static FALLBACK: OnceLock<ValueStore> = OnceLock::new();
    FALLBACK.get_or_init(ValueStore::new)
}

/// Cancellation- and deadline-propagating execution context optionally
/// carrying a shared [`ValueStore`].
///
/// Cloning is cheap and every clone observes the same store: writes through
/// one clone are visible to all siblings. Context derivation is append-only;
/// deriving never mutates the parent.
#[derive(Clone, Default)]
pub struct Context {
    store: Option<Arc<ValueStore>>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Root context: no store, never cancelled, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derived context carrying a new, empty store.
    pub fn init(&self) -> Self {
        Self {
            store: Some(Arc::new(ValueStore::new())),
            ..self.clone()
        }
    }

    /// Inserts `key -> value` into this context's store, auto-initializing a
    /// store when none is present.
    ///
    /// When a store already exists the write goes through the shared store,
    /// so it is visible to every context clone holding it.
    pub fn with_value<T>(&self, key: impl Into<String>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        match &self.store {
            Some(store) => {
                store.set(key.into(), Box::new(value));
                self.clone()
            }
            None => self.init().with_value(key, value),
        }
    }

    /// Typed lookup; `None` when the key is absent or the stored value is not
    /// a `T`. This is a capability probe, not an error.
    pub fn value<T>(&self, key: &str) -> Option<T>
    where
        T: Any + Send + Sync + Clone,
    {
        self.store
            .as_deref()
            .unwrap_or_else(|| fallback_store())
            .get(key)
    }

    /// Derived context with a child cancellation token. Cancelling the
    /// returned token, or any ancestor token, cancels the context.
    pub fn with_cancellation(&self) -> (Self, CancellationToken) {
        let token = self.cancel.child_token();
        let context = Self {
            cancel: token.clone(),
            ..self.clone()
        };
        (context, token)
    }

    /// Derived context whose deadline is the earlier of the parent's and
    /// `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        };
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// `Some` once the context is cancelled or past its deadline.
    pub fn error(&self) -> Option<Error> {
        if self.cancel.is_cancelled() {
            return Some(Error::Canceled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(Error::DeadlineExceeded);
        }
        None
    }

    /// Resolves when the context is done. Never resolves for a root context.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => Error::Canceled,
                _ = tokio::time::sleep_until(deadline) => Error::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                Error::Canceled
            }
        }
    }

    /// Runs `future` until it completes or the context is done, whichever
    /// comes first. Cancellation aborts the in-flight future.
    pub(crate) async fn guard<F>(&self, future: F) -> Result<F::Output, Error>
    where
        F: Future,
    {
        tokio::select! {
            error = self.done() => Err(error),
            output = future => Ok(output),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Context")
            .field("store", &self.store)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}
