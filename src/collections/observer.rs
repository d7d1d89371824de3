use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

/// Handle returned by [`ObserverList::register`]; pass it back to
/// [`ObserverList::deregister`] to drop the callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

/// Mutex-guarded list of event callbacks.
///
/// Dispatch snapshots the callback list, then runs each callback outside the
/// lock so observers may re-enter the list (or the structures that own it).
/// A panicking observer is logged and dropped from that dispatch; it never
/// unwinds into the emitter.
pub struct ObserverList<E> {
    observers: Mutex<Vec<(u64, Arc<dyn Fn(&E) + Send + Sync>)>>,
    next_token: AtomicU64,
}

impl<E> ObserverList<E> {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn register(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> ObserverToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((token, Arc::new(callback)));
        ObserverToken(token)
    }

    pub fn deregister(&self, token: ObserverToken) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(id, _)| *id != token.0);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }

    pub fn clear(&self) {
        self.observers.lock().clear();
    }

    /// Invoke every registered callback with `event`.
    pub fn notify(&self, event: &E) {
        let snapshot: Vec<Arc<dyn Fn(&E) + Send + Sync>> = {
            let observers = self.observers.lock();
            if observers.is_empty() {
                return;
            }
            observers.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!("observer callback panicked during event dispatch; dropping the panic");
            }
        }
    }
}

impl<E> Default for ObserverList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for ObserverList<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("len", &self.len())
            .finish()
    }
}
