//! Collapses concurrent calls for the same key into one execution.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Call<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// Per-key registry of in-flight calls.
///
/// The first caller for a key creates the call; callers arriving while it is
/// in flight await the same shared future and get a clone of its result,
/// error included. The call is driven by whichever waiter polls it, so a
/// cancelled first caller does not strand the others. Once the call
/// completes the key is free again and the next caller starts a new one.
pub struct SingleFlight<K, V, E> {
    calls: Mutex<HashMap<K, (u64, Call<V, E>)>>,
    next_id: AtomicU64,
}

impl<K, V, E> Default for SingleFlight<K, V, E> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, (u64, Call<V, E>)>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` for `key` unless a call for `key` is already in flight, in
    /// which case wait for that call instead.
    pub async fn run<F, Fut>(&self, key: K, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (id, call) = {
            let mut calls = self.lock();
            match calls.get(&key) {
                Some((id, call)) => (*id, call.clone()),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let call = f().boxed().shared();
                    calls.insert(key.clone(), (id, call.clone()));
                    (id, call)
                }
            }
        };

        let result = call.await;

        let mut calls = self.lock();
        if calls.get(&key).is_some_and(|(current, _)| *current == id) {
            calls.remove(&key);
        }
        result
    }

    /// Detach the in-flight call for `key`, if any.
    ///
    /// Callers already waiting on it still get its result; the next caller
    /// starts a new call.
    pub fn forget(&self, key: &K) {
        self.lock().remove(key);
    }

    /// Number of keys with a call in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }
}
