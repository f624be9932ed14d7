use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Collapses concurrent computations for the same key into one.
///
/// The first caller for a key runs the computation; callers arriving while it
/// is in flight wait for and share its result. Once it finishes the key is
/// released, so later calls compute afresh. If the leader is cancelled, one
/// of the waiters takes over.
pub struct SingleFlight<K, T> {
    inflight: Mutex<HashMap<K, Arc<OnceCell<T>>>>,
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `compute` for `key` unless it is already running.
    ///
    /// Returns the shared value and whether this caller ran the computation.
    pub async fn run<F, Fut>(&self, key: K, compute: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut inflight = self.inflight.lock();
            inflight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let mut led = false;
        let value = cell
            .get_or_init(|| {
                led = true;
                compute()
            })
            .await
            .clone();

        {
            let mut inflight = self.inflight.lock();
            if inflight.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                inflight.remove(&key);
            }
        }
        (value, led)
    }

    /// Keys with a computation currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}
