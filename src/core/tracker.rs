//! # Task tracker with alive-name bookkeeping.
//!
//! Every long- or short-lived task of the runtime (broadcaster, gateway
//! acceptor, per-connection handlers, subscription sessions) is spawned
//! through a [`Tracker`], so shutdown can wait for all of them.
//!
//! ## Architecture
//! ```text
//! spawn(name, fut) ──► alive[id] = name ──► JoinSet.spawn(fut + AliveGuard)
//!                                                      │
//!                           task ends (ok/panic/abort) ┘──► alive.remove(id)
//!
//! wait(grace):
//!   loop { take JoinSet; join all before deadline }
//!     ├─ set empty       → Ok
//!     └─ deadline passed → Err(alive names)   (then abort the rest)
//! ```
//!
//! ## Rules
//! - Finished tasks are reaped on each `spawn`, so the set doesn't grow with churn.
//! - Tasks spawned while `wait` is joining are picked up by its next pass.
//! - Stuck names are reported sorted.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

type AliveMap = Arc<Mutex<BTreeMap<u64, String>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes its entry from the alive map however the task ends.
struct AliveGuard {
    alive: AliveMap,
    id: u64,
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        lock(&self.alive).remove(&self.id);
    }
}

/// Cloneable handle to the set of tracked tasks.
#[derive(Clone, Default)]
pub struct Tracker {
    set: Arc<Mutex<JoinSet<()>>>,
    alive: AliveMap,
    seq: Arc<AtomicU64>,
}

impl Tracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `fut` as a tracked task named `name`.
    pub fn spawn<F>(&self, name: impl Into<String>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.seq.fetch_add(1, Ordering::Relaxed);
        lock(&self.alive).insert(id, name.into());
        let guard = AliveGuard {
            alive: Arc::clone(&self.alive),
            id,
        };

        let mut set = lock(&self.set);
        while set.try_join_next().is_some() {}
        set.spawn(async move {
            let _guard = guard;
            fut.await;
        });
    }

    /// Sorted names of tasks that have not finished yet.
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.alive).values().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of tasks that have not finished yet.
    pub fn len(&self) -> usize {
        lock(&self.alive).len()
    }

    /// Returns true if no tracked task is running.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for every tracked task to finish within `grace`.
    ///
    /// On timeout, returns the stuck task names and aborts those tasks.
    pub async fn wait(&self, grace: Duration) -> Result<(), Vec<String>> {
        let deadline = Instant::now() + grace;

        loop {
            let mut set = std::mem::take(&mut *lock(&self.set));
            if set.is_empty() {
                return Ok(());
            }

            let done = async { while set.join_next().await.is_some() {} };
            if tokio::time::timeout_at(deadline, done).await.is_err() {
                let stuck = self.snapshot();
                set.abort_all();
                lock(&self.set).abort_all();
                return Err(stuck);
            }
        }
    }
}
