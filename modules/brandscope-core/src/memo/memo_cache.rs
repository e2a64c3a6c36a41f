use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::{MemoBuilder, MemoKey};

/// Stand-in lifetime for TTLs too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

type SharedCompute<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

enum Slot<T, E> {
    Ready {
        value: T,
        expires_at: Instant,
    },
    InFlight {
        generation: u64,
        ttl: Duration,
        compute: SharedCompute<T, E>,
    },
}

/// A value served by [`MemoCache::get_or_set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached<T> {
    pub value: T,
    /// False only for the caller whose closure produced the value.
    pub from_cache: bool,
}

/// In-memory memo cache with single-flight semantics.
///
/// - at most one `compute` per key runs at a time; concurrent callers with the
///   same key await the same in-flight future
/// - a completed value is served until its TTL elapses and never after; the
///   stale entry is dropped by the next lookup
/// - failures are never stored: the next call for the key computes afresh
///
/// Entries are replaced wholesale, never mutated in place. Construct one per
/// pipeline (or per test) and share it behind an `Arc`.
pub struct MemoCache<T, E> {
    slots: Mutex<HashMap<MemoKey, Slot<T, E>>>,
    next_generation: AtomicU64,
    default_ttl: Duration,
}

impl<T, E> MemoCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Start a memoized computation keyed by `function_name` + `key`.
    ///
    /// ```ignore
    /// let report = cache.memo("score_v1", &key_input)
    ///     .ttl(Duration::from_secs(3600))
    ///     .get_or(|| async move { evaluate().await })
    ///     .await?;
    /// ```
    pub fn memo<'a, K: Serialize>(
        &'a self,
        function_name: &'a str,
        key: K,
    ) -> MemoBuilder<'a, T, E, K>
    where
        E: From<serde_json::Error>,
    {
        MemoBuilder::new(self, function_name, key)
    }

    /// Serve `key` from cache, join its in-flight computation, or run
    /// `compute` as the single leader for it.
    pub async fn get_or_set<F, Fut>(
        &self,
        key: MemoKey,
        ttl: Duration,
        compute: F,
    ) -> Result<Cached<T>, E>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (shared, generation, leader) = {
            let mut slots = self.lock();
            match slots.get(&key) {
                Some(Slot::Ready { value, expires_at }) if Instant::now() < *expires_at => {
                    debug!(key = %key, "memo hit");
                    return Ok(Cached {
                        value: value.clone(),
                        from_cache: true,
                    });
                }
                Some(Slot::InFlight {
                    generation,
                    compute: shared,
                    ..
                }) => {
                    debug!(key = %key, "memo joining in-flight computation");
                    (shared.clone(), *generation, false)
                }
                _ => {
                    debug!(key = %key, "memo miss");
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let shared = compute().boxed().shared();
                    slots.insert(
                        key.clone(),
                        Slot::InFlight {
                            generation,
                            ttl,
                            compute: shared.clone(),
                        },
                    );
                    (shared, generation, true)
                }
            }
        };

        let result = shared.await;
        self.settle(&key, generation, &result);

        result.map(|value| Cached {
            value,
            from_cache: !leader,
        })
    }

    /// Replace the in-flight slot with the outcome. Whichever waiter wakes
    /// first does it; later calls see a different slot and leave it alone.
    fn settle(&self, key: &MemoKey, generation: u64, result: &Result<T, E>) {
        let mut slots = self.lock();
        let ttl = match slots.get(key) {
            Some(Slot::InFlight {
                generation: current,
                ttl,
                ..
            }) if *current == generation => *ttl,
            _ => return,
        };

        match result {
            Ok(value) => {
                slots.insert(
                    key.clone(),
                    Slot::Ready {
                        value: value.clone(),
                        expires_at: expiry(ttl),
                    },
                );
            }
            Err(_) => {
                debug!(key = %key, "memo computation failed, not caching");
                slots.remove(key);
            }
        }
    }

    /// Drop a key regardless of state. An in-flight computation keeps running
    /// for its current waiters but its result will not be stored.
    pub fn invalidate(&self, key: &MemoKey) {
        self.lock().remove(key);
    }

    /// Delete expired entries. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Ready { expires_at, .. } => now < *expires_at,
            Slot::InFlight { .. } => true,
        });
        before - slots.len()
    }

    /// Number of entries, in-flight ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MemoKey, Slot<T, E>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn expiry(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

impl<T, E> std::fmt::Debug for MemoCache<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}
