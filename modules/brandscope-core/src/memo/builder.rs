use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::{Cached, MemoCache};

/// Content address of a memoized computation: sha256 over the function name
/// and the JSON encoding of its canonicalized input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoKey(String);

impl MemoKey {
    pub fn derive<K: Serialize>(function_name: &str, input: &K) -> Result<Self, serde_json::Error> {
        let input_bytes = serde_json::to_vec(input)?;
        let mut hasher = Sha256::new();
        hasher.update(function_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(&input_bytes);
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // first 12 hex chars are plenty for log correlation
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}

pub struct MemoBuilder<'a, T, E, K> {
    cache: &'a MemoCache<T, E>,
    function_name: &'a str,
    key: K,
    ttl: Option<Duration>,
}

impl<'a, T, E, K> MemoBuilder<'a, T, E, K>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<serde_json::Error> + 'static,
    K: Serialize,
{
    pub(super) fn new(cache: &'a MemoCache<T, E>, function_name: &'a str, key: K) -> Self {
        Self {
            cache,
            function_name,
            key,
            ttl: None,
        }
    }

    /// Set time-to-live. Defaults to the cache's TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Get the cached result or compute it via the provided closure.
    pub async fn get_or<F, Fut>(self, compute: F) -> Result<Cached<T>, E>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = MemoKey::derive(self.function_name, &self.key)?;
        let ttl = self.ttl.unwrap_or(self.cache.default_ttl());
        self.cache.get_or_set(key, ttl, compute).await
    }
}
