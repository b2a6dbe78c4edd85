use crate::types::{Secret, SecretReference};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_CAPACITY: usize = 256;

/// Thread-safe mapping from reference to cached secret with TTL expiry.
///
/// Implementations never raise for a missing key; lookups of absent or
/// expired entries return `None`.
pub trait SecretCache: Send + Sync {
    /// Return the cached secret iff present and not expired. Expired
    /// entries observed here are dropped.
    fn get(&self, reference: &SecretReference) -> Option<Secret>;
    /// Insert or replace the entry keyed by the secret's source reference.
    fn put(&self, secret: Secret);
    /// Remove one entry.
    fn invalidate(&self, reference: &SecretReference);
    /// Remove all entries.
    fn clear(&self);
    /// Replace the process-lifetime default TTL.
    fn set_default_ttl(&self, ttl: Duration);
    /// Current default TTL.
    fn default_ttl(&self) -> Duration;
    /// Per-reference TTL override; persists across `put`s.
    fn set_ttl(&self, reference: &SecretReference, ttl: Duration);
    /// True iff the entry is absent or expired.
    fn is_stale(&self, reference: &SecretReference) -> bool;
}

impl<T> SecretCache for Box<T>
where
    T: SecretCache + ?Sized,
{
    fn get(&self, reference: &SecretReference) -> Option<Secret> {
        (**self).get(reference)
    }
    fn put(&self, secret: Secret) {
        (**self).put(secret)
    }
    fn invalidate(&self, reference: &SecretReference) {
        (**self).invalidate(reference)
    }
    fn clear(&self) {
        (**self).clear()
    }
    fn set_default_ttl(&self, ttl: Duration) {
        (**self).set_default_ttl(ttl)
    }
    fn default_ttl(&self) -> Duration {
        (**self).default_ttl()
    }
    fn set_ttl(&self, reference: &SecretReference, ttl: Duration) {
        (**self).set_ttl(reference, ttl)
    }
    fn is_stale(&self, reference: &SecretReference) -> bool {
        (**self).is_stale(reference)
    }
}

impl<T> SecretCache for Arc<T>
where
    T: SecretCache + ?Sized,
{
    fn get(&self, reference: &SecretReference) -> Option<Secret> {
        (**self).get(reference)
    }
    fn put(&self, secret: Secret) {
        (**self).put(secret)
    }
    fn invalidate(&self, reference: &SecretReference) {
        (**self).invalidate(reference)
    }
    fn clear(&self) {
        (**self).clear()
    }
    fn set_default_ttl(&self, ttl: Duration) {
        (**self).set_default_ttl(ttl)
    }
    fn default_ttl(&self) -> Duration {
        (**self).default_ttl()
    }
    fn set_ttl(&self, reference: &SecretReference, ttl: Duration) {
        (**self).set_ttl(reference, ttl)
    }
    fn is_stale(&self, reference: &SecretReference) -> bool {
        (**self).is_stale(reference)
    }
}

struct CacheEntry {
    secret: Secret,
    stored_at: Instant,
}

/// In-memory LRU cache for secrets.
///
/// The TTL that applies to an entry is resolved at read time, so
/// [`SecretCache::set_default_ttl`] and [`SecretCache::set_ttl`] take
/// effect for entries already cached.
pub struct InMemorySecretCache {
    entries: Mutex<LruCache<SecretReference, CacheEntry>>,
    ttl_overrides: Mutex<HashMap<SecretReference, Duration>>,
    default_ttl: Mutex<Duration>,
}

impl InMemorySecretCache {
    /// Construct a cache with the default capacity and a 15-minute TTL.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Construct a cache bounded to the provided number of entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let size = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::new(size)),
            ttl_overrides: Mutex::new(HashMap::new()),
            default_ttl: Mutex::new(DEFAULT_TTL),
        }
    }

    fn ttl_for(&self, reference: &SecretReference) -> Duration {
        self.ttl_overrides
            .lock()
            .unwrap()
            .get(reference)
            .copied()
            .unwrap_or_else(|| *self.default_ttl.lock().unwrap())
    }

    fn expired(&self, entry: &CacheEntry, reference: &SecretReference, now: Instant) -> bool {
        now > entry.stored_at + self.ttl_for(reference)
    }

    fn get_at(&self, reference: &SecretReference, now: Instant) -> Option<Secret> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(reference) {
            if !self.expired(entry, reference, now) {
                return Some(entry.secret.clone());
            }
            entries.pop(reference);
        }
        None
    }

    fn put_at(&self, secret: Secret, now: Instant) {
        let reference = secret.metadata().source_ref().clone();
        let mut entries = self.entries.lock().unwrap();
        entries.put(
            reference,
            CacheEntry {
                secret,
                stored_at: now,
            },
        );
    }

    fn is_stale_at(&self, reference: &SecretReference, now: Instant) -> bool {
        let entries = self.entries.lock().unwrap();
        match entries.peek(reference) {
            Some(entry) => self.expired(entry, reference, now),
            None => true,
        }
    }
}

impl Default for InMemorySecretCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretCache for InMemorySecretCache {
    fn get(&self, reference: &SecretReference) -> Option<Secret> {
        self.get_at(reference, Instant::now())
    }

    fn put(&self, secret: Secret) {
        self.put_at(secret, Instant::now());
    }

    fn invalidate(&self, reference: &SecretReference) {
        self.entries.lock().unwrap().pop(reference);
    }

    fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn set_default_ttl(&self, ttl: Duration) {
        *self.default_ttl.lock().unwrap() = ttl;
    }

    fn default_ttl(&self) -> Duration {
        *self.default_ttl.lock().unwrap()
    }

    fn set_ttl(&self, reference: &SecretReference, ttl: Duration) {
        self.ttl_overrides
            .lock()
            .unwrap()
            .insert(reference.clone(), ttl);
    }

    fn is_stale(&self, reference: &SecretReference) -> bool {
        self.is_stale_at(reference, Instant::now())
    }
}
