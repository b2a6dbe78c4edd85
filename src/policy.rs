use crate::cache::SecretCache;
use crate::events::{EventBus, SecretRefreshRequested};
use crate::provider::SecretProvider;
use crate::schedule::TickWorker;
use crate::types::{AccessCredential, Secret, SecretReference};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Strategy deciding when a secret should be re-fetched.
///
/// Policies are shared across aggregates, so every operation takes `&self`
/// and implementations use interior mutability.
pub trait RefreshPolicy: Send + Sync {
    /// Bind the policy to the provider and cache it drives. Idempotent:
    /// the first binding wins and later calls are no-ops.
    fn apply(&self, provider: Arc<dyn SecretProvider>, cache: Arc<dyn SecretCache>);

    /// Cheap predicate consulted before honoring a cache hit.
    fn is_refresh_needed(&self, reference: &SecretReference, cached: Option<&Secret>) -> bool;

    /// Request an out-of-band refresh. Publishes a refresh-requested event
    /// and updates the cache; fetch failures are logged, never raised.
    fn trigger_refresh(&self, reference: &SecretReference);

    /// Bind a credential the policy uses to refresh `reference`.
    fn register_secret(&self, reference: SecretReference, credential: AccessCredential);

    /// Forget a previously registered reference.
    fn unregister_secret(&self, reference: &SecretReference);

    /// Start any background worker. Idempotent.
    fn start(&self);

    /// Stop background work; returns only after it has ceased.
    fn stop(&self);

    /// Whether the policy is currently running.
    fn is_running(&self) -> bool;
}

#[derive(Clone)]
struct Bindings {
    provider: Arc<dyn SecretProvider>,
    cache: Arc<dyn SecretCache>,
}

/// State shared between a policy handle and its background worker.
struct PolicyCore {
    events: Arc<EventBus>,
    credentials: Mutex<HashMap<SecretReference, AccessCredential>>,
    bindings: Mutex<Option<Bindings>>,
}

impl PolicyCore {
    fn new(events: Arc<EventBus>) -> Self {
        Self {
            events,
            credentials: Mutex::new(HashMap::new()),
            bindings: Mutex::new(None),
        }
    }

    fn bind(&self, provider: Arc<dyn SecretProvider>, cache: Arc<dyn SecretCache>) {
        let mut bindings = self.bindings.lock().unwrap();
        if bindings.is_none() {
            *bindings = Some(Bindings { provider, cache });
        }
    }

    fn bindings(&self) -> Option<Bindings> {
        self.bindings.lock().unwrap().clone()
    }

    fn stale_or_missing(&self, reference: &SecretReference, cached: Option<&Secret>) -> bool {
        if cached.is_none() {
            return true;
        }
        match self.bindings() {
            Some(bindings) => bindings.cache.is_stale(reference),
            None => true,
        }
    }

    /// Fetch and re-cache one reference, reporting failures to the log.
    fn refresh(&self, reference: &SecretReference, reason: &str) {
        let Some(bindings) = self.bindings() else {
            return;
        };
        let credential = self.credentials.lock().unwrap().get(reference).cloned();
        let Some(credential) = credential else {
            return;
        };

        self.events
            .publish(SecretRefreshRequested::new(reference.clone(), reason));

        match bindings.provider.fetch_secret(reference, &credential) {
            Ok(secret) => bindings.cache.put(secret),
            Err(err) => {
                tracing::warn!(reference = %reference, error = %err, "refresh failed");
            }
        }
    }

    fn registered(&self) -> Vec<SecretReference> {
        self.credentials.lock().unwrap().keys().cloned().collect()
    }
}

/// Polls every registered reference on a fixed interval, refreshing the
/// ones whose cache entry is stale or missing.
pub struct PollingRefreshPolicy {
    core: Arc<PolicyCore>,
    interval: Duration,
    worker: TickWorker,
}

impl PollingRefreshPolicy {
    /// Construct a policy ticking at the default one-minute interval.
    pub fn new(events: Arc<EventBus>) -> Self {
        Self::with_interval(DEFAULT_POLL_INTERVAL, events)
    }

    /// Construct a policy ticking at the given interval.
    pub fn with_interval(interval: Duration, events: Arc<EventBus>) -> Self {
        Self {
            core: Arc::new(PolicyCore::new(events)),
            interval,
            worker: TickWorker::new(),
        }
    }
}

impl RefreshPolicy for PollingRefreshPolicy {
    fn apply(&self, provider: Arc<dyn SecretProvider>, cache: Arc<dyn SecretCache>) {
        self.core.bind(provider, cache);
    }

    fn is_refresh_needed(&self, reference: &SecretReference, cached: Option<&Secret>) -> bool {
        self.core.stale_or_missing(reference, cached)
    }

    fn trigger_refresh(&self, reference: &SecretReference) {
        self.core.refresh(reference, "manual refresh");
    }

    fn register_secret(&self, reference: SecretReference, credential: AccessCredential) {
        self.core
            .credentials
            .lock()
            .unwrap()
            .insert(reference, credential);
    }

    fn unregister_secret(&self, reference: &SecretReference) {
        self.core.credentials.lock().unwrap().remove(reference);
    }

    fn start(&self) {
        let core = Arc::clone(&self.core);
        self.worker.start(Duration::ZERO, self.interval, move || {
            for reference in core.registered() {
                let cached = core
                    .bindings()
                    .and_then(|bindings| bindings.cache.get(&reference));
                if core.stale_or_missing(&reference, cached.as_ref()) {
                    core.refresh(&reference, "scheduled poll");
                }
            }
        });
    }

    fn stop(&self) {
        self.worker.stop();
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

/// Event-driven policy: external notification channels report changed
/// references, which are refreshed immediately and marked dirty until a
/// fetch succeeds.
pub struct NotifyRefreshPolicy {
    core: Arc<PolicyCore>,
    dirty: Mutex<HashSet<SecretReference>>,
    running: AtomicBool,
}

impl NotifyRefreshPolicy {
    /// Construct an idle notification-driven policy.
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            core: Arc::new(PolicyCore::new(events)),
            dirty: Mutex::new(HashSet::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Entry point for external change notifications (webhooks, queues).
    pub fn notify_changed(&self, reference: &SecretReference) {
        self.dirty.lock().unwrap().insert(reference.clone());
        if self.running.load(Ordering::SeqCst) {
            self.trigger_refresh(reference);
        }
    }
}

impl RefreshPolicy for NotifyRefreshPolicy {
    fn apply(&self, provider: Arc<dyn SecretProvider>, cache: Arc<dyn SecretCache>) {
        self.core.bind(provider, cache);
    }

    fn is_refresh_needed(&self, reference: &SecretReference, cached: Option<&Secret>) -> bool {
        self.dirty.lock().unwrap().contains(reference)
            || self.core.stale_or_missing(reference, cached)
    }

    fn trigger_refresh(&self, reference: &SecretReference) {
        self.core.refresh(reference, "change notification");
        self.dirty.lock().unwrap().remove(reference);
    }

    fn register_secret(&self, reference: SecretReference, credential: AccessCredential) {
        self.core
            .credentials
            .lock()
            .unwrap()
            .insert(reference, credential);
    }

    fn unregister_secret(&self, reference: &SecretReference) {
        self.core.credentials.lock().unwrap().remove(reference);
        self.dirty.lock().unwrap().remove(reference);
    }

    fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
