use crate::cache::SecretCache;
use crate::events::{EventBus, SecretRefreshRequested};
use crate::policy::RefreshPolicy;
use crate::resolver::SecretResolver;
use crate::schedule::TickWorker;
use crate::types::{AccessCredential, SecretReference};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct RefreshContext {
    policy: Arc<dyn RefreshPolicy>,
    credential: AccessCredential,
}

struct CoordinatorState {
    resolver: Arc<SecretResolver>,
    cache: Arc<dyn SecretCache>,
    events: Arc<EventBus>,
    contexts: Mutex<HashMap<SecretReference, RefreshContext>>,
}

impl CoordinatorState {
    fn trigger(&self, reference: &SecretReference, reason: &str) -> bool {
        let context = self.contexts.lock().unwrap().get(reference).cloned();
        let Some(context) = context else {
            return false;
        };

        self.events
            .publish(SecretRefreshRequested::new(reference.clone(), reason));
        if let Err(err) = self.resolver.refresh(reference, &context.credential) {
            tracing::warn!(reference = %reference, error = %err, "coordinated refresh failed");
        }
        true
    }

    fn sweep(&self) {
        let snapshot: Vec<(SecretReference, RefreshContext)> = self
            .contexts
            .lock()
            .unwrap()
            .iter()
            .map(|(reference, context)| (reference.clone(), context.clone()))
            .collect();

        for (reference, context) in snapshot {
            let cached = self.cache.get(&reference);
            if context.policy.is_refresh_needed(&reference, cached.as_ref()) {
                self.trigger(&reference, "scheduled sweep");
            }
        }
    }
}

/// Process-wide orchestrator of refresh policies and external refresh
/// requests.
///
/// Keeps the policy and credential bound to each registered reference and
/// runs a low-frequency sweep that re-fetches whatever the policies report
/// as needing a refresh. Fetch errors on these background paths are logged
/// and never raised.
pub struct RefreshCoordinator {
    state: Arc<CoordinatorState>,
    sweep_interval: Duration,
    worker: TickWorker,
}

impl RefreshCoordinator {
    /// Construct a coordinator sweeping at the default one-minute interval.
    pub fn new(
        resolver: Arc<SecretResolver>,
        cache: Arc<dyn SecretCache>,
        events: Arc<EventBus>,
    ) -> Self {
        Self::with_sweep_interval(resolver, cache, events, DEFAULT_SWEEP_INTERVAL)
    }

    /// Construct a coordinator with a custom sweep interval.
    pub fn with_sweep_interval(
        resolver: Arc<SecretResolver>,
        cache: Arc<dyn SecretCache>,
        events: Arc<EventBus>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            state: Arc::new(CoordinatorState {
                resolver,
                cache,
                events,
                contexts: Mutex::new(HashMap::new()),
            }),
            sweep_interval,
            worker: TickWorker::new(),
        }
    }

    /// Bind a policy and credential to a reference for coordinated
    /// refreshes.
    pub fn register_secret(
        &self,
        reference: SecretReference,
        policy: Arc<dyn RefreshPolicy>,
        credential: AccessCredential,
    ) {
        self.state
            .contexts
            .lock()
            .unwrap()
            .insert(reference, RefreshContext { policy, credential });
    }

    /// Forget a registered reference.
    pub fn unregister_secret(&self, reference: &SecretReference) {
        self.state.contexts.lock().unwrap().remove(reference);
    }

    /// Request a refresh for a registered reference.
    ///
    /// Returns false when the reference is unregistered; otherwise
    /// publishes a refresh-requested event, invokes the resolver, swallows
    /// any fetch error, and returns true.
    pub fn trigger_refresh(&self, reference: &SecretReference, reason: &str) -> bool {
        self.state.trigger(reference, reason)
    }

    /// Entry point for externally received refresh-request events (e.g.
    /// from a webhook adapter).
    pub fn handle_refresh_event(&self, event: &SecretRefreshRequested) {
        let reference = event.reference();
        let context = self.state.contexts.lock().unwrap().get(reference).cloned();
        let Some(context) = context else {
            return;
        };

        if let Err(err) = self.state.resolver.refresh(reference, &context.credential) {
            tracing::warn!(reference = %reference, error = %err, "external refresh failed");
        }
    }

    /// Start the background sweep. Idempotent.
    pub fn start(&self) {
        let state = Arc::clone(&self.state);
        self.worker
            .start(self.sweep_interval, self.sweep_interval, move || {
                state.sweep();
            });
    }

    /// Stop the background sweep, waiting for in-flight work to finish.
    pub fn stop(&self) {
        self.worker.stop();
    }

    /// Whether the sweep worker is running.
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}
