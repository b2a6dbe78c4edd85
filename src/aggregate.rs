use crate::cache::SecretCache;
use crate::errors::{ConfigurationError, Error};
use crate::events::{EventBus, SecretRefreshed, SecretRolloverDetected};
use crate::policy::RefreshPolicy;
use crate::provider::{ProviderRegistry, SecretProvider};
use crate::types::{AccessCredential, Secret, SecretReference};
use std::sync::{Arc, Mutex};

/// Per-reference read-through and refresh state machine.
///
/// Owns the provider elected for its store type, the shared cache, the
/// credential, and the last retrieved secret used for change detection.
/// At most one fetch is in flight per reference: `fetch_guard` is a
/// single-flight ticket held across the provider call, and concurrent
/// callers that find a stale entry block on it and then re-check the
/// cache, coalescing on the leader's result.
pub struct SecretAggregate {
    reference: SecretReference,
    credential: AccessCredential,
    provider: Arc<dyn SecretProvider>,
    cache: Arc<dyn SecretCache>,
    policy: Option<Arc<dyn RefreshPolicy>>,
    events: Arc<EventBus>,
    last_retrieved: Mutex<Option<Secret>>,
    fetch_guard: Mutex<()>,
}

impl SecretAggregate {
    /// Elect a provider from the registry and bind the optional policy.
    ///
    /// Fails with a configuration error when no registered provider
    /// supports the reference's store type.
    pub(crate) fn new(
        reference: SecretReference,
        credential: AccessCredential,
        registry: &ProviderRegistry,
        cache: Arc<dyn SecretCache>,
        policy: Option<Arc<dyn RefreshPolicy>>,
        events: Arc<EventBus>,
    ) -> Result<Self, Error> {
        let provider = registry.find_for(reference.store_type()).ok_or(
            ConfigurationError::NoProvider {
                store_type: reference.store_type(),
            },
        )?;

        if let Some(policy) = &policy {
            policy.apply(Arc::clone(&provider), Arc::clone(&cache));
            policy.register_secret(reference.clone(), credential.clone());
            if !policy.is_running() {
                policy.start();
            }
        }

        Ok(Self {
            reference,
            credential,
            provider,
            cache,
            policy,
            events,
            last_retrieved: Mutex::new(None),
            fetch_guard: Mutex::new(()),
        })
    }

    /// The reference this aggregate resolves.
    pub fn reference(&self) -> &SecretReference {
        &self.reference
    }

    /// Read path: serve a fresh cache hit, otherwise fetch.
    pub fn get_secret(&self) -> Result<Secret, Error> {
        if let Some(secret) = self.fresh_cached() {
            *self.last_retrieved.lock().unwrap() = Some(secret.clone());
            return Ok(secret);
        }

        let _flight = self.fetch_guard.lock().unwrap();

        // A concurrent refresh may have repopulated the cache while this
        // caller waited for the ticket.
        if let Some(secret) = self.fresh_cached() {
            *self.last_retrieved.lock().unwrap() = Some(secret.clone());
            return Ok(secret);
        }

        self.refresh_holding_guard()
    }

    /// Force a fetch from the provider, bypassing the cache.
    pub fn refresh_secret(&self) -> Result<Secret, Error> {
        let _flight = self.fetch_guard.lock().unwrap();
        self.refresh_holding_guard()
    }

    /// Stop the bound policy's background work, if any.
    pub fn stop(&self) {
        if let Some(policy) = &self.policy {
            if policy.is_running() {
                policy.stop();
            }
        }
    }

    fn fresh_cached(&self) -> Option<Secret> {
        let cached = self.cache.get(&self.reference)?;
        if let Some(policy) = &self.policy {
            if policy.is_refresh_needed(&self.reference, Some(&cached)) {
                return None;
            }
        }
        Some(cached)
    }

    fn refresh_holding_guard(&self) -> Result<Secret, Error> {
        let prior = self.last_retrieved.lock().unwrap().clone();

        let fresh = self
            .provider
            .fetch_secret(&self.reference, &self.credential)?;

        *self.last_retrieved.lock().unwrap() = Some(fresh.clone());
        self.detect_rollover(prior.as_ref(), &fresh);
        self.cache.put(fresh.clone());

        let value_changed = prior
            .as_ref()
            .is_none_or(|p| p.value_bytes() != fresh.value_bytes());
        self.events.publish(SecretRefreshed::new(
            self.reference.clone(),
            fresh.metadata().version(),
            value_changed,
        ));

        Ok(fresh)
    }

    /// Advisory rotation detection for `active`-hinted references: fires
    /// when the inactive sibling is cached and the version moved relative
    /// to the retrieval snapshotted before this fetch.
    fn detect_rollover(&self, prior: Option<&Secret>, fresh: &Secret) {
        if !self.reference.is_active_hint() {
            return;
        }
        let Some(prior) = prior else {
            return;
        };
        let sibling = self.reference.inactive_sibling();
        if self.cache.get(&sibling).is_none() {
            return;
        }
        if prior.metadata().version() == fresh.metadata().version() {
            return;
        }

        tracing::debug!(reference = %self.reference, "rotation detected");
        self.events.publish(SecretRolloverDetected::new(
            self.reference.clone(),
            sibling,
            fresh.metadata().version(),
        ));
    }
}
