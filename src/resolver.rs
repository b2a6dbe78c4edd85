use crate::aggregate::SecretAggregate;
use crate::cache::SecretCache;
use crate::errors::Error;
use crate::events::EventBus;
use crate::policy::RefreshPolicy;
use crate::provider::{ProviderRegistry, SecretProvider};
use crate::types::{AccessCredential, Secret, SecretReference};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Routes secret requests to per-reference aggregates.
///
/// Aggregates are created on first use and keyed by reference, so the
/// single-flight discipline inside each aggregate covers every caller of
/// the same reference.
pub struct SecretResolver {
    registry: Arc<ProviderRegistry>,
    cache: Arc<dyn SecretCache>,
    default_policy: Option<Arc<dyn RefreshPolicy>>,
    events: Arc<EventBus>,
    aggregates: Mutex<HashMap<SecretReference, Arc<SecretAggregate>>>,
}

impl SecretResolver {
    /// Construct a resolver over the given collaborators.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        cache: Arc<dyn SecretCache>,
        default_policy: Option<Arc<dyn RefreshPolicy>>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            cache,
            default_policy,
            events,
            aggregates: Mutex::new(HashMap::new()),
        }
    }

    /// Append a provider to the routing list.
    pub fn register_provider(&self, provider: Arc<dyn SecretProvider>) {
        self.registry.register(provider);
    }

    /// Resolve a secret through the cache-first read path.
    pub fn resolve(
        &self,
        reference: &SecretReference,
        credential: &AccessCredential,
    ) -> Result<Secret, Error> {
        self.aggregate_for(reference, credential)?.get_secret()
    }

    /// Force a provider fetch for the reference.
    pub fn refresh(
        &self,
        reference: &SecretReference,
        credential: &AccessCredential,
    ) -> Result<Secret, Error> {
        self.aggregate_for(reference, credential)?.refresh_secret()
    }

    /// Stop every aggregate's policy and drop the aggregate registry.
    pub fn shutdown(&self) {
        let mut aggregates = self.aggregates.lock().unwrap();
        for aggregate in aggregates.values() {
            aggregate.stop();
        }
        aggregates.clear();
    }

    fn aggregate_for(
        &self,
        reference: &SecretReference,
        credential: &AccessCredential,
    ) -> Result<Arc<SecretAggregate>, Error> {
        let mut aggregates = self.aggregates.lock().unwrap();
        if let Some(aggregate) = aggregates.get(reference) {
            return Ok(Arc::clone(aggregate));
        }

        let aggregate = Arc::new(SecretAggregate::new(
            reference.clone(),
            credential.clone(),
            &self.registry,
            Arc::clone(&self.cache),
            self.default_policy.clone(),
            Arc::clone(&self.events),
        )?);
        aggregates.insert(reference.clone(), Arc::clone(&aggregate));
        Ok(aggregate)
    }
}
