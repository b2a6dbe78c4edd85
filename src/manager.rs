use crate::cache::SecretCache;
use crate::coordinator::RefreshCoordinator;
use crate::errors::{ConfigurationError, Error};
use crate::events::EventBus;
use crate::policy::RefreshPolicy;
use crate::provider::{ProviderRegistry, SecretProvider};
use crate::resolver::SecretResolver;
use crate::types::{AccessCredential, Secret, SecretReference};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
struct Registration {
    reference: SecretReference,
    credential: AccessCredential,
}

/// Client entry point for secret access.
///
/// Secrets are registered under caller-chosen names together with their
/// reference, credential, and optional refresh policy; reads and refreshes
/// go through the resolver and its per-reference aggregates. Closing the
/// manager stops the refresh coordinator and tears down the resolver.
pub struct SecretManager {
    resolver: Arc<SecretResolver>,
    coordinator: Arc<RefreshCoordinator>,
    events: Arc<EventBus>,
    default_policy: Option<Arc<dyn RefreshPolicy>>,
    registrations: Mutex<HashMap<String, Registration>>,
    closed: AtomicBool,
}

impl SecretManager {
    /// Start configuring a new manager.
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::default()
    }

    /// Register a secret under a unique name.
    ///
    /// The policy falls back to the builder's default refresh policy; when
    /// either is present the reference is also registered with the refresh
    /// coordinator.
    pub fn register(
        &self,
        name: impl Into<String>,
        reference: SecretReference,
        credential: AccessCredential,
        policy: Option<Arc<dyn RefreshPolicy>>,
    ) -> Result<(), Error> {
        let name = name.into();
        let mut registrations = self.registrations.lock().unwrap();
        if registrations.contains_key(&name) {
            return Err(ConfigurationError::AlreadyRegistered { name }.into());
        }

        if let Some(policy) = policy.or_else(|| self.default_policy.clone()) {
            self.coordinator
                .register_secret(reference.clone(), policy, credential.clone());
        }

        registrations.insert(
            name,
            Registration {
                reference,
                credential,
            },
        );
        Ok(())
    }

    /// Remove a registration. Unknown names are a silent no-op.
    pub fn unregister(&self, name: &str) {
        let removed = self.registrations.lock().unwrap().remove(name);
        if let Some(registration) = removed {
            self.coordinator.unregister_secret(&registration.reference);
        }
    }

    /// Resolve a registered secret, serving a fresh cache hit when one
    /// exists.
    pub fn get(&self, name: &str) -> Result<Secret, Error> {
        let registration = self.lookup(name)?;
        self.resolver
            .resolve(&registration.reference, &registration.credential)
    }

    /// Resolve a secret and copy its value into a `String`.
    ///
    /// The intermediate buffer is cleared before this returns; the
    /// returned `String` itself cannot be wiped and is the caller's
    /// responsibility.
    pub fn get_as_string(&self, name: &str) -> Result<String, Error> {
        let scoped = self.get(name)?.into_scoped();
        Ok(String::from_utf8_lossy(scoped.value_bytes()).into_owned())
    }

    /// Force a provider fetch for a registered secret.
    pub fn refresh(&self, name: &str) -> Result<Secret, Error> {
        let registration = self.lookup(name)?;
        self.resolver
            .refresh(&registration.reference, &registration.credential)
    }

    /// The event bus carrying this manager's lifecycle events.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Stop background refresh work and tear down the resolver.
    ///
    /// Best-effort and idempotent; shutdown problems are logged, never
    /// raised.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.coordinator.stop();
        self.resolver.shutdown();
    }

    fn lookup(&self, name: &str) -> Result<Registration, Error> {
        self.registrations
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| {
                ConfigurationError::NotRegistered {
                    name: name.to_string(),
                }
                .into()
            })
    }
}

impl Drop for SecretManager {
    fn drop(&mut self) {
        self.close();
    }
}

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Builder collecting providers, the cache, and optional policy/event
/// wiring for a [`SecretManager`].
#[derive(Default)]
pub struct ManagerBuilder {
    providers: Vec<Arc<dyn SecretProvider>>,
    cache: Option<Arc<dyn SecretCache>>,
    default_policy: Option<Arc<dyn RefreshPolicy>>,
    events: Option<Arc<EventBus>>,
    default_cache_ttl: Option<Duration>,
    sweep_interval: Option<Duration>,
}

impl ManagerBuilder {
    /// Add a store provider. Routing prefers earlier registrations.
    pub fn with_provider(mut self, provider: Arc<dyn SecretProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Set the cache. Required; building without one fails.
    pub fn with_cache(mut self, cache: Arc<dyn SecretCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the refresh policy applied to registrations without one.
    pub fn with_default_refresh_policy(mut self, policy: Arc<dyn RefreshPolicy>) -> Self {
        self.default_policy = Some(policy);
        self
    }

    /// Share an event bus with the manager instead of creating a private
    /// one.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Apply a default TTL to the cache at build time.
    pub fn with_default_cache_ttl(mut self, ttl: Duration) -> Self {
        self.default_cache_ttl = Some(ttl);
        self
    }

    /// Override the coordinator sweep interval (default: one minute).
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Wire the components and start the refresh coordinator.
    pub fn build(self) -> Result<SecretManager, Error> {
        let cache = self.cache.ok_or(ConfigurationError::MissingCache)?;
        if let Some(ttl) = self.default_cache_ttl {
            cache.set_default_ttl(ttl);
        }

        let events = self.events.unwrap_or_default();
        let registry = Arc::new(ProviderRegistry::new());
        for provider in self.providers {
            registry.register(provider);
        }

        let resolver = Arc::new(SecretResolver::new(
            registry,
            Arc::clone(&cache),
            self.default_policy.clone(),
            Arc::clone(&events),
        ));
        let coordinator = Arc::new(RefreshCoordinator::with_sweep_interval(
            Arc::clone(&resolver),
            cache,
            Arc::clone(&events),
            self.sweep_interval.unwrap_or(DEFAULT_SWEEP_INTERVAL),
        ));
        coordinator.start();

        Ok(SecretManager {
            resolver,
            coordinator,
            events,
            default_policy: self.default_policy,
            registrations: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemorySecretCache;
    use crate::provider::mock::MockSecretProvider;
    use crate::types::StoreType;

    #[test]
    fn build_without_cache_fails() {
        let result = SecretManager::builder().build();
        assert!(matches!(
            result,
            Err(Error::Configuration(ConfigurationError::MissingCache))
        ));
    }

    #[test]
    fn build_applies_default_ttl() {
        let cache = Arc::new(InMemorySecretCache::new());
        let manager = SecretManager::builder()
            .with_cache(cache.clone())
            .with_default_cache_ttl(Duration::from_secs(30))
            .build()
            .unwrap();

        assert_eq!(cache.default_ttl(), Duration::from_secs(30));
        manager.close();
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let provider = Arc::new(MockSecretProvider::builder().build());
        let manager = SecretManager::builder()
            .with_provider(provider)
            .with_cache(Arc::new(InMemorySecretCache::new()))
            .build()
            .unwrap();

        let reference =
            SecretReference::new(StoreType::AwsSecretsManager, "db/creds").unwrap();
        let credential = AccessCredential::cyberark_api_key("key").unwrap();

        manager
            .register("db", reference.clone(), credential.clone(), None)
            .unwrap();
        let err = manager
            .register("db", reference, credential, None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::AlreadyRegistered { .. })
        ));
        manager.close();
    }

    #[test]
    fn unknown_name_is_a_configuration_error() {
        let manager = SecretManager::builder()
            .with_cache(Arc::new(InMemorySecretCache::new()))
            .build()
            .unwrap();

        let err = manager.get("unknown").unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::NotRegistered { .. })
        ));
        manager.close();
    }

    #[test]
    fn register_unregister_register_round_trip() {
        let provider = Arc::new(MockSecretProvider::builder().build());
        let manager = SecretManager::builder()
            .with_provider(provider)
            .with_cache(Arc::new(InMemorySecretCache::new()))
            .build()
            .unwrap();

        let reference =
            SecretReference::new(StoreType::AwsSecretsManager, "db/creds").unwrap();
        let credential = AccessCredential::cyberark_api_key("key").unwrap();

        manager
            .register("db", reference.clone(), credential.clone(), None)
            .unwrap();
        manager.unregister("db");
        manager
            .register("db", reference, credential, None)
            .unwrap();

        // Unknown names are a silent no-op.
        manager.unregister("never-registered");
        manager.close();
    }
}
