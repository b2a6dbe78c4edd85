use crate::errors::AccessResult;
use crate::types::{AccessCredential, Secret, SecretReference, StoreType};
use std::sync::{Arc, Mutex};

pub mod mock;

/// Adapter speaking one store family's protocol.
///
/// `fetch_secret` must set the returned secret's `source_ref` to the
/// requested reference and populate a stable opaque version identifier:
/// the same bytes while the underlying secret is unchanged, a new
/// identifier on every rotation.
pub trait SecretProvider: Send + Sync {
    /// Fetch the secret addressed by `reference` using `credential`.
    fn fetch_secret(
        &self,
        reference: &SecretReference,
        credential: &AccessCredential,
    ) -> AccessResult<Secret>;

    /// True when this provider can serve the given store family.
    fn supports_store(&self, store_type: StoreType) -> bool;

    /// Cheap staleness probe; providers without one return `None`.
    fn latest_version(
        &self,
        _reference: &SecretReference,
        _credential: &AccessCredential,
    ) -> AccessResult<Option<String>> {
        Ok(None)
    }

    /// Whether the store pushes change notifications.
    fn supports_change_notifications(&self) -> bool {
        false
    }
}

impl<T> SecretProvider for Box<T>
where
    T: SecretProvider + ?Sized,
{
    fn fetch_secret(
        &self,
        reference: &SecretReference,
        credential: &AccessCredential,
    ) -> AccessResult<Secret> {
        (**self).fetch_secret(reference, credential)
    }
    fn supports_store(&self, store_type: StoreType) -> bool {
        (**self).supports_store(store_type)
    }
    fn latest_version(
        &self,
        reference: &SecretReference,
        credential: &AccessCredential,
    ) -> AccessResult<Option<String>> {
        (**self).latest_version(reference, credential)
    }
    fn supports_change_notifications(&self) -> bool {
        (**self).supports_change_notifications()
    }
}

impl<T> SecretProvider for Arc<T>
where
    T: SecretProvider + ?Sized,
{
    fn fetch_secret(
        &self,
        reference: &SecretReference,
        credential: &AccessCredential,
    ) -> AccessResult<Secret> {
        (**self).fetch_secret(reference, credential)
    }
    fn supports_store(&self, store_type: StoreType) -> bool {
        (**self).supports_store(store_type)
    }
    fn latest_version(
        &self,
        reference: &SecretReference,
        credential: &AccessCredential,
    ) -> AccessResult<Option<String>> {
        (**self).latest_version(reference, credential)
    }
    fn supports_change_notifications(&self) -> bool {
        (**self).supports_change_notifications()
    }
}

/// Append-only provider registration list.
///
/// Routing picks the first registered provider that advertises support for
/// a store family; there is no deregistration.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Mutex<Vec<Arc<dyn SecretProvider>>>,
}

impl ProviderRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider to the registration list.
    pub fn register(&self, provider: Arc<dyn SecretProvider>) {
        self.providers.lock().unwrap().push(provider);
    }

    /// First registered provider supporting `store_type`, if any.
    pub fn find_for(&self, store_type: StoreType) -> Option<Arc<dyn SecretProvider>> {
        self.providers
            .lock()
            .unwrap()
            .iter()
            .find(|provider| provider.supports_store(store_type))
            .cloned()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.lock().unwrap().len()
    }

    /// True when no provider has been registered.
    pub fn is_empty(&self) -> bool {
        self.providers.lock().unwrap().is_empty()
    }
}
