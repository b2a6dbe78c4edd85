use crate::errors::{AccessError, AccessResult};
use crate::provider::SecretProvider;
use crate::types::{AccessCredential, Secret, SecretMetadata, SecretReference, StoreType};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

const ACTIVE_HINT: &str = "active";
const INACTIVE_HINT: &str = "inactive";
const LATEST_HINT: &str = "latest";

/// In-memory provider simulating a remote secret store.
///
/// Suitable for tests and embedded demos: configurable latency, optional
/// simulated failures, and helpers to rotate an active/inactive pair.
pub struct MockSecretProvider {
    store_type: StoreType,
    min_delay: Duration,
    max_delay: Duration,
    failure_probability: f64,
    secrets: Mutex<HashMap<(String, String), Secret>>,
}

/// Builder for [`MockSecretProvider`].
pub struct MockSecretProviderBuilder {
    store_type: StoreType,
    min_delay: Duration,
    max_delay: Duration,
    failure_probability: f64,
}

impl MockSecretProviderBuilder {
    /// Store family this provider advertises.
    pub fn store_type(mut self, store_type: StoreType) -> Self {
        self.store_type = store_type;
        self
    }

    /// Simulated fetch latency range.
    pub fn delay_range(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max.max(min);
        self
    }

    /// Probability in `[0, 1]` that a fetch fails.
    pub fn failure_probability(mut self, probability: f64) -> Self {
        self.failure_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Build the configured provider.
    pub fn build(self) -> MockSecretProvider {
        MockSecretProvider {
            store_type: self.store_type,
            min_delay: self.min_delay,
            max_delay: self.max_delay,
            failure_probability: self.failure_probability,
            secrets: Mutex::new(HashMap::new()),
        }
    }
}

impl MockSecretProvider {
    /// Start configuring a mock provider. Defaults: AWS Secrets Manager
    /// store, no latency, no failures.
    pub fn builder() -> MockSecretProviderBuilder {
        MockSecretProviderBuilder {
            store_type: StoreType::AwsSecretsManager,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            failure_probability: 0.0,
        }
    }

    /// Store a secret under the `latest` version hint.
    pub fn add_secret(&self, name: &str, value: &str) {
        self.add_secret_with_hint(name, value, LATEST_HINT);
    }

    /// Store a secret under a specific version hint.
    pub fn add_secret_with_hint(&self, name: &str, value: &str, version_hint: &str) {
        let reference = SecretReference::new(self.store_type, name)
            .and_then(|r| r.with_version_hint(version_hint))
            .expect("mock secret name and hint must be non-empty");
        let metadata =
            SecretMetadata::new(Uuid::new_v4().to_string(), self.store_type, reference);
        let secret = Secret::new(name, value.as_bytes().to_vec(), metadata);
        self.secrets
            .lock()
            .unwrap()
            .insert(key(name, version_hint), secret);
    }

    /// Replace the value stored under `latest`, minting a new version.
    pub fn update_secret(&self, name: &str, value: &str) -> bool {
        self.update_secret_with_hint(name, value, LATEST_HINT)
    }

    /// Replace the value under a specific hint, minting a new version while
    /// keeping the secret id stable.
    pub fn update_secret_with_hint(&self, name: &str, value: &str, version_hint: &str) -> bool {
        let mut secrets = self.secrets.lock().unwrap();
        let Some(existing) = secrets.get(&key(name, version_hint)) else {
            return false;
        };

        let metadata = existing.metadata().with_new_version(Uuid::new_v4().to_string());
        let updated = Secret::with_id(existing.id(), name, value.as_bytes().to_vec(), metadata);
        secrets.insert(key(name, version_hint), updated);
        true
    }

    /// Swap the active/inactive pair for `name`, minting fresh versions.
    ///
    /// Returns false when either half of the pair is missing.
    pub fn perform_rollover(&self, name: &str) -> bool {
        let mut secrets = self.secrets.lock().unwrap();
        let Some(active) = secrets.get(&key(name, ACTIVE_HINT)).cloned() else {
            return false;
        };
        let Some(inactive) = secrets.get(&key(name, INACTIVE_HINT)).cloned() else {
            return false;
        };

        let new_active = Secret::with_id(
            inactive.id(),
            name,
            inactive.value(),
            SecretMetadata::new(
                Uuid::new_v4().to_string(),
                self.store_type,
                active.metadata().source_ref().clone(),
            ),
        );
        let new_inactive = Secret::with_id(
            active.id(),
            name,
            active.value(),
            SecretMetadata::new(
                Uuid::new_v4().to_string(),
                self.store_type,
                inactive.metadata().source_ref().clone(),
            ),
        );

        secrets.insert(key(name, ACTIVE_HINT), new_active);
        secrets.insert(key(name, INACTIVE_HINT), new_inactive);
        true
    }

    fn simulate_delay(&self) {
        if self.max_delay.is_zero() {
            return;
        }
        let delay = if self.min_delay == self.max_delay {
            self.min_delay
        } else {
            let span = (self.max_delay - self.min_delay).as_millis() as u64;
            self.min_delay + Duration::from_millis(rand::rng().random_range(0..=span))
        };
        thread::sleep(delay);
    }

    fn simulate_failure(&self, reference: &SecretReference) -> AccessResult<()> {
        if self.failure_probability > 0.0
            && rand::rng().random::<f64>() < self.failure_probability
        {
            return Err(AccessError::new(
                reference.clone(),
                format!("simulated failure accessing secret: {}", reference.name()),
            ));
        }
        Ok(())
    }
}

fn key(name: &str, version_hint: &str) -> (String, String) {
    (name.to_string(), version_hint.to_string())
}

impl SecretProvider for MockSecretProvider {
    fn fetch_secret(
        &self,
        reference: &SecretReference,
        _credential: &AccessCredential,
    ) -> AccessResult<Secret> {
        self.simulate_delay();
        self.simulate_failure(reference)?;

        let secrets = self.secrets.lock().unwrap();
        let secret = secrets
            .get(&key(reference.name(), reference.version_hint()))
            .ok_or_else(|| {
                AccessError::new(
                    reference.clone(),
                    format!("secret not found: {}", reference.name()),
                )
            })?;

        Ok(secret.with_refreshed_timestamp())
    }

    fn supports_store(&self, store_type: StoreType) -> bool {
        store_type == self.store_type
    }

    fn latest_version(
        &self,
        reference: &SecretReference,
        _credential: &AccessCredential,
    ) -> AccessResult<Option<String>> {
        self.simulate_failure(reference)?;
        let secrets = self.secrets.lock().unwrap();
        Ok(secrets
            .get(&key(reference.name(), reference.version_hint()))
            .map(|secret| secret.metadata().version().to_string()))
    }
}
