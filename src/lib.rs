//! Secret resolution and freshness engine.
//!
//! Routes secret references to store providers, amortizes network cost
//! through a TTL cache, keeps cached values fresh via pluggable refresh
//! policies, and publishes lifecycle events including active/inactive
//! rotation detection.

pub mod aggregate;
pub mod cache;
pub mod coordinator;
pub mod errors;
pub mod events;
pub mod manager;
pub mod policy;
pub mod provider;
pub mod resolver;
mod schedule;
pub mod types;

pub use aggregate::SecretAggregate;
pub use cache::{InMemorySecretCache, SecretCache};
pub use coordinator::RefreshCoordinator;
pub use errors::{
    AccessError, AccessResult, ConfigurationError, Error, Result, ValidationError,
};
pub use events::{
    EventBus, EventKind, SecretEvent, SecretRefreshRequested, SecretRefreshed,
    SecretRolloverDetected,
};
pub use manager::{ManagerBuilder, SecretManager};
pub use policy::{NotifyRefreshPolicy, PollingRefreshPolicy, RefreshPolicy};
pub use provider::mock::MockSecretProvider;
pub use provider::{ProviderRegistry, SecretProvider};
pub use resolver::SecretResolver;
pub use types::{
    AccessCredential, AssumeRoleConfig, AssumeRoleConfigBuilder, CredentialMethod,
    ScopedSecret, Secret, SecretMetadata, SecretReference, StoreType,
};
