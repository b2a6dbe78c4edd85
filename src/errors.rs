use crate::types::{SecretReference, StoreType};
use thiserror::Error;

/// Result alias for operations surfaced by the facade.
pub type Result<T> = std::result::Result<T, Error>;

/// Result alias for store-provider operations.
pub type AccessResult<T> = std::result::Result<T, AccessError>;

/// Caller-supplied data violates an invariant.
///
/// Raised synchronously by constructors and never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
    #[error("CYBERARK_API_KEY credential requires a non-empty API key")]
    EmptyApiKey,
    #[error("IAM_ROLE credential requires a non-empty role ARN")]
    EmptyRoleArn,
    #[error("unknown store type: {0}")]
    UnknownStoreType(String),
}

/// Registration or build-time misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("secret already registered: {name}")]
    AlreadyRegistered { name: String },
    #[error("secret not registered: {name}")]
    NotRegistered { name: String },
    #[error("no cache configured; supply one with ManagerBuilder::with_cache")]
    MissingCache,
    #[error("no provider available for store type {store_type}")]
    NoProvider { store_type: StoreType },
}

/// Failure to fetch from a backing store.
///
/// Carries the offending reference and an optional underlying cause.
#[derive(Debug, Error)]
#[error("secret access failed for {reference}: {message}")]
pub struct AccessError {
    reference: SecretReference,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AccessError {
    /// Construct an access error for the given reference.
    pub fn new(reference: SecretReference, message: impl Into<String>) -> Self {
        Self {
            reference,
            message: message.into(),
            source: None,
        }
    }

    /// Construct an access error wrapping an underlying cause.
    pub fn with_source(
        reference: SecretReference,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            reference,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The reference whose fetch failed.
    pub fn reference(&self) -> &SecretReference {
        &self.reference
    }

    /// Human-readable failure description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Canonical error surface of the library.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrapper for invariant violations in caller-supplied data.
    #[error("{0}")]
    Validation(#[from] ValidationError),
    /// Wrapper for registration and build-time misuse.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
    /// Wrapper for backing-store fetch failures.
    #[error("{0}")]
    Access(#[from] AccessError),
}
