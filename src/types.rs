use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use uuid::Uuid;
use zeroize::Zeroize;

/// Validates that the provided value is non-empty.
pub(crate) fn validate_non_empty(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}

/// Tag identifying a family of backing secret stores.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StoreType {
    /// AWS Secrets Manager.
    AwsSecretsManager,
    /// CyberArk-style vaults.
    CyberArk,
}

impl StoreType {
    /// Stable string representation used for configuration and diagnostics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwsSecretsManager => "aws-secrets-manager",
            Self::CyberArk => "cyberark",
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws-secrets-manager" | "aws" => Ok(Self::AwsSecretsManager),
            "cyberark" | "cyber-ark" => Ok(Self::CyberArk),
            other => Err(ValidationError::UnknownStoreType(other.to_string())),
        }
    }
}

const DEFAULT_VERSION_HINT: &str = "latest";
const ACTIVE_HINT: &str = "active";
const INACTIVE_HINT: &str = "inactive";

/// Identity triple addressing one secret in one store.
///
/// Used as the cache and registration key; equality and hash cover all
/// three fields.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
pub struct SecretReference {
    store_type: StoreType,
    name: String,
    version_hint: String,
}

impl SecretReference {
    /// Construct a reference with the default `latest` version hint.
    pub fn new(store_type: StoreType, name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_non_empty(&name, "secret name")?;
        Ok(Self {
            store_type,
            name,
            version_hint: DEFAULT_VERSION_HINT.to_string(),
        })
    }

    /// Attach a specific version hint (e.g. `active`, `inactive`, `v3`).
    pub fn with_version_hint(
        mut self,
        version_hint: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let hint = version_hint.into();
        validate_non_empty(&hint, "version hint")?;
        self.version_hint = hint;
        Ok(self)
    }

    /// Backing store family.
    pub fn store_type(&self) -> StoreType {
        self.store_type
    }

    /// Store-local identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version hint, defaulting to `latest`.
    pub fn version_hint(&self) -> &str {
        &self.version_hint
    }

    /// True when this reference addresses the active half of a rotation pair.
    pub fn is_active_hint(&self) -> bool {
        self.version_hint.eq_ignore_ascii_case(ACTIVE_HINT)
    }

    /// The `(store, name, "inactive")` counterpart of this reference.
    pub fn inactive_sibling(&self) -> SecretReference {
        Self {
            store_type: self.store_type,
            name: self.name.clone(),
            version_hint: INACTIVE_HINT.to_string(),
        }
    }
}

impl fmt::Display for SecretReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}@{}", self.store_type, self.name, self.version_hint)
    }
}

/// Authentication scheme tag for store access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialMethod {
    /// Opaque API key for CyberArk-style vaults.
    CyberArkApiKey,
    /// STS assume-role configuration for AWS stores.
    IamRole,
}

impl CredentialMethod {
    /// Wire-stable method name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CyberArkApiKey => "CYBERARK_API_KEY",
            Self::IamRole => "IAM_ROLE",
        }
    }
}

impl fmt::Display for CredentialMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DEFAULT_SESSION_NAME: &str = "SecretAccessSession";
const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(900);

/// Configuration for an STS AssumeRole exchange.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AssumeRoleConfig {
    role_arn: String,
    session_name: String,
    duration: Duration,
    external_id: Option<String>,
}

impl AssumeRoleConfig {
    /// Start building a configuration for the given role ARN.
    pub fn builder(role_arn: impl Into<String>) -> AssumeRoleConfigBuilder {
        AssumeRoleConfigBuilder {
            role_arn: role_arn.into(),
            session_name: DEFAULT_SESSION_NAME.to_string(),
            duration: DEFAULT_SESSION_DURATION,
            external_id: None,
        }
    }

    /// ARN of the role to assume.
    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    /// Session name attached to the assumed role.
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// Lifetime of the assumed-role session.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Optional external id, redacted in any diagnostic form.
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }
}

impl fmt::Debug for AssumeRoleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumeRoleConfig")
            .field("role_arn", &self.role_arn)
            .field("session_name", &self.session_name)
            .field("duration", &self.duration)
            .field(
                "external_id",
                &self.external_id.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Builder for [`AssumeRoleConfig`].
pub struct AssumeRoleConfigBuilder {
    role_arn: String,
    session_name: String,
    duration: Duration,
    external_id: Option<String>,
}

impl AssumeRoleConfigBuilder {
    /// Override the session name.
    pub fn session_name(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = session_name.into();
        self
    }

    /// Override the session duration.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Attach an external id.
    pub fn external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<AssumeRoleConfig, ValidationError> {
        if self.role_arn.trim().is_empty() {
            return Err(ValidationError::EmptyRoleArn);
        }
        validate_non_empty(&self.session_name, "session name")?;
        Ok(AssumeRoleConfig {
            role_arn: self.role_arn,
            session_name: self.session_name,
            duration: self.duration,
            external_id: self.external_id,
        })
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum CredentialPayload {
    ApiKey(String),
    AssumeRole(AssumeRoleConfig),
}

/// Credential used to authenticate against a secret store.
///
/// One variant per [`CredentialMethod`]; construction enforces the payload
/// shape so a method/payload mismatch is unrepresentable.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccessCredential {
    payload: CredentialPayload,
}

impl AccessCredential {
    /// Build a CyberArk API-key credential from a non-empty opaque key.
    pub fn cyberark_api_key(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ValidationError::EmptyApiKey);
        }
        Ok(Self {
            payload: CredentialPayload::ApiKey(key),
        })
    }

    /// Build an IAM-role credential from an assume-role configuration.
    pub fn iam_role(config: AssumeRoleConfig) -> Self {
        Self {
            payload: CredentialPayload::AssumeRole(config),
        }
    }

    /// Authentication scheme of this credential.
    pub fn method(&self) -> CredentialMethod {
        match &self.payload {
            CredentialPayload::ApiKey(_) => CredentialMethod::CyberArkApiKey,
            CredentialPayload::AssumeRole(_) => CredentialMethod::IamRole,
        }
    }

    /// The API key, when this is a `CYBERARK_API_KEY` credential.
    pub fn api_key(&self) -> Option<&str> {
        match &self.payload {
            CredentialPayload::ApiKey(key) => Some(key),
            CredentialPayload::AssumeRole(_) => None,
        }
    }

    /// The assume-role configuration, when this is an `IAM_ROLE` credential.
    pub fn assume_role(&self) -> Option<&AssumeRoleConfig> {
        match &self.payload {
            CredentialPayload::ApiKey(_) => None,
            CredentialPayload::AssumeRole(config) => Some(config),
        }
    }
}

impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCredential")
            .field("method", &self.method().as_str())
            .field("payload", &"[REDACTED]")
            .finish()
    }
}

/// Metadata attached to a fetched secret.
///
/// Equality and hash ignore `last_retrieved`.
#[derive(Debug, Clone)]
pub struct SecretMetadata {
    version: String,
    last_retrieved: SystemTime,
    store_type: StoreType,
    source_ref: SecretReference,
}

impl SecretMetadata {
    /// Construct metadata stamped with the current time.
    pub fn new(
        version: impl Into<String>,
        store_type: StoreType,
        source_ref: SecretReference,
    ) -> Self {
        Self::at(version, SystemTime::now(), store_type, source_ref)
    }

    /// Construct metadata with an explicit retrieval timestamp.
    pub fn at(
        version: impl Into<String>,
        last_retrieved: SystemTime,
        store_type: StoreType,
        source_ref: SecretReference,
    ) -> Self {
        Self {
            version: version.into(),
            last_retrieved,
            store_type,
            source_ref,
        }
    }

    /// Opaque version identifier assigned by the provider.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Timestamp of the most recent retrieval.
    pub fn last_retrieved(&self) -> SystemTime {
        self.last_retrieved
    }

    /// Backing store family the secret came from.
    pub fn store_type(&self) -> StoreType {
        self.store_type
    }

    /// Reference the secret was fetched under.
    pub fn source_ref(&self) -> &SecretReference {
        &self.source_ref
    }

    /// Copy with the retrieval timestamp set to now.
    pub fn with_updated_timestamp(&self) -> Self {
        Self::at(
            self.version.clone(),
            SystemTime::now(),
            self.store_type,
            self.source_ref.clone(),
        )
    }

    /// Copy with a new version and the timestamp set to now.
    pub fn with_new_version(&self, version: impl Into<String>) -> Self {
        Self::at(
            version,
            SystemTime::now(),
            self.store_type,
            self.source_ref.clone(),
        )
    }
}

impl PartialEq for SecretMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.store_type == other.store_type
            && self.source_ref == other.source_ref
    }
}

impl Eq for SecretMetadata {}

impl Hash for SecretMetadata {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.version.hash(state);
        self.store_type.hash(state);
        self.source_ref.hash(state);
    }
}

const CLEAR_BYTE: u8 = b'0';

/// A fetched secret value with its identity and metadata.
///
/// Equality and hash are over the id alone. The buffer is wiped on drop;
/// `value` returns a defensive copy owned by the caller.
pub struct Secret {
    id: String,
    name: String,
    value: Vec<u8>,
    metadata: SecretMetadata,
}

impl Secret {
    /// Mint a secret with a generated id.
    pub fn new(name: impl Into<String>, value: Vec<u8>, metadata: SecretMetadata) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name, value, metadata)
    }

    /// Construct a secret with a caller-supplied stable id.
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        value: Vec<u8>,
        metadata: SecretMetadata,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value,
            metadata,
        }
    }

    /// Stable unique identifier assigned by the provider.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name or description of the secret.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Defensive copy of the secret bytes. The copy is owned by the caller.
    pub fn value(&self) -> Vec<u8> {
        self.value.clone()
    }

    pub(crate) fn value_bytes(&self) -> &[u8] {
        &self.value
    }

    /// Metadata attached to this secret.
    pub fn metadata(&self) -> &SecretMetadata {
        &self.metadata
    }

    /// Overwrite the buffer with a fixed non-secret byte.
    pub fn clear_value(&mut self) {
        self.value.fill(CLEAR_BYTE);
    }

    /// Copy with the retrieval timestamp set to now.
    pub fn with_refreshed_timestamp(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            value: self.value.clone(),
            metadata: self.metadata.with_updated_timestamp(),
        }
    }

    /// Copy carrying a new version in its metadata.
    pub fn with_new_version(&self, version: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            value: self.value.clone(),
            metadata: self.metadata.with_new_version(version),
        }
    }

    /// Wrap this secret in a guard that clears the buffer on every exit
    /// path from the enclosing scope.
    pub fn into_scoped(self) -> ScopedSecret {
        ScopedSecret { secret: self }
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            value: self.value.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Secret {}

impl Hash for Secret {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Secret(id={}, name={}, version={}, value=[REDACTED])",
            self.id,
            self.name,
            self.metadata.version()
        )
    }
}

/// Scope guard around a [`Secret`] that clears the buffer when dropped.
pub struct ScopedSecret {
    secret: Secret,
}

impl ScopedSecret {
    /// Borrow the guarded secret.
    pub fn secret(&self) -> &Secret {
        &self.secret
    }
}

impl std::ops::Deref for ScopedSecret {
    type Target = Secret;

    fn deref(&self) -> &Secret {
        &self.secret
    }
}

impl Drop for ScopedSecret {
    fn drop(&mut self) {
        self.secret.clear_value();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str) -> SecretReference {
        SecretReference::new(StoreType::AwsSecretsManager, name).unwrap()
    }

    fn sample_secret(value: &str) -> Secret {
        let reference = reference("db-password");
        let metadata = SecretMetadata::new("v1", StoreType::AwsSecretsManager, reference);
        Secret::new("db-password", value.as_bytes().to_vec(), metadata)
    }

    #[test]
    fn reference_defaults_to_latest() {
        let reference = reference("db-password");
        assert_eq!(reference.version_hint(), "latest");
        assert!(!reference.is_active_hint());
    }

    #[test]
    fn reference_rejects_empty_components() {
        assert!(SecretReference::new(StoreType::CyberArk, "").is_err());
        assert!(
            SecretReference::new(StoreType::CyberArk, "ok")
                .unwrap()
                .with_version_hint("  ")
                .is_err()
        );
    }

    #[test]
    fn reference_equality_covers_all_fields() {
        let a = reference("db-password").with_version_hint("active").unwrap();
        let b = reference("db-password").with_version_hint("active").unwrap();
        let c = reference("db-password").with_version_hint("inactive").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn active_hint_is_case_insensitive() {
        let reference = reference("rot").with_version_hint("Active").unwrap();
        assert!(reference.is_active_hint());
        let sibling = reference.inactive_sibling();
        assert_eq!(sibling.version_hint(), "inactive");
        assert_eq!(sibling.name(), "rot");
    }

    #[test]
    fn credential_rejects_empty_payloads() {
        let err = AccessCredential::cyberark_api_key("").unwrap_err();
        assert!(err.to_string().contains("API key"));

        let err = AssumeRoleConfig::builder("").build().unwrap_err();
        assert!(err.to_string().contains("IAM_ROLE"));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = AccessCredential::cyberark_api_key("super-secret-key").unwrap();
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("super-secret-key"));

        let config = AssumeRoleConfig::builder("arn:aws:iam::123456789012:role/reader")
            .external_id("hidden-external-id")
            .build()
            .unwrap();
        let rendered = format!("{config:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("hidden-external-id"));
    }

    #[test]
    fn credential_equality_follows_payload() {
        let a = AccessCredential::cyberark_api_key("key-one").unwrap();
        let b = AccessCredential::cyberark_api_key("key-one").unwrap();
        let c = AccessCredential::cyberark_api_key("key-two").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let config = AssumeRoleConfig::builder("arn:aws:iam::123456789012:role/reader")
            .build()
            .unwrap();
        let d = AccessCredential::iam_role(config.clone());
        let e = AccessCredential::iam_role(config);
        assert_eq!(d, e);
        assert_ne!(a, d);
        assert_eq!(d.method(), CredentialMethod::IamRole);
    }

    #[test]
    fn assume_role_defaults() {
        let config = AssumeRoleConfig::builder("arn:aws:iam::123456789012:role/reader")
            .build()
            .unwrap();
        assert_eq!(config.session_name(), "SecretAccessSession");
        assert_eq!(config.duration(), Duration::from_secs(900));
        assert!(config.external_id().is_none());
    }

    #[test]
    fn metadata_equality_ignores_timestamp() {
        let reference = reference("db-password");
        let a = SecretMetadata::at(
            "v1",
            SystemTime::UNIX_EPOCH,
            StoreType::AwsSecretsManager,
            reference.clone(),
        );
        let b = a.with_updated_timestamp();
        assert_eq!(a, b);
        assert_ne!(a, a.with_new_version("v2"));
    }

    #[test]
    fn secret_equality_is_by_id() {
        let a = sample_secret("abc");
        let b = a.with_new_version("v2");
        assert_eq!(a, b);
        assert_ne!(a, sample_secret("abc"));
    }

    #[test]
    fn secret_value_is_a_defensive_copy() {
        let secret = sample_secret("abc");
        let mut copy = secret.value();
        copy.fill(0);
        assert_eq!(secret.value(), b"abc");
    }

    #[test]
    fn clear_value_overwrites_buffer() {
        let mut secret = sample_secret("abc");
        secret.clear_value();
        assert_eq!(secret.value(), b"000");
    }

    #[test]
    fn scoped_secret_clears_on_drop() {
        let secret = sample_secret("abc");
        let copy = {
            let scoped = secret.into_scoped();
            assert_eq!(scoped.value(), b"abc");
            scoped.secret().clone()
        };
        // The guard cleared its own buffer; the clone taken earlier is
        // caller-owned and untouched.
        assert_eq!(copy.value(), b"abc");
    }

    #[test]
    fn secret_rendering_is_redacted() {
        let secret = sample_secret("top-secret-bytes");
        for rendered in [format!("{secret}"), format!("{secret:?}")] {
            assert!(rendered.contains("[REDACTED]"));
            assert!(!rendered.contains("top-secret-bytes"));
        }
    }
}
