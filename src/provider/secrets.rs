//! Credential resolution against the external secret store.

use crate::resource::SecretRef;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use thiserror::Error;

/// Errors resolving a secret reference.
#[derive(Debug, Clone, Error)]
pub enum SecretError {
    #[error("secret '{0}' not found")]
    NotFound(String),

    #[error("secret '{secret}' is missing key '{key}'")]
    MissingKey { secret: String, key: String },
}

/// Resolves a [`SecretRef`] into its key/value material.
///
/// The relevant key name is provider-specific (`password` for WattTime,
/// `apiKey` for ElectricityMaps).
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Fetch the secret's data. `default_namespace` applies when the
    /// reference does not carry its own.
    async fn resolve(
        &self,
        reference: &SecretRef,
        default_namespace: &str,
    ) -> Result<HashMap<String, String>, SecretError>;
}

/// Pull one required key out of resolved secret data.
pub fn require_key(
    secret_name: &str,
    data: &HashMap<String, String>,
    key: &str,
) -> Result<String, SecretError> {
    data.get(key).cloned().ok_or_else(|| SecretError::MissingKey {
        secret: secret_name.to_string(),
        key: key.to_string(),
    })
}

/// In-memory secret store seeded from configuration; also used in tests.
#[derive(Default)]
pub struct MemorySecretResolver {
    secrets: DashMap<(String, String), HashMap<String, String>>,
}

impl MemorySecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        data: HashMap<String, String>,
    ) {
        self.secrets.insert((namespace.into(), name.into()), data);
    }
}

#[async_trait]
impl SecretResolver for MemorySecretResolver {
    async fn resolve(
        &self,
        reference: &SecretRef,
        default_namespace: &str,
    ) -> Result<HashMap<String, String>, SecretError> {
        let namespace = reference
            .namespace
            .clone()
            .unwrap_or_else(|| default_namespace.to_string());

        self.secrets
            .get(&(namespace, reference.name.clone()))
            .map(|data| data.clone())
            .ok_or_else(|| SecretError::NotFound(reference.name.clone()))
    }
}
