//! Credential type and the keyed store contract

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use tracing::debug;

use crate::error::{CredentialError, CredentialResult};

/// A (resource, username, secret) triple
///
/// The secret is optional because lookups by resource only return the
/// identity; the secret has to be fetched with [`CredentialStore::retrieve`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub resource: String,
    pub username: String,
    secret: Option<String>,
}

impl Credential {
    pub fn new(
        resource: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            username: username.into(),
            secret: Some(secret.into()),
        }
    }

    /// Identity only, as returned by `find_by_resource`
    pub fn without_secret(resource: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            username: username.into(),
            secret: None,
        }
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    /// Copy with the secret dropped
    pub fn redacted(&self) -> Self {
        Self::without_secret(self.resource.clone(), self.username.clone())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("resource", &self.resource)
            .field("username", &self.username)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Keyed store holding at most one credential per resource
pub trait CredentialStore: Send + Sync {
    /// Look up the credential for a resource, without its secret
    fn find_by_resource(&self, resource: &str) -> CredentialResult<Option<Credential>>;

    /// Fetch the full credential, secret included
    fn retrieve(&self, resource: &str, username: &str) -> CredentialResult<Credential>;

    /// Store a credential, replacing any existing entry for its resource
    fn add(&self, credential: &Credential) -> CredentialResult<()>;

    /// Delete the entry matching the credential's resource and username
    fn remove(&self, credential: &Credential) -> CredentialResult<()>;
}

/// In-process store, used for tests and when no OS vault is wanted
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, (String, String)>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored credentials
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> CredentialResult<std::sync::MutexGuard<'_, HashMap<String, (String, String)>>> {
        self.entries
            .lock()
            .map_err(|_| CredentialError::Backend("credential map poisoned".to_string()))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn find_by_resource(&self, resource: &str) -> CredentialResult<Option<Credential>> {
        let entries = self.lock()?;
        Ok(entries
            .get(resource)
            .map(|(username, _)| Credential::without_secret(resource, username.clone())))
    }

    fn retrieve(&self, resource: &str, username: &str) -> CredentialResult<Credential> {
        let entries = self.lock()?;
        match entries.get(resource) {
            Some((stored_user, secret)) if stored_user == username => {
                Ok(Credential::new(resource, username, secret.clone()))
            }
            _ => Err(CredentialError::NotFound(format!("{resource}/{username}"))),
        }
    }

    fn add(&self, credential: &Credential) -> CredentialResult<()> {
        let secret = credential
            .secret()
            .ok_or_else(|| CredentialError::Backend("credential has no secret".to_string()))?;

        let mut entries = self.lock()?;
        if entries.remove(&credential.resource).is_some() {
            debug!(resource = %credential.resource, "replaced existing credential");
        }
        entries.insert(
            credential.resource.clone(),
            (credential.username.clone(), secret.to_string()),
        );
        Ok(())
    }

    fn remove(&self, credential: &Credential) -> CredentialResult<()> {
        let mut entries = self.lock()?;
        match entries.get(&credential.resource) {
            Some((username, _)) if *username == credential.username => {
                entries.remove(&credential.resource);
                Ok(())
            }
            _ => Err(CredentialError::NotFound(credential.resource.clone())),
        }
    }
}
