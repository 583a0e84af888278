//! OS keychain backed credential store using the `keyring` crate:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: kernel keyutils, persisted through the Secret Service so the
//!   login survives a reboot
//!
//! The keychain only addresses entries by (service, account), so each
//! resource keeps an index entry under [`INDEX_ACCOUNT`] naming the stored
//! username, next to the secret entry stored under that username.

use keyring::Entry;
use tracing::{debug, warn};

use crate::error::{CredentialError, CredentialResult};

use super::store::{Credential, CredentialStore};

/// Account name of the per-resource index entry
const INDEX_ACCOUNT: &str = "__username__";

/// Credential store backed by the platform keychain
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringCredentialStore;

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(resource: &str, account: &str) -> CredentialResult<Entry> {
        Entry::new(resource, account).map_err(map_error)
    }

    fn stored_username(resource: &str) -> CredentialResult<Option<String>> {
        match Self::entry(resource, INDEX_ACCOUNT)?.get_password() {
            Ok(username) => Ok(Some(username)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_error(e)),
        }
    }

    fn delete(resource: &str, account: &str) -> CredentialResult<bool> {
        match Self::entry(resource, account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(map_error(e)),
        }
    }
}

fn map_error(e: keyring::Error) -> CredentialError {
    match e {
        keyring::Error::NoEntry => CredentialError::NotFound("keychain entry".to_string()),
        keyring::Error::NoStorageAccess(_) => {
            CredentialError::Backend("no keychain storage access".to_string())
        }
        keyring::Error::PlatformFailure(_) => {
            CredentialError::Backend("keychain platform failure".to_string())
        }
        other => CredentialError::Backend(other.to_string()),
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn find_by_resource(&self, resource: &str) -> CredentialResult<Option<Credential>> {
        Ok(Self::stored_username(resource)?
            .map(|username| Credential::without_secret(resource, username)))
    }

    fn retrieve(&self, resource: &str, username: &str) -> CredentialResult<Credential> {
        match Self::entry(resource, username)?.get_password() {
            Ok(secret) => Ok(Credential::new(resource, username, secret)),
            Err(keyring::Error::NoEntry) => {
                Err(CredentialError::NotFound(format!("{resource}/{username}")))
            }
            Err(e) => Err(map_error(e)),
        }
    }

    fn add(&self, credential: &Credential) -> CredentialResult<()> {
        let secret = credential
            .secret()
            .ok_or_else(|| CredentialError::Backend("credential has no secret".to_string()))?;

        if let Some(previous) = Self::stored_username(&credential.resource)? {
            debug!(resource = %credential.resource, "removing previous keychain credential");
            if !Self::delete(&credential.resource, &previous)? {
                warn!(resource = %credential.resource, "index pointed at a missing secret");
            }
        }

        Self::entry(&credential.resource, &credential.username)?
            .set_password(secret)
            .map_err(map_error)?;
        Self::entry(&credential.resource, INDEX_ACCOUNT)?
            .set_password(&credential.username)
            .map_err(map_error)
    }

    fn remove(&self, credential: &Credential) -> CredentialResult<()> {
        match Self::stored_username(&credential.resource)? {
            Some(username) if username == credential.username => {
                Self::delete(&credential.resource, &username)?;
                Self::delete(&credential.resource, INDEX_ACCOUNT)?;
                Ok(())
            }
            _ => Err(CredentialError::NotFound(credential.resource.clone())),
        }
    }
}
