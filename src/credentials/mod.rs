//! Credential persistence for the device portal login

mod keychain;
mod store;

pub use keychain::KeyringCredentialStore;
pub use store::{Credential, CredentialStore, MemoryCredentialStore};
