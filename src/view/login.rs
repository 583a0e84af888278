//! Interactive login surface
//!
//! Runs on the login view's own context: asks for a username/secret,
//! connects with them, validates the connection by reading the IPD, and
//! on success persists the credential before handing the live client back.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::credentials::{Credential, CredentialStore};
use crate::error::{PortalError, AUTH_FAILED_MESSAGE};
use crate::portal::{Connector, DeviceClient};

/// Username and secret typed by the user
#[derive(Clone)]
pub struct LoginAttempt {
    pub username: String,
    pub secret: String,
}

impl std::fmt::Debug for LoginAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginAttempt")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Source of user-entered credentials
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// Ask for credentials; `None` means the user cancelled
    async fn request_credentials(&self) -> Option<LoginAttempt>;

    /// Tell the user the last attempt failed
    async fn report_failure(&self, message: &str);
}

/// Login flow shown while the session is `LoggingIn`
pub struct LoginSurface {
    resource: String,
    connector: Arc<dyn Connector>,
    store: Arc<dyn CredentialStore>,
    prompt: Arc<dyn CredentialPrompt>,
}

impl LoginSurface {
    pub fn new(
        resource: impl Into<String>,
        connector: Arc<dyn Connector>,
        store: Arc<dyn CredentialStore>,
        prompt: Arc<dyn CredentialPrompt>,
    ) -> Self {
        Self {
            resource: resource.into(),
            connector,
            store,
            prompt,
        }
    }

    /// Prompt until a login succeeds or the user cancels
    pub async fn run(&self) -> Option<Box<dyn DeviceClient>> {
        loop {
            let Some(attempt) = self.prompt.request_credentials().await else {
                info!("interactive login cancelled");
                return None;
            };

            match self.try_authenticate(&attempt).await {
                Ok(client) => {
                    self.store_credentials(&attempt);
                    info!(username = %attempt.username, "interactive login succeeded");
                    return Some(client);
                }
                Err(e) => {
                    warn!(?e, username = %attempt.username, "interactive login failed");
                    self.prompt.report_failure(AUTH_FAILED_MESSAGE).await;
                }
            }
        }
    }

    async fn try_authenticate(
        &self,
        attempt: &LoginAttempt,
    ) -> Result<Box<dyn DeviceClient>, PortalError> {
        let client = self
            .connector
            .connect(&attempt.username, &attempt.secret)
            .await?;
        match client.read_ipd().await {
            Ok(_) => Ok(client),
            Err(e) => {
                client.close().await;
                Err(e)
            }
        }
    }

    /// Persist the credential, replacing whatever was stored for the resource
    fn store_credentials(&self, attempt: &LoginAttempt) {
        match self.store.find_by_resource(&self.resource) {
            Ok(Some(existing)) => {
                if let Err(e) = self.store.remove(&existing) {
                    warn!(?e, "failed to remove previous credential");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(?e, "credential lookup failed"),
        }

        let credential = Credential::new(&self.resource, &attempt.username, &attempt.secret);
        if let Err(e) = self.store.add(&credential) {
            error!(?e, "failed to persist credential; next start will prompt again");
        }
    }
}

/// Reads credentials from the terminal
pub struct TerminalPrompt {
    stdin: Mutex<BufReader<tokio::io::Stdin>>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }

    async fn ask(&self, label: &str) -> Option<String> {
        let mut stderr = tokio::io::stderr();
        let _ = stderr.write_all(label.as_bytes()).await;
        let _ = stderr.flush().await;

        let mut line = String::new();
        match self.stdin.lock().await.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialPrompt for TerminalPrompt {
    async fn request_credentials(&self) -> Option<LoginAttempt> {
        let username = self.ask("Device portal username (empty to cancel): ").await?;
        if username.is_empty() {
            return None;
        }
        let secret = self.ask("Device portal password: ").await?;
        Some(LoginAttempt { username, secret })
    }

    async fn report_failure(&self, message: &str) {
        let mut stderr = tokio::io::stderr();
        let _ = stderr.write_all(format!("{message}\n").as_bytes()).await;
    }
}
