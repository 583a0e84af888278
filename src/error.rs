//! Error types shared across the daemon
//!
//! `PortalError` covers the device portal transport, `CredentialError` the
//! credential vault, and `SessionError` is the user-facing taxonomy every
//! other failure is folded into before it reaches the display.

use thiserror::Error;

/// Message shown when an interactive login attempt is rejected
pub const AUTH_FAILED_MESSAGE: &str =
    "Authentication was not successful. Please make sure Device Portal is enabled and check your password.";

/// Errors raised by the device portal client
#[derive(Debug, Error)]
pub enum PortalError {
    /// The portal rejected the supplied username/secret
    #[error("device portal rejected the credentials")]
    Unauthorized,

    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status other than an auth rejection
    #[error("device portal returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Body did not have the expected shape
    #[error("invalid device portal response: {0}")]
    InvalidResponse(String),

    /// Endpoint could not be parsed or uses an unsupported scheme
    #[error("invalid device portal endpoint: {0}")]
    InvalidEndpoint(String),

    /// The connection was released by `close`
    #[error("device portal connection is closed")]
    Closed,
}

impl PortalError {
    /// Whether the failure means the credentials themselves are bad
    pub fn is_auth(&self) -> bool {
        matches!(self, PortalError::Unauthorized)
    }
}

/// Errors raised by a credential store backend
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No entry for the resource (and username, where given)
    #[error("no credential stored for {0}")]
    NotFound(String),

    /// The backing vault failed
    #[error("credential store error: {0}")]
    Backend(String),
}

pub type CredentialResult<T> = Result<T, CredentialError>;

/// Failures surfaced by the session and the components feeding it
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    /// Nothing stored for the resource; leads to interactive login
    #[error("no stored credential for {0}")]
    CredentialNotFound(String),

    /// Connect or the verification read failed during authentication
    #[error("{msg} ({0})", msg = AUTH_FAILED_MESSAGE)]
    AuthenticationFailed(String),

    /// A read or write failed on an established connection
    #[error("device portal request failed: {0}")]
    Network(String),

    /// Dictated value outside the supported IPD range
    #[error("IPD must be between 55 - 75")]
    Validation(f32),

    /// Sign-in/sign-out arrived while authentication is running
    #[error("an authentication attempt is already in progress")]
    AuthenticationInProgress,

    /// Device I/O requested while not logged in
    #[error("not signed in to the device portal")]
    NotLoggedIn,

    /// The session task is gone
    #[error("session is not running")]
    Closed,
}
