//! Session states

use serde::{Deserialize, Serialize};

/// The five states of the authentication state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Startup, or re-entered after a sign-in command
    Initializing,
    /// Trying the stored credential without user interaction
    SilentAuth,
    /// Waiting on the interactive login view
    LoggingIn,
    /// No usable session
    LoggedOut,
    /// Connected; the poller is running
    LoggedIn,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Initializing
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Initializing => write!(f, "Initializing"),
            SessionState::SilentAuth => write!(f, "SilentAuth"),
            SessionState::LoggingIn => write!(f, "LoggingIn"),
            SessionState::LoggedOut => write!(f, "LoggedOut"),
            SessionState::LoggedIn => write!(f, "LoggedIn"),
        }
    }
}
