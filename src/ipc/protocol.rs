//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::session::SessionState;
use crate::ui::UiEvent;
use crate::voice::Confidence;

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from the recogniser or a status client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// A phrase recognised by the speech engine
    Phrase { text: String, confidence: Confidence },

    /// Sign in without going through the recogniser
    SignIn,

    /// Sign out without going through the recogniser
    SignOut,

    /// List the phrases the recogniser should listen for
    ListPhrases,

    /// Push UI events on this connection from now on
    Subscribe,
}

/// Responses and pushed events from the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Request queued for processing
    Accepted,

    /// Session state after a sign-in or sign-out request
    Session { state: SessionState },

    /// Canonical command phrases
    Phrases { phrases: Vec<String> },

    /// Subscription confirmed
    Subscribed,

    /// UI event pushed to a subscribed client
    Event { event: UiEvent },

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current session state
    pub state: SessionState,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl DaemonStatus {
    pub fn new(state: SessionState, uptime_secs: u64) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state,
            uptime_secs,
        }
    }
}
