//! Observable output events
//!
//! Everything the user can see or hear is described by a `UiEvent`. Events
//! are produced anywhere in the daemon but only ever applied by the UI
//! context.

use serde::{Deserialize, Serialize};

use crate::session::SessionState;

/// Status text shown while a poll is in flight
pub const READING_STATUS: &str = "Reading IPD...";

/// Output to apply on the UI-owning context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// Latest IPD read from the device, in millimetres
    ShowValue { ipd: f32 },

    /// Human-readable failure
    ShowError { message: String },

    /// Session state changed
    ShowState { state: SessionState },

    /// Transient progress text (the "updating" indicator)
    ShowStatus { message: String },

    /// Spoken confirmation
    Speak { text: String },
}

impl std::fmt::Display for UiEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiEvent::ShowValue { ipd } => write!(f, "SHOW_VALUE ({ipd})"),
            UiEvent::ShowError { message } => write!(f, "SHOW_ERROR ({message})"),
            UiEvent::ShowState { state } => write!(f, "SHOW_STATE ({state})"),
            UiEvent::ShowStatus { message } => write!(f, "SHOW_STATUS ({message})"),
            UiEvent::Speak { text } => write!(f, "SPEAK ({text})"),
        }
    }
}
