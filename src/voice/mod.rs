//! Voice command table and router

mod commands;
mod router;

pub use commands::{
    VoiceAction, VoiceCommands, DEFAULT_PHRASE_RANGE, SIGN_IN_PHRASE, SIGN_OUT_PHRASE,
};
pub use router::{Confidence, Dispatch, RecognizedPhrase, VoiceCommandRouter};
