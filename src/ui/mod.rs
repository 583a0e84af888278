//! UI marshaling: output events and the single-consumer UI context

mod context;
mod events;

pub use context::{ConsoleDisplay, Display, UiContext, UiHandle};
pub use events::{UiEvent, READING_STATUS};
