//! Startup wiring and shutdown

mod runtime;
mod shutdown;

pub use runtime::{Collaborators, Runtime};
pub use shutdown::ShutdownSignal;
