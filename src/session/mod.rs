//! Session module: authentication state machine and device connection owner
//!
//! States:
//! - Initializing: startup, or re-entered on sign-in
//! - SilentAuth: connecting with the stored credential
//! - LoggingIn: interactive login view is up
//! - LoggedOut: no session
//! - LoggedIn: connected and polling

mod handle;
mod manager;
mod state;

pub use handle::{SessionCommand, SessionHandle};
pub use manager::{SessionConfig, SessionDeps, SessionManager};
pub use state::SessionState;
