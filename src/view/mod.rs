//! Interactive login view and the handoff back to the session

mod coordinator;
mod login;

pub use coordinator::{LoggingViewSwitcher, ViewCoordinator, ViewId, ViewSwitcher};
pub use login::{CredentialPrompt, LoginAttempt, LoginSurface, TerminalPrompt};
