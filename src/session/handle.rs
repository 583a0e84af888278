//! Cloneable front door to the session task

use tokio::sync::{mpsc, oneshot, watch};

use crate::error::SessionError;

use super::state::SessionState;

/// Requests processed, one at a time, by the session task
#[derive(Debug)]
pub enum SessionCommand {
    SignIn {
        reply: oneshot::Sender<Result<SessionState, SessionError>>,
    },
    SignOut {
        reply: oneshot::Sender<Result<SessionState, SessionError>>,
    },
    ReadIpd {
        reply: oneshot::Sender<Result<f32, SessionError>>,
    },
    SetIpd {
        value: f32,
        reply: oneshot::Sender<Result<f32, SessionError>>,
    },
}

/// Handle held by the poller, the voice router and the IPC server
///
/// It never owns the device connection; every device call is a request to
/// the session task, which checks the current state before touching it.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<SessionCommand>,
        state_rx: watch::Receiver<SessionState>,
    ) -> Self {
        Self { tx, state_rx }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Wait until the session reaches `target`
    pub async fn wait_for(&self, target: SessionState) -> Result<(), SessionError> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| SessionError::Closed)
    }

    /// Re-enter the state machine from `LoggedOut`
    ///
    /// Resolves once the request is accepted, not when authentication ends;
    /// returns the state the session moved to (or stayed in).
    pub async fn sign_in(&self) -> Result<SessionState, SessionError> {
        self.request(|reply| SessionCommand::SignIn { reply }).await?
    }

    /// Forget the stored credential and drop the connection
    pub async fn sign_out(&self) -> Result<SessionState, SessionError> {
        self.request(|reply| SessionCommand::SignOut { reply }).await?
    }

    /// Read the IPD through the live connection
    pub async fn read_ipd(&self) -> Result<f32, SessionError> {
        self.request(|reply| SessionCommand::ReadIpd { reply }).await?
    }

    /// Write the IPD, returning the value the device reports afterwards
    pub async fn set_ipd(&self, value: f32) -> Result<f32, SessionError> {
        self.request(|reply| SessionCommand::SetIpd { value, reply }).await?
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }
}
