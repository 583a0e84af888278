//! Session manager: the authentication state machine
//!
//! Runs as a single task that owns the live device connection. Commands
//! from the poller, the voice router and IPC are handled strictly one at a
//! time, so device reads and writes for a session never interleave.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credentials::CredentialStore;
use crate::error::SessionError;
use crate::ipd::validate_ipd;
use crate::polling::PollingLoop;
use crate::portal::{Connector, DeviceClient};
use crate::ui::UiHandle;
use crate::view::ViewCoordinator;

use super::handle::{SessionCommand, SessionHandle};
use super::state::SessionState;

/// Queued commands before senders wait
const COMMAND_QUEUE: usize = 32;

/// Session behaviour knobs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Credential vault resource name for the device portal
    pub resource: String,
    /// When false the session never authenticates and stays `LoggedOut`
    pub side_loading: bool,
    /// Interval between IPD polls while logged in
    pub poll_period: Duration,
}

/// Collaborators the session drives
pub struct SessionDeps {
    pub store: Arc<dyn CredentialStore>,
    pub connector: Arc<dyn Connector>,
    pub views: ViewCoordinator,
}

/// The authentication state machine and owner of the device connection
pub struct SessionManager {
    config: SessionConfig,
    state: SessionState,
    client: Option<Box<dyn DeviceClient>>,
    store: Arc<dyn CredentialStore>,
    connector: Arc<dyn Connector>,
    views: ViewCoordinator,
    ui: UiHandle,
    state_tx: watch::Sender<SessionState>,
    handle: SessionHandle,
    poller: Option<PollingLoop>,
    token: CancellationToken,
}

impl SessionManager {
    /// Create the manager, its handle, and the command receiver for `run`
    pub fn new(
        config: SessionConfig,
        deps: SessionDeps,
        ui: UiHandle,
        token: CancellationToken,
    ) -> (Self, SessionHandle, mpsc::Receiver<SessionCommand>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let (state_tx, state_rx) = watch::channel(SessionState::Initializing);
        let handle = SessionHandle::new(tx, state_rx);

        let manager = Self {
            config,
            state: SessionState::Initializing,
            client: None,
            store: deps.store,
            connector: deps.connector,
            views: deps.views,
            ui,
            state_tx,
            handle: handle.clone(),
            poller: None,
            token,
        };

        (manager, handle, rx)
    }

    /// Run the state machine, then serve commands until cancelled
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        let token = self.token.clone();
        info!(state = %self.state, "session manager started");
        self.ui.show_state(self.state);

        if self.run_authentication(&mut commands, &token).await {
            loop {
                let command = tokio::select! {
                    _ = token.cancelled() => None,
                    command = commands.recv() => command,
                };
                let Some(command) = command else {
                    break;
                };
                if !self.handle_command(command, &mut commands, &token).await {
                    break;
                }
            }
        }

        self.teardown().await;
        info!("session manager stopped");
    }

    /// Handle one command; false once cancellation interrupted it
    async fn handle_command(
        &mut self,
        command: SessionCommand,
        commands: &mut mpsc::Receiver<SessionCommand>,
        token: &CancellationToken,
    ) -> bool {
        match command {
            SessionCommand::SignIn { reply } => {
                if self.state != SessionState::LoggedOut {
                    debug!(state = %self.state, "sign-in ignored");
                    let _ = reply.send(Ok(self.state));
                    return true;
                }
                if !self.config.side_loading {
                    warn!("sign-in ignored: side-loading is disabled");
                    let _ = reply.send(Ok(self.state));
                    return true;
                }
                let _ = reply.send(Ok(SessionState::Initializing));
                return self.run_authentication(commands, token).await;
            }
            SessionCommand::SignOut { reply } => {
                self.sign_out().await;
                let _ = reply.send(Ok(self.state));
            }
            SessionCommand::ReadIpd { reply } => {
                let _ = reply.send(self.read_ipd().await);
            }
            SessionCommand::SetIpd { value, reply } => {
                let _ = reply.send(self.set_ipd(value).await);
            }
        }
        true
    }

    /// Drive one authentication attempt to completion
    ///
    /// Commands arriving meanwhile are answered immediately: no second
    /// attempt can start and no device I/O is allowed. Returns false if
    /// cancelled first.
    async fn run_authentication(
        &mut self,
        commands: &mut mpsc::Receiver<SessionCommand>,
        token: &CancellationToken,
    ) -> bool {
        let attempt = self.authenticate();
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                _ = &mut attempt => return true,
                _ = token.cancelled() => return false,
                Some(command) = commands.recv() => reject_while_authenticating(command),
            }
        }
    }

    async fn authenticate(&mut self) {
        self.transition(SessionState::Initializing);

        if !self.config.side_loading {
            info!("side-loading disabled, staying logged out");
            self.transition(SessionState::LoggedOut);
            return;
        }

        self.transition(SessionState::SilentAuth);
        match self.try_silent_auth().await {
            Ok((client, ipd)) => {
                self.enter_logged_in(client, ipd);
                return;
            }
            Err(e) => self.report_auth_failure(&e),
        }

        self.transition(SessionState::LoggingIn);
        let handed_back = self.views.interactive_login().await;

        let resumed = match handed_back {
            Some(client) => verify(client).await,
            None => self.try_silent_auth().await,
        };
        match resumed {
            Ok((client, ipd)) => self.enter_logged_in(client, ipd),
            Err(SessionError::CredentialNotFound(_)) => {
                info!("interactive login ended without credentials");
                self.transition(SessionState::LoggedOut);
            }
            Err(e) => {
                self.report_auth_failure(&e);
                self.transition(SessionState::LoggedOut);
            }
        }
    }

    /// Connect with the stored credential and check the connection with one read
    async fn try_silent_auth(&self) -> Result<(Box<dyn DeviceClient>, f32), SessionError> {
        let resource = &self.config.resource;
        let not_found = || SessionError::CredentialNotFound(resource.clone());

        let found = match self.store.find_by_resource(resource) {
            Ok(Some(found)) => found,
            Ok(None) => return Err(not_found()),
            Err(e) => {
                debug!(?e, "credential lookup failed");
                return Err(not_found());
            }
        };
        let credential = self
            .store
            .retrieve(resource, &found.username)
            .map_err(|e| {
                debug!(?e, "credential retrieval failed");
                not_found()
            })?;
        let secret = credential.secret().ok_or_else(not_found)?;

        debug!(username = %credential.username, "attempting silent authentication");
        let client = self
            .connector
            .connect(&credential.username, secret)
            .await
            .map_err(|e| SessionError::AuthenticationFailed(e.to_string()))?;

        verify(client).await
    }

    fn report_auth_failure(&self, err: &SessionError) {
        info!(%err, state = %self.state, "authentication attempt failed");
        self.ui.show_error(err.to_string());
    }

    fn enter_logged_in(&mut self, client: Box<dyn DeviceClient>, ipd: f32) {
        self.client = Some(client);
        self.transition(SessionState::LoggedIn);
        self.ui.show_value(ipd);

        if self.poller.is_none() {
            self.poller = Some(PollingLoop::spawn(
                self.handle.clone(),
                self.ui.clone(),
                self.config.poll_period,
                self.token.child_token(),
            ));
        }
    }

    async fn sign_out(&mut self) {
        if self.state != SessionState::LoggedIn {
            debug!(state = %self.state, "sign-out ignored");
            return;
        }

        self.forget_credential();
        self.release_connection().await;
        self.transition(SessionState::LoggedOut);
        info!("signed out of device portal");
    }

    /// Best-effort removal; sign-out succeeds regardless
    fn forget_credential(&self) {
        match self.store.find_by_resource(&self.config.resource) {
            Ok(Some(credential)) => {
                if let Err(e) = self.store.remove(&credential) {
                    debug!(?e, "credential removal failed");
                }
            }
            Ok(None) => {}
            Err(e) => debug!(?e, "credential lookup failed during sign-out"),
        }
    }

    /// Stop polling and close the connection
    async fn release_connection(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        if let Some(client) = self.client.take() {
            client.close().await;
        }
    }

    async fn read_ipd(&self) -> Result<f32, SessionError> {
        let client = self.live_client()?;
        client
            .read_ipd()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))
    }

    async fn set_ipd(&self, value: f32) -> Result<f32, SessionError> {
        let value = validate_ipd(value)?;
        let client = self.live_client()?;

        client
            .write_ipd(value)
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;
        info!(ipd = value, "IPD written");

        client
            .read_ipd()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))
    }

    fn live_client(&self) -> Result<&dyn DeviceClient, SessionError> {
        match (&self.state, &self.client) {
            (SessionState::LoggedIn, Some(client)) => Ok(&**client),
            _ => Err(SessionError::NotLoggedIn),
        }
    }

    async fn teardown(&mut self) {
        self.release_connection().await;
        self.transition(SessionState::LoggedOut);
    }

    /// Move to `next`; no-op (and no notification) if already there
    fn transition(&mut self, next: SessionState) {
        if next == self.state {
            return;
        }

        info!(from = %self.state, to = %next, "state transition");
        self.state = next;
        // queued before watchers see the new state
        self.ui.show_state(next);
        self.state_tx.send_replace(next);
    }
}

/// One read proves the connection is live
async fn verify(
    client: Box<dyn DeviceClient>,
) -> Result<(Box<dyn DeviceClient>, f32), SessionError> {
    match client.read_ipd().await {
        Ok(ipd) => Ok((client, ipd)),
        Err(e) => {
            client.close().await;
            Err(SessionError::AuthenticationFailed(e.to_string()))
        }
    }
}

fn reject_while_authenticating(command: SessionCommand) {
    debug!(?command, "command rejected during authentication");
    match command {
        SessionCommand::SignIn { reply } | SessionCommand::SignOut { reply } => {
            let _ = reply.send(Err(SessionError::AuthenticationInProgress));
        }
        SessionCommand::ReadIpd { reply } | SessionCommand::SetIpd { reply, .. } => {
            let _ = reply.send(Err(SessionError::NotLoggedIn));
        }
    }
}
