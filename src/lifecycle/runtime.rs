//! Wires the daemon's tasks together
//!
//! Start order is UI context, session manager, voice router. Shutdown
//! stops the session and router first and the UI context last, so the
//! final state changes still reach the display.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::portal::Connector;
use crate::session::{SessionDeps, SessionHandle, SessionManager};
use crate::ui::{Display, UiContext, UiEvent, UiHandle};
use crate::view::{CredentialPrompt, LoginSurface, ViewCoordinator, ViewSwitcher};
use crate::voice::{RecognizedPhrase, VoiceCommandRouter, VoiceCommands};

/// Capacity of the UI event broadcast to IPC subscribers
const EVENT_CAPACITY: usize = 64;

/// Host-provided pieces the daemon runs against
pub struct Collaborators {
    pub store: Arc<dyn CredentialStore>,
    pub connector: Arc<dyn Connector>,
    pub switcher: Arc<dyn ViewSwitcher>,
    pub prompt: Arc<dyn CredentialPrompt>,
    pub display: Box<dyn Display>,
}

/// Running daemon tasks and the handles into them
pub struct Runtime {
    session: SessionHandle,
    ui: UiHandle,
    phrases: mpsc::Sender<RecognizedPhrase>,
    events: broadcast::Sender<UiEvent>,
    commands: Arc<VoiceCommands>,
    token: CancellationToken,
    ui_token: CancellationToken,
    services: Vec<JoinHandle<()>>,
    ui_task: JoinHandle<()>,
}

impl Runtime {
    /// Spawn every task; authentication starts immediately
    pub fn init(config: &Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            store,
            connector,
            switcher,
            prompt,
            display,
        } = collaborators;

        let ui_token = CancellationToken::new();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (ui_context, ui) = UiContext::new(display, events.clone());
        let ui_task = tokio::spawn(ui_context.run(ui_token.clone()));

        let token = CancellationToken::new();
        let surface = LoginSurface::new(
            config.resource.clone(),
            Arc::clone(&connector),
            Arc::clone(&store),
            prompt,
        );
        let deps = SessionDeps {
            store,
            connector,
            views: ViewCoordinator::new(switcher, surface),
        };
        let (manager, session, session_rx) =
            SessionManager::new(config.session(), deps, ui.clone(), token.child_token());
        let session_task = tokio::spawn(manager.run(session_rx));

        let commands = Arc::new(VoiceCommands::build(config.phrase_range.clone()));
        let (phrases, phrase_rx) = mpsc::channel(config.phrase_queue);
        let router = VoiceCommandRouter::new(
            Arc::clone(&commands),
            session.clone(),
            ui.clone(),
            config.min_confidence,
        );
        let router_task = tokio::spawn(router.run(phrase_rx, token.child_token()));

        info!(
            resource = %config.resource,
            phrases = commands.len(),
            "runtime started"
        );

        Self {
            session,
            ui,
            phrases,
            events,
            commands,
            token,
            ui_token,
            services: vec![session_task, router_task],
            ui_task,
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn ui(&self) -> &UiHandle {
        &self.ui
    }

    /// Queue for recognised phrases
    pub fn phrase_sender(&self) -> mpsc::Sender<RecognizedPhrase> {
        self.phrases.clone()
    }

    /// Every UI event after it has been applied to the display
    pub fn events(&self) -> broadcast::Sender<UiEvent> {
        self.events.clone()
    }

    pub fn commands(&self) -> Arc<VoiceCommands> {
        Arc::clone(&self.commands)
    }

    /// Stop every task and wait for them to finish
    pub async fn shutdown(self) {
        self.token.cancel();
        drop(self.phrases);

        for task in self.services {
            if let Err(e) = task.await {
                warn!(?e, "task ended abnormally");
            }
        }

        self.ui_token.cancel();
        if let Err(e) = self.ui_task.await {
            warn!(?e, "UI context ended abnormally");
        }

        info!("runtime stopped");
    }
}
