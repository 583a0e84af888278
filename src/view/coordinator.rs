//! View switching and the login handoff
//!
//! `interactive_login` is the synchronization point between the session
//! and the login view: it switches views, lets the login surface run on its
//! own task, switches back, and only then completes with whatever client
//! the surface handed over.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use crate::portal::DeviceClient;

use super::login::LoginSurface;

/// Views the daemon can present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewId {
    Main,
    Login,
}

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewId::Main => write!(f, "main"),
            ViewId::Login => write!(f, "login"),
        }
    }
}

/// Presentation switcher owned by the host
#[async_trait]
pub trait ViewSwitcher: Send + Sync {
    /// Bring a view to the front; resolves once it is shown
    async fn switch_to(&self, view: ViewId);

    /// Return to the main view, optionally closing `from`
    async fn switch_back(&self, from: ViewId, consolidate: bool);
}

/// Switcher for headless runs; only logs
#[derive(Debug, Default)]
pub struct LoggingViewSwitcher;

#[async_trait]
impl ViewSwitcher for LoggingViewSwitcher {
    async fn switch_to(&self, view: ViewId) {
        info!(%view, "switching view");
    }

    async fn switch_back(&self, from: ViewId, consolidate: bool) {
        info!(%from, consolidate, "switching back to main view");
    }
}

/// Runs the interactive login on its own view and hands the result back
pub struct ViewCoordinator {
    switcher: Arc<dyn ViewSwitcher>,
    surface: Arc<LoginSurface>,
}

impl ViewCoordinator {
    pub fn new(switcher: Arc<dyn ViewSwitcher>, surface: LoginSurface) -> Self {
        Self {
            switcher,
            surface: Arc::new(surface),
        }
    }

    /// Show the login view and wait, without timeout, for it to finish
    ///
    /// Dropping the returned future aborts the login task.
    pub async fn interactive_login(&self) -> Option<Box<dyn DeviceClient>> {
        self.switcher.switch_to(ViewId::Login).await;

        let (done_tx, done_rx) = oneshot::channel();
        let surface = Arc::clone(&self.surface);
        let switcher = Arc::clone(&self.switcher);

        let _task = AbortOnDropHandle::new(tokio::spawn(async move {
            let client = surface.run().await;
            switcher.switch_back(ViewId::Login, true).await;
            if done_tx.send(client).is_err() {
                debug!("login handoff abandoned");
            }
        }));

        match done_rx.await {
            Ok(client) => client,
            Err(_) => {
                warn!("login view exited without completing the handoff");
                None
            }
        }
    }
}
