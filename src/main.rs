//! ipd-portal-daemon: background daemon for headset IPD adjustment
//!
//! This daemon provides:
//! - Silent and interactive authentication to the device portal
//! - Periodic IPD polling while signed in
//! - Voice command routing for sign-in, sign-out and "Set IPD to V"
//! - IPC server the speech recogniser and status clients connect to

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ipd_portal_daemon::config::{Config, CredentialBackend};
use ipd_portal_daemon::credentials::{
    CredentialStore, KeyringCredentialStore, MemoryCredentialStore,
};
use ipd_portal_daemon::ipc::{Server, ServerContext};
use ipd_portal_daemon::lifecycle::{Collaborators, Runtime, ShutdownSignal};
use ipd_portal_daemon::portal::PortalConnector;
use ipd_portal_daemon::ui::ConsoleDisplay;
use ipd_portal_daemon::view::{LoggingViewSwitcher, TerminalPrompt};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries UI events
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "ipd-portal-daemon starting"
    );

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        portal = %config.portal_url,
        backend = ?config.credential_backend,
        "configuration loaded"
    );

    let store: Arc<dyn CredentialStore> = match config.credential_backend {
        CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new()),
        CredentialBackend::Memory => Arc::new(MemoryCredentialStore::new()),
    };

    let shutdown = ShutdownSignal::new();

    let runtime = Runtime::init(
        &config,
        Collaborators {
            store,
            connector: Arc::new(PortalConnector::new(config.portal_url.clone())),
            switcher: Arc::new(LoggingViewSwitcher),
            prompt: Arc::new(TerminalPrompt::new()),
            display: Box::new(ConsoleDisplay),
        },
    );

    let server = Server::new(
        &config.socket_path,
        ServerContext {
            session: runtime.session().clone(),
            phrases: runtime.phrase_sender(),
            commands: runtime.commands(),
            events: runtime.events(),
        },
    )?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "failed to listen for shutdown signals"),
            }
        }
    }

    info!("shutting down...");

    server.shutdown().await;
    runtime.shutdown().await;

    info!("ipd-portal-daemon stopped");

    Ok(())
}
