//! Unix domain socket server for IPC
//!
//! Bridges the external speech recogniser into the daemon (recognised
//! phrases are queued for the voice router) and serves status queries and
//! push notifications of UI events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::session::{SessionHandle, SessionState};
use crate::ui::UiEvent;
use crate::voice::{RecognizedPhrase, VoiceCommands};

use super::protocol::{DaemonStatus, Request, Response, MAX_FRAME_LEN};

/// Everything a client connection needs from the daemon
#[derive(Clone)]
pub struct ServerContext {
    pub session: SessionHandle,
    pub phrases: mpsc::Sender<RecognizedPhrase>,
    pub commands: Arc<VoiceCommands>,
    pub events: broadcast::Sender<UiEvent>,
}

struct Shared {
    context: ServerContext,
    start_time: Instant,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket, replacing a stale one
    pub fn new(socket_path: &Path, context: ServerContext) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            shared: Arc::new(Shared {
                context,
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Serve one connection: requests in, responses and pushed events out
async fn handle_client(stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let (request_tx, mut request_rx) = mpsc::channel(8);
    let _reader = AbortOnDropHandle::new(tokio::spawn(read_requests(reader, request_tx)));
    let mut events: Option<broadcast::Receiver<UiEvent>> = None;

    loop {
        tokio::select! {
            request = request_rx.recv() => {
                let Some(request) = request else {
                    debug!("client disconnected");
                    return Ok(());
                };
                let response = match request {
                    Ok(request) => {
                        debug!(?request, "received request");
                        let (response, subscribe) = process_request(request, &shared).await;
                        if subscribe && events.is_none() {
                            events = Some(shared.context.events.subscribe());
                            debug!("client subscribed to notifications");
                        }
                        response
                    }
                    Err(message) => Response::error("bad_request", message),
                };
                send_message(&mut writer, &response).await?;
            }
            event = next_event(&mut events) => match event {
                Ok(event) => send_message(&mut writer, &Response::Event { event }).await?,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => events = None,
            },
        }
    }
}

/// Decode length-prefixed frames until EOF
async fn read_requests(
    mut reader: OwnedReadHalf,
    requests: mpsc::Sender<Result<Request, String>>,
) {
    let mut len_buf = [0u8; 4];

    loop {
        // Read message length (4-byte little-endian)
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return,
            Err(e) => {
                warn!(?e, "client read error");
                return;
            }
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            warn!(len, "message too large, disconnecting");
            return;
        }

        // Read message body
        let mut msg_buf = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut msg_buf).await {
            warn!(?e, "truncated frame");
            return;
        }

        let request = serde_json::from_slice::<Request>(&msg_buf)
            .map_err(|e| format!("invalid request: {e}"));
        if requests.send(request).await.is_err() {
            return;
        }
    }
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<UiEvent>>,
) -> Result<UiEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Send a length-prefixed JSON message
async fn send_message<T: serde::Serialize>(writer: &mut OwnedWriteHalf, msg: &T) -> Result<()> {
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

/// Process a request and return a response
/// Returns (Response, should_subscribe)
async fn process_request(request: Request, shared: &Shared) -> (Response, bool) {
    let context = &shared.context;
    match request {
        Request::Ping => (Response::Pong, false),

        Request::GetStatus => {
            let status = DaemonStatus::new(
                context.session.state(),
                shared.start_time.elapsed().as_secs(),
            );
            (Response::Status(status), false)
        }

        Request::Phrase { text, confidence } => {
            let response = match context.phrases.try_send(RecognizedPhrase { text, confidence }) {
                Ok(()) => Response::Accepted,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    Response::error("busy", "voice command queue is full")
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    Response::error("unavailable", "voice command router is not running")
                }
            };
            (response, false)
        }

        Request::SignIn => (session_response(context.session.sign_in().await), false),

        Request::SignOut => (session_response(context.session.sign_out().await), false),

        Request::ListPhrases => (
            Response::Phrases {
                phrases: context.commands.phrases().to_vec(),
            },
            false,
        ),

        Request::Subscribe => (Response::Subscribed, true),
    }
}

fn session_response(result: Result<SessionState, SessionError>) -> Response {
    match result {
        Ok(state) => Response::Session { state },
        Err(e) => Response::error("session", e.to_string()),
    }
}
