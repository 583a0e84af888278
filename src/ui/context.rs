//! The UI-owning context
//!
//! A single task consumes a queue of posted events and applies them, in
//! order, to the display. Other components hold a [`UiHandle`] and only
//! ever enqueue; none of them touch the display directly.

use std::io::Write;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::SessionState;

use super::events::UiEvent;

/// Receives events on the UI context
pub trait Display: Send {
    fn apply(&mut self, event: &UiEvent);
}

enum UiMessage {
    Event(UiEvent),
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle for posting output to the UI context
#[derive(Clone)]
pub struct UiHandle {
    tx: mpsc::UnboundedSender<UiMessage>,
}

impl UiHandle {
    /// Enqueue an event; dropped if the context has stopped
    pub fn post(&self, event: UiEvent) {
        if self.tx.send(UiMessage::Event(event)).is_err() {
            debug!("UI context stopped, dropping event");
        }
    }

    pub fn show_value(&self, ipd: f32) {
        self.post(UiEvent::ShowValue { ipd });
    }

    pub fn show_error(&self, message: impl Into<String>) {
        self.post(UiEvent::ShowError {
            message: message.into(),
        });
    }

    pub fn show_state(&self, state: SessionState) {
        self.post(UiEvent::ShowState { state });
    }

    pub fn show_status(&self, message: impl Into<String>) {
        self.post(UiEvent::ShowStatus {
            message: message.into(),
        });
    }

    pub fn speak(&self, text: impl Into<String>) {
        self.post(UiEvent::Speak { text: text.into() });
    }

    /// Resolve once every event posted before this call has been applied
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(UiMessage::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Single consumer of the UI queue
pub struct UiContext {
    rx: mpsc::UnboundedReceiver<UiMessage>,
    display: Box<dyn Display>,
    event_tx: broadcast::Sender<UiEvent>,
}

impl UiContext {
    /// Create the context and the handle used to post to it
    ///
    /// Applied events are republished on `event_tx` for IPC subscribers.
    pub fn new(
        display: Box<dyn Display>,
        event_tx: broadcast::Sender<UiEvent>,
    ) -> (Self, UiHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx,
                display,
                event_tx,
            },
            UiHandle { tx },
        )
    }

    /// Apply events until cancelled; anything already queued is drained first
    pub async fn run(mut self, token: CancellationToken) {
        info!("UI context started");

        loop {
            tokio::select! {
                biased;
                message = self.rx.recv() => match message {
                    Some(message) => self.handle(message),
                    None => break,
                },
                _ = token.cancelled() => {
                    while let Ok(message) = self.rx.try_recv() {
                        self.handle(message);
                    }
                    break;
                }
            }
        }

        info!("UI context stopped");
    }

    fn handle(&mut self, message: UiMessage) {
        match message {
            UiMessage::Event(event) => {
                debug!(%event, "applying UI event");
                self.display.apply(&event);
                let _ = self.event_tx.send(event);
            }
            UiMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// Writes each event to stdout as one JSON line
#[derive(Debug, Default)]
pub struct ConsoleDisplay;

impl Display for ConsoleDisplay {
    fn apply(&mut self, event: &UiEvent) {
        match serde_json::to_string(event) {
            Ok(line) => {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = writeln!(stdout, "{line}") {
                    warn!(?e, "failed to write UI event");
                }
            }
            Err(e) => warn!(?e, "failed to encode UI event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct Recorder(Arc<Mutex<Vec<UiEvent>>>);

    impl Display for Recorder {
        fn apply(&mut self, event: &UiEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn start() -> (
        UiHandle,
        Arc<Mutex<Vec<UiEvent>>>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (event_tx, _) = broadcast::channel(16);
        let (context, handle) = UiContext::new(Box::new(Recorder(Arc::clone(&seen))), event_tx);
        let token = CancellationToken::new();
        let task = tokio::spawn(context.run(token.clone()));
        (handle, seen, token, task)
    }

    #[tokio::test]
    async fn test_events_applied_in_post_order() {
        let (ui, seen, _token, _task) = start();

        ui.show_status("Reading IPD...");
        ui.show_value(63.5);
        ui.show_error("boom");
        ui.flush().await;

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                UiEvent::ShowStatus {
                    message: "Reading IPD...".into()
                },
                UiEvent::ShowValue { ipd: 63.5 },
                UiEvent::ShowError {
                    message: "boom".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_drains_queue() {
        let (ui, seen, token, task) = start();

        ui.speak("IPD set to 62");
        token.cancel();
        task.await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
        // posting after shutdown is a silent no-op
        ui.show_value(60.0);
        ui.flush().await;
    }

    #[tokio::test]
    async fn test_applied_events_are_republished() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (event_tx, mut event_rx) = broadcast::channel(16);
        let (context, ui) = UiContext::new(Box::new(Recorder(seen)), event_tx);
        tokio::spawn(context.run(CancellationToken::new()));

        ui.show_state(SessionState::LoggedOut);
        let event = event_rx.recv().await.unwrap();
        assert_eq!(
            event,
            UiEvent::ShowState {
                state: SessionState::LoggedOut
            }
        );
    }
}
