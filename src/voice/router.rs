//! Voice command dispatch
//!
//! Consumes recognised phrases from a bounded channel, so the recognition
//! engine's threading never reaches the session directly.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::ipd::validate_ipd;
use crate::session::{SessionHandle, SessionState};
use crate::ui::UiHandle;

use super::commands::{VoiceAction, VoiceCommands};

/// Recogniser confidence, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Rejected,
    Low,
    Medium,
    High,
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rejected" => Ok(Confidence::Rejected),
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            other => Err(format!("unknown confidence level: {other}")),
        }
    }
}

/// One event from the speech recogniser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedPhrase {
    pub text: String,
    pub confidence: Confidence,
}

impl RecognizedPhrase {
    pub fn new(text: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// What dispatching a phrase did
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Not in the phrase table
    Unrecognized,
    /// Below the confidence threshold
    LowConfidence,
    /// Sign-in/sign-out forwarded; carries the resulting state
    Session(SessionState),
    /// Write issued; carries the value the device reports afterwards
    Written(f32),
    /// Not attempted or failed; the error was reported unless it was a no-op
    Failed(SessionError),
}

/// Maps recognised phrases to session actions
pub struct VoiceCommandRouter {
    commands: Arc<VoiceCommands>,
    session: SessionHandle,
    ui: UiHandle,
    min_confidence: Confidence,
}

impl VoiceCommandRouter {
    pub fn new(
        commands: Arc<VoiceCommands>,
        session: SessionHandle,
        ui: UiHandle,
        min_confidence: Confidence,
    ) -> Self {
        Self {
            commands,
            session,
            ui,
            min_confidence,
        }
    }

    /// Dispatch phrases until the channel closes or the token fires
    pub async fn run(
        self,
        mut phrases: mpsc::Receiver<RecognizedPhrase>,
        token: CancellationToken,
    ) {
        info!(phrases = self.commands.len(), "voice command router started");

        loop {
            let phrase = tokio::select! {
                _ = token.cancelled() => break,
                phrase = phrases.recv() => phrase,
            };
            let Some(phrase) = phrase else {
                break;
            };
            let outcome = self.dispatch(&phrase).await;
            debug!(text = %phrase.text, ?outcome, "phrase dispatched");
        }

        info!("voice command router stopped");
    }

    /// Handle one recognised phrase
    pub async fn dispatch(&self, phrase: &RecognizedPhrase) -> Dispatch {
        let Some(action) = self.commands.lookup(&phrase.text) else {
            return Dispatch::Unrecognized;
        };
        if phrase.confidence < self.min_confidence {
            debug!(
                text = %phrase.text,
                confidence = ?phrase.confidence,
                "phrase below confidence threshold"
            );
            return Dispatch::LowConfidence;
        }

        info!(text = %phrase.text, ?action, "voice command");
        match action {
            VoiceAction::SignIn => self.session_result(self.session.sign_in().await),
            VoiceAction::SignOut => self.session_result(self.session.sign_out().await),
            VoiceAction::SetIpd { value } => self.set_ipd(value).await,
        }
    }

    async fn set_ipd(&self, value: f32) -> Dispatch {
        if let Err(e) = validate_ipd(value) {
            self.ui.show_error(e.to_string());
            return Dispatch::Failed(e);
        }

        match self.session.set_ipd(value).await {
            Ok(ipd) => {
                self.ui.show_value(ipd);
                self.ui.speak(format!("IPD set to {ipd}"));
                Dispatch::Written(ipd)
            }
            Err(SessionError::NotLoggedIn) => {
                debug!(value, "IPD write skipped: not logged in");
                Dispatch::Failed(SessionError::NotLoggedIn)
            }
            Err(e) => {
                warn!(%e, value, "IPD write failed");
                self.ui.show_error(e.to_string());
                Dispatch::Failed(e)
            }
        }
    }

    fn session_result(&self, result: Result<SessionState, SessionError>) -> Dispatch {
        match result {
            Ok(state) => Dispatch::Session(state),
            Err(SessionError::NotLoggedIn) => Dispatch::Failed(SessionError::NotLoggedIn),
            Err(e) => {
                info!(%e, "session command not applied");
                self.ui.show_error(e.to_string());
                Dispatch::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::{broadcast, watch};

    use super::*;
    use crate::session::SessionCommand;
    use crate::ui::{Display, UiContext, UiEvent};

    struct Recorder(Arc<std::sync::Mutex<Vec<UiEvent>>>);

    impl Display for Recorder {
        fn apply(&mut self, event: &UiEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    struct Fixture {
        router: VoiceCommandRouter,
        commands: mpsc::Receiver<SessionCommand>,
        seen: Arc<std::sync::Mutex<Vec<UiEvent>>>,
        ui: UiHandle,
    }

    fn fixture() -> Fixture {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let (event_tx, _) = broadcast::channel(16);
        let (context, ui) = UiContext::new(Box::new(Recorder(Arc::clone(&seen))), event_tx);
        tokio::spawn(context.run(CancellationToken::new()));

        let (tx, commands) = mpsc::channel(8);
        let (_state_tx, state_rx) = watch::channel(SessionState::LoggedIn);
        let session = SessionHandle::new(tx, state_rx);

        Fixture {
            router: VoiceCommandRouter::new(
                Arc::new(VoiceCommands::default()),
                session,
                ui.clone(),
                Confidence::Medium,
            ),
            commands,
            seen,
            ui,
        }
    }

    #[tokio::test]
    async fn test_out_of_range_never_reaches_session() {
        let mut f = fixture();

        let outcome = f
            .router
            .dispatch(&RecognizedPhrase::new("Set IPD to 80", Confidence::High))
            .await;
        assert_eq!(outcome, Dispatch::Failed(SessionError::Validation(80.0)));
        assert!(f.commands.try_recv().is_err());

        f.ui.flush().await;
        assert_eq!(
            *f.seen.lock().unwrap(),
            vec![UiEvent::ShowError {
                message: "IPD must be between 55 - 75".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_unrecognized_phrase_is_silent() {
        let mut f = fixture();

        let outcome = f
            .router
            .dispatch(&RecognizedPhrase::new("open the pod bay doors", Confidence::High))
            .await;
        assert_eq!(outcome, Dispatch::Unrecognized);
        assert!(f.commands.try_recv().is_err());

        f.ui.flush().await;
        assert!(f.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_low_confidence_ignored() {
        let mut f = fixture();

        let outcome = f
            .router
            .dispatch(&RecognizedPhrase::new("Set IPD to 62", Confidence::Low))
            .await;
        assert_eq!(outcome, Dispatch::LowConfidence);
        assert!(f.commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_valid_value_forwarded_and_confirmed() {
        let Fixture {
            router,
            mut commands,
            seen,
            ui,
        } = fixture();

        tokio::spawn(async move {
            if let Some(SessionCommand::SetIpd { value, reply }) = commands.recv().await {
                let _ = reply.send(Ok(value));
            }
        });

        let outcome = router
            .dispatch(&RecognizedPhrase::new("Set IPD to 62", Confidence::Medium))
            .await;
        assert_eq!(outcome, Dispatch::Written(62.0));

        ui.flush().await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                UiEvent::ShowValue { ipd: 62.0 },
                UiEvent::Speak {
                    text: "IPD set to 62".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_not_logged_in_is_a_quiet_no_op() {
        let Fixture {
            router,
            mut commands,
            seen,
            ui,
        } = fixture();

        tokio::spawn(async move {
            if let Some(SessionCommand::SetIpd { reply, .. }) = commands.recv().await {
                let _ = reply.send(Err(SessionError::NotLoggedIn));
            }
        });

        let outcome = router
            .dispatch(&RecognizedPhrase::new("Set IPD to 60", Confidence::High))
            .await;
        assert_eq!(outcome, Dispatch::Failed(SessionError::NotLoggedIn));

        ui.flush().await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_sign_in_is_shown() {
        let Fixture {
            router,
            mut commands,
            seen,
            ui,
        } = fixture();

        tokio::spawn(async move {
            if let Some(SessionCommand::SignIn { reply }) = commands.recv().await {
                let _ = reply.send(Err(SessionError::AuthenticationInProgress));
            }
        });

        let outcome = router
            .dispatch(&RecognizedPhrase::new("Sign in to device portal", Confidence::High))
            .await;
        assert_eq!(
            outcome,
            Dispatch::Failed(SessionError::AuthenticationInProgress)
        );

        ui.flush().await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![UiEvent::ShowError {
                message: SessionError::AuthenticationInProgress.to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_failed_write_is_shown() {
        let Fixture {
            router,
            mut commands,
            seen,
            ui,
        } = fixture();

        tokio::spawn(async move {
            if let Some(SessionCommand::SetIpd { reply, .. }) = commands.recv().await {
                let _ = reply.send(Err(SessionError::Network("connection reset".into())));
            }
        });

        let outcome = router
            .dispatch(&RecognizedPhrase::new("Set IPD to 64", Confidence::High))
            .await;
        assert_eq!(
            outcome,
            Dispatch::Failed(SessionError::Network("connection reset".into()))
        );

        ui.flush().await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![UiEvent::ShowError {
                message: "device portal request failed: connection reset".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_only_in_range_values_reach_the_session() {
        let Fixture {
            router,
            mut commands,
            ..
        } = fixture();

        let written = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = Arc::clone(&written);
        tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                if let SessionCommand::SetIpd { value, reply } = command {
                    log.lock().unwrap().push(value);
                    let _ = reply.send(Ok(value));
                }
            }
        });

        for value in 50..=80u32 {
            let phrase = RecognizedPhrase::new(format!("Set IPD to {value}"), Confidence::High);
            let outcome = router.dispatch(&phrase).await;
            if (55..=75).contains(&value) {
                assert_eq!(outcome, Dispatch::Written(value as f32), "value {value}");
            } else {
                assert_eq!(
                    outcome,
                    Dispatch::Failed(SessionError::Validation(value as f32)),
                    "value {value}"
                );
            }
        }

        let expected: Vec<f32> = (55..=75u32).map(|v| v as f32).collect();
        assert_eq!(*written.lock().unwrap(), expected);
    }

    #[test]
    fn test_confidence_parsing_and_order() {
        assert_eq!("HIGH".parse::<Confidence>(), Ok(Confidence::High));
        assert!("certain".parse::<Confidence>().is_err());
        assert!(Confidence::Low < Confidence::Medium);
    }
}
