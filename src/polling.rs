//! Periodic IPD poll while logged in
//!
//! A failed poll is reported and retried on the next tick; it never changes
//! the session state.

use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::session::SessionHandle;
use crate::ui::{UiHandle, READING_STATUS};

/// Default interval between polls
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(5);

/// A running poll task, stopped through its token
pub struct PollingLoop {
    token: CancellationToken,
}

impl PollingLoop {
    /// Start polling through `session` every `period`
    pub fn spawn(
        session: SessionHandle,
        ui: UiHandle,
        period: Duration,
        token: CancellationToken,
    ) -> Self {
        tokio::spawn(run(session, ui, period, token.clone()));
        Self { token }
    }

    /// Signal the task to stop; it exits at its next suspension point
    pub fn stop(self) {
        self.token.cancel();
        debug!("polling loop stop requested");
    }
}

async fn run(session: SessionHandle, ui: UiHandle, period: Duration, token: CancellationToken) {
    info!(period_secs = period.as_secs_f32(), "polling loop started");

    // the session has just shown a verified value; first read is one period out
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        ui.show_status(READING_STATUS);

        let result = tokio::select! {
            _ = token.cancelled() => break,
            result = session.read_ipd() => result,
        };
        if token.is_cancelled() {
            break;
        }

        match result {
            Ok(ipd) => ui.show_value(ipd),
            Err(e) => {
                debug!(%e, "poll failed");
                ui.show_error(e.to_string());
            }
        }
    }

    info!("polling loop stopped");
}
