//! Forces logout when the tracked credential expires.

use crate::models::CloseReason;
use crate::session::SessionManager;
use chrono::Utc;
use client_core::timer::ScheduledTask;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::credential::Credential;

/// Invoked once the session has been closed because the credential expired.
pub type LogoutCallback = Arc<dyn Fn(CloseReason) + Send + Sync>;

pub struct TokenGuard {
    session: SessionManager,
    on_logout: LogoutCallback,
    root: CancellationToken,
    timer: Mutex<Option<ScheduledTask>>,
}

impl TokenGuard {
    pub fn new(
        session: SessionManager,
        on_logout: LogoutCallback,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            session,
            on_logout,
            root: parent.child_token(),
            timer: Mutex::new(None),
        }
    }

    /// Arm the expiry timer for `credential`, replacing any earlier one.
    ///
    /// A credential without a decodable expiry fires immediately. Returns the
    /// scheduled delay.
    pub fn track(&self, credential: &Credential) -> Duration {
        let delay = credential
            .expires_at()
            .and_then(|expiry| (expiry - Utc::now()).to_std().ok())
            .unwrap_or(Duration::ZERO);

        let session = self.session.clone();
        let on_logout = self.on_logout.clone();
        let task = ScheduledTask::spawn(&self.root, delay, async move {
            tracing::info!("Credential expired, logging out");
            if let Err(e) = session.close(CloseReason::Expired).await {
                tracing::warn!(error = %e, "Failed to close session on expiry");
            }
            on_logout(CloseReason::Expired);
        });

        let previous = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.cancel();
        }

        tracing::debug!(delay_secs = delay.as_secs(), "Credential expiry tracked");
        delay
    }

    /// Disarm the timer, e.g. on explicit logout or teardown.
    pub fn cancel(&self) {
        if let Some(timer) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|timer| !timer.is_cancelled() && !timer.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for TokenGuard {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
