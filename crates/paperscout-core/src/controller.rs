//! Bridges UI intents into session start/cancel calls.
//!
//! The controller owns the single "active session" handle — the only shared
//! mutable resource in the system. It is mutated exclusively on the caller's
//! event loop: intents (`refresh`, `apply_settings`, `enter_view`,
//! `leave_view`) and delivered [`SessionEvent`]s both arrive there, so no
//! locking is needed. The discipline is purely "check session identity
//! before acting on a delivered event".

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::session::{
    self, RecommendationSession, RecommendationTransport, SessionEvent, SessionId, Snapshot,
};
use crate::settings::QuerySettings;
use crate::{SessionError, SessionOutcome};

/// Result of an `apply_settings` intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A new session was started for the changed settings.
    Started(SessionId),
    /// Fingerprint unchanged since the last executed query; no network call
    /// was made. Surface as a "nothing changed" notice.
    Unchanged,
}

/// What the UI should do after the controller consumed a session event.
#[derive(Debug)]
pub enum ControllerUpdate {
    Progress(Snapshot),
    Finished(Result<SessionOutcome, SessionError>),
}

struct ActiveSession {
    id: SessionId,
    cancel: CancellationToken,
}

/// Enforces the single-active-session invariant across all UI triggers.
pub struct SessionController {
    transport: Arc<dyn RecommendationTransport>,
    events: mpsc::UnboundedSender<SessionEvent>,
    active: Option<ActiveSession>,
    last_fingerprint: Option<String>,
    last_outcome: Option<SessionOutcome>,
}

impl SessionController {
    /// Build a controller. Session events are delivered on `events`; the
    /// caller must pump the paired receiver into [`handle_event`].
    ///
    /// [`handle_event`]: SessionController::handle_event
    pub fn new(
        transport: Arc<dyn RecommendationTransport>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            transport,
            events,
            active: None,
            last_fingerprint: None,
            last_outcome: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn last_outcome(&self) -> Option<&SessionOutcome> {
        self.last_outcome.as_ref()
    }

    /// Explicit refresh: always cancels any active session and starts a new
    /// one with `force_refresh` set, regardless of fingerprint or cache.
    pub fn refresh(&mut self, settings: &QuerySettings) -> Result<SessionId, SessionError> {
        self.start(settings, true)
    }

    /// Settings-applied intent. Starts a new session only when the
    /// fingerprint differs from the last executed query.
    pub fn apply_settings(&mut self, settings: &QuerySettings) -> Result<Applied, SessionError> {
        if !settings.has_changed_since(self.last_fingerprint.as_deref()) {
            tracing::debug!("settings unchanged; not starting a session");
            return Ok(Applied::Unchanged);
        }
        self.start(settings, false).map(Applied::Started)
    }

    /// First entry into the recommendations view. Auto-starts only when no
    /// prior result exists and nothing is running — repeated tab switches
    /// within one page lifetime must not re-query.
    pub fn enter_view(
        &mut self,
        settings: &QuerySettings,
    ) -> Result<Option<SessionId>, SessionError> {
        if self.last_outcome.is_some() || self.active.is_some() {
            return Ok(None);
        }
        self.start(settings, false).map(Some)
    }

    /// Navigation away from the recommendations view: cancel any active
    /// session, keep the last outcome for when the user returns.
    pub fn leave_view(&mut self) {
        self.cancel_active();
    }

    /// Consume one delivered session event. Events from any session other
    /// than the current active one are stale and dropped.
    pub fn handle_event(&mut self, event: SessionEvent) -> Option<ControllerUpdate> {
        let current = self.active_id();
        match event {
            SessionEvent::Snapshot { session, snapshot } => {
                if current != Some(session) {
                    tracing::trace!(session = session.value(), "dropping stale snapshot");
                    return None;
                }
                Some(ControllerUpdate::Progress(snapshot))
            }
            SessionEvent::Finished { session, result } => {
                if current != Some(session) {
                    tracing::trace!(session = session.value(), "dropping stale result");
                    return None;
                }
                self.active = None;
                if let Ok(outcome) = &result {
                    self.last_outcome = Some(outcome.clone());
                }
                Some(ControllerUpdate::Finished(result))
            }
        }
    }

    /// Validate, cancel any running session, and spawn a fresh one.
    ///
    /// Validation happens first: an invalid query must not tear down a
    /// session that is already running.
    fn start(
        &mut self,
        settings: &QuerySettings,
        force_refresh: bool,
    ) -> Result<SessionId, SessionError> {
        let session = RecommendationSession::new(settings)?;
        self.cancel_active();

        let id = session.id();
        let cancel = CancellationToken::new();
        tokio::spawn(session::drive(
            session,
            Arc::clone(&self.transport),
            settings.clone(),
            force_refresh,
            self.events.clone(),
            cancel.clone(),
        ));
        self.active = Some(ActiveSession { id, cancel });
        self.last_fingerprint = Some(settings.fingerprint());
        tracing::info!(session = id.value(), force_refresh, "session started");
        Ok(id)
    }

    /// Release the active handle, exactly once. Taking the `Option` first
    /// makes a double release impossible.
    fn cancel_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            tracing::debug!(session = active.id.value(), "cancelled active session");
        }
    }
}
