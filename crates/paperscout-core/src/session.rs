//! The progressive-recommendation session: one streamed request's lifecycle.
//!
//! A session is created per query, moves `Idle → Active` when its stream
//! opens, and ends in exactly one of `Succeeded`, `Failed`, or `Cancelled`.
//! Terminal states are final; a new query always builds a fresh session.
//!
//! All event handling funnels through [`RecommendationSession::apply_event`],
//! which is a no-op once the session has left `Active` — that single check is
//! the defense against stragglers the transport delivers after cancellation.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::settings::QuerySettings;
use crate::stats::StatsAccumulator;
use crate::{SessionError, SessionOutcome, StreamEvent, TransportError};

/// The lazy, finite-but-unbounded sequence of events from one open stream.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, TransportError>> + Send>>;

/// Transport seam: opens the server-push recommendation stream for a query.
///
/// Implemented over HTTP/SSE by `paperscout-api`; tests use [`crate::mock`].
pub trait RecommendationTransport: Send + Sync {
    fn open<'a>(
        &'a self,
        settings: &'a QuerySettings,
        force_refresh: bool,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, TransportError>> + Send + 'a>>;
}

/// Opaque session identity token. Monotonically increasing, never reused
/// within a process, so a stale event can always be told apart from a
/// current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SessionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Failed | SessionState::Cancelled
        )
    }
}

/// UI-facing view of an `Active` session after one progress event.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Display percent, clamped to 0..=100 and monotonically non-decreasing.
    pub percent: u8,
    /// The raw message text of the event, verbatim.
    pub message: String,
    /// Rendered stats line (see [`StatsAccumulator::render`]).
    pub stats_line: String,
}

/// What applying one event did to the session.
#[derive(Debug)]
pub enum EventEffect {
    Snapshot(Snapshot),
    Finished(Result<SessionOutcome, SessionError>),
}

/// Events a running session emits toward the controller's event loop,
/// tagged with the emitting session's identity.
#[derive(Debug)]
pub enum SessionEvent {
    Snapshot {
        session: SessionId,
        snapshot: Snapshot,
    },
    Finished {
        session: SessionId,
        result: Result<SessionOutcome, SessionError>,
    },
}

/// State machine for one streamed recommendation request.
#[derive(Debug)]
pub struct RecommendationSession {
    id: SessionId,
    state: SessionState,
    percent: u8,
    stats: StatsAccumulator,
    fingerprint: String,
}

impl RecommendationSession {
    /// Build a session for `settings`. Fails without side effects when no
    /// category is selected — the validation error never reaches the
    /// transport.
    pub fn new(settings: &QuerySettings) -> Result<Self, SessionError> {
        if settings.category_query().is_empty() {
            return Err(SessionError::NoCategories);
        }
        Ok(Self {
            id: SessionId::next(),
            state: SessionState::Idle,
            percent: 0,
            stats: StatsAccumulator::new(),
            fingerprint: settings.fingerprint(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn stats(&self) -> &StatsAccumulator {
        &self.stats
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Transition `Idle → Active` once the stream is open. Stats are reset
    /// here so a session never shows leftovers from a previous one.
    pub fn activate(&mut self) {
        debug_assert_eq!(self.state, SessionState::Idle);
        self.stats.reset();
        self.percent = 0;
        self.state = SessionState::Active;
        tracing::debug!(session = self.id.value(), "session active");
    }

    /// Apply one inbound event. Returns `None` when the session is not
    /// `Active` — stragglers delivered after cancel or completion are
    /// discarded here with no observable effect.
    pub fn apply_event(&mut self, event: StreamEvent) -> Option<EventEffect> {
        if self.state != SessionState::Active {
            tracing::trace!(
                session = self.id.value(),
                state = ?self.state,
                "dropping event for non-active session"
            );
            return None;
        }
        match event {
            StreamEvent::Progress { percent, message } => {
                if let Some(p) = percent {
                    // Out-of-range or decreasing values must not regress the
                    // bar; the raw message still flows through untouched.
                    if p.is_finite() {
                        let p = p.clamp(0.0, 100.0).round() as u8;
                        if p > self.percent {
                            self.percent = p;
                        }
                    }
                }
                self.stats.ingest(&message);
                Some(EventEffect::Snapshot(Snapshot {
                    percent: self.percent,
                    message,
                    stats_line: self.stats.render(),
                }))
            }
            StreamEvent::Terminal(payload) => {
                let result = if payload.ok {
                    self.state = SessionState::Succeeded;
                    if payload.papers.is_empty() {
                        Ok(SessionOutcome::Empty {
                            message: payload
                                .message
                                .unwrap_or_else(|| "暂无推荐".to_string()),
                        })
                    } else {
                        Ok(SessionOutcome::Ranked {
                            papers: payload.papers,
                            reference_count: payload.reference_count,
                            cached: payload.cached,
                        })
                    }
                } else {
                    self.state = SessionState::Failed;
                    Err(SessionError::Server(
                        payload.error.unwrap_or_else(|| "未知错误".to_string()),
                    ))
                };
                tracing::debug!(
                    session = self.id.value(),
                    ok = result.is_ok(),
                    "session finished"
                );
                Some(EventEffect::Finished(result))
            }
        }
    }

    /// Record a transport-level failure as an implicit terminal event.
    pub fn fail_transport(&mut self, err: TransportError) -> Option<EventEffect> {
        if self.state != SessionState::Active {
            return None;
        }
        self.state = SessionState::Failed;
        tracing::debug!(session = self.id.value(), error = %err, "transport failure");
        Some(EventEffect::Finished(Err(SessionError::Transport(
            err.to_string(),
        ))))
    }

    /// Cancel the session. Permitted only while `Active`; returns whether a
    /// transition happened. After this, every delivered event is a no-op.
    pub fn cancel(&mut self) -> bool {
        if self.state == SessionState::Active {
            self.state = SessionState::Cancelled;
            tracing::debug!(session = self.id.value(), "session cancelled");
            true
        } else {
            false
        }
    }
}

/// Drive a session to completion over its transport.
///
/// Opens the stream, consumes events strictly in arrival order, and forwards
/// id-tagged snapshots and the final result over `tx`. Cancelling `cancel`
/// stops consumption immediately; dropping the stream closes the underlying
/// connection, and the state check in `apply_event` swallows anything the
/// transport had already delivered.
pub async fn drive(
    mut session: RecommendationSession,
    transport: Arc<dyn RecommendationTransport>,
    settings: QuerySettings,
    force_refresh: bool,
    tx: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
) {
    let id = session.id();
    session.activate();

    let opened = tokio::select! {
        _ = cancel.cancelled() => {
            session.cancel();
            return;
        }
        opened = transport.open(&settings, force_refresh) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(err) => {
            if let Some(EventEffect::Finished(result)) = session.fail_transport(err) {
                let _ = tx.send(SessionEvent::Finished {
                    session: id,
                    result,
                });
            }
            return;
        }
    };

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                session.cancel();
                // Dropping `stream` here releases the transport handle.
                return;
            }
            next = stream.next() => next,
        };

        let effect = match next {
            Some(Ok(event)) => session.apply_event(event),
            Some(Err(err)) => session.fail_transport(err),
            // Stream ended without a terminal payload.
            None => session.fail_transport(TransportError::EndedEarly),
        };

        match effect {
            Some(EventEffect::Snapshot(snapshot)) => {
                let _ = tx.send(SessionEvent::Snapshot {
                    session: id,
                    snapshot,
                });
            }
            Some(EventEffect::Finished(result)) => {
                let _ = tx.send(SessionEvent::Finished {
                    session: id,
                    result,
                });
                return;
            }
            // Left Active some other way; stop consuming.
            None => return,
        }
    }
}
